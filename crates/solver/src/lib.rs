//! linkplan-solver - Dependency resolution for multi-network contract deployments.
//!
//! This crate turns declarative deployment descriptors into an ordered,
//! resumable [`DeploymentPlan`]: every library a contract links against is
//! deployed before the contract itself, on each target network.
//!
//! # Example
//!
//! ```
//! use linkplan_solver::Solver;
//! use serde_json::json;
//!
//! let plan = Solver::solve(&[json!({
//!     "dev": [
//!         { "contractName": "Vault", "links": ["Token"] },
//!         { "contractName": "Token" }
//!     ]
//! })])?;
//!
//! let order: Vec<_> = plan.iter().map(|step| step.contract_name()).collect();
//! assert_eq!(order, ["Token", "Vault"]);
//! # Ok::<(), linkplan_solver::SolverError>(())
//! ```

mod descriptor;
mod error;
mod graph;
mod plan;
mod solver;
mod sort;

pub mod progress;
pub mod runner;
pub mod source;

pub use descriptor::{
    CONTRACT_ALIAS_KEY, CONTRACT_NAME_KEY, ContractEntry, DEPLOYED_KEY, Declaration, LINKS_KEY,
    parse_declarations,
};
pub use error::{SolverError, SolverResult};
pub use graph::{
    DependencyEdge, DependencyGraph, EntryIndex, GraphBuilder, NODE_SEPARATOR, NodeId,
    build_graph,
};
pub use plan::{DeploymentPlan, DeploymentStep, StepStatus, assemble};
pub use progress::{PROGRESS_FILENAME, PlanProgress, ProgressRecorder, declarations_hash};
pub use runner::{CompletionHook, ExecutionMode, PlanRunner, RunReport, StepExecutor};
pub use solver::Solver;
pub use sort::topological_order;
