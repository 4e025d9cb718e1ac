//! Entry point composing the solver phases.
//!
//! ```text
//! raw declarations -> Declaration -> DependencyGraph -> sorted NodeIds -> DeploymentPlan
//! ```
//!
//! Each phase is a pure function of the previous one's output.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::{
    Declaration, DeploymentPlan, NodeId, SolverResult, assemble, build_graph, parse_declarations,
    topological_order,
};

/// Solves deployment declarations into an ordered [`DeploymentPlan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Solver;

impl Solver {
    /// Solve raw declarations as produced by the descriptor source.
    pub fn solve(raw: &[Value]) -> SolverResult<DeploymentPlan> {
        let declarations = parse_declarations(raw)?;
        Self::solve_declarations(&declarations)
    }

    /// Solve already normalized declarations.
    pub fn solve_declarations(declarations: &[Declaration]) -> SolverResult<DeploymentPlan> {
        let (graph, entries) = build_graph(declarations)?;
        let order = topological_order(&graph)?;
        let plan = assemble(&order, &entries)?;

        debug_assert!(plan.respects_dependencies());

        tracing::info!(
            steps = plan.len(),
            networks = plan
                .iter()
                .map(|step| step.network())
                .collect::<BTreeSet<_>>()
                .len(),
            "Deployment plan solved"
        );

        Ok(plan)
    }

    /// Solve again, treating `completed` nodes as already deployed.
    ///
    /// The order is the one a fresh solve gives, so a resumed run sees the
    /// completed prefix of an interrupted run unchanged. Completed nodes that are
    /// no longer declared are ignored.
    pub fn resume(raw: &[Value], completed: &BTreeSet<NodeId>) -> SolverResult<DeploymentPlan> {
        let mut plan = Self::solve(raw)?;

        for node in plan.restore_completed(completed) {
            tracing::warn!(node = %node, "Completed step is no longer declared, ignoring it");
        }

        for step in plan.iter().filter(|step| step.is_completed()) {
            let pending_dependency = step.dependencies().iter().find(|dependency| {
                plan.step(&NodeId::new(step.network(), dependency.as_str()))
                    .is_some_and(|dependency| !dependency.is_completed())
            });

            if let Some(dependency) = pending_dependency {
                tracing::warn!(
                    node = %step.node_id(),
                    dependency = %dependency,
                    "Step is marked completed but one of its dependencies is not"
                );
            }
        }

        tracing::info!(
            completed = plan.completed_nodes().len(),
            remaining = plan.remaining().count(),
            "Resumed deployment plan"
        );

        Ok(plan)
    }
}
