//! Error types for the deployment solver.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::{NodeId, StepStatus};

/// Result type alias for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Failures of the solver.
///
/// Every variant is a local computation failure: solving the same input again
/// yields the same error, so nothing here is retried. The descriptor has to be
/// fixed and resubmitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// A raw declaration is structurally invalid.
    #[error("malformed declaration #{index}: {reason}")]
    MalformedDeclaration { index: usize, reason: String },

    /// The same contract is declared twice on the same network.
    #[error("contract '{}' is declared more than once on network '{}'", .node.contract(), .node.network())]
    DuplicateContract { node: NodeId },

    /// The dependency graph contains at least one cycle.
    ///
    /// `unresolved` holds every node that could not be ordered, not only the
    /// members of the first cycle found.
    #[error("cyclic dependency between: {}", format_nodes(.unresolved))]
    CyclicDependency { unresolved: BTreeSet<NodeId> },

    /// A link names a contract that is not declared on the network.
    #[error(
        "unknown dependency '{contract}' on network '{network}' (required by {})",
        .required_by.join(", ")
    )]
    UnknownDependency {
        network: String,
        contract: String,
        required_by: Vec<String>,
    },

    /// A step status change that the lifecycle does not allow.
    #[error("step {node} cannot move from {from} to {to}")]
    InvalidTransition {
        node: NodeId,
        from: StepStatus,
        to: StepStatus,
    },
}

impl SolverError {
    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedDeclaration {
            index,
            reason: reason.into(),
        }
    }
}

fn format_nodes(nodes: &BTreeSet<NodeId>) -> String {
    nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_malformed() {
        let err = SolverError::malformed(2, "entry #0 is missing 'contractName'");
        assert_eq!(
            err.to_string(),
            "malformed declaration #2: entry #0 is missing 'contractName'"
        );
    }

    #[test]
    fn test_error_display_cycle_lists_all_nodes() {
        let unresolved = ["A", "B", "C"]
            .into_iter()
            .map(|name| NodeId::new("dev", name))
            .collect();
        let err = SolverError::CyclicDependency { unresolved };
        assert_eq!(
            err.to_string(),
            "cyclic dependency between: dev::A, dev::B, dev::C"
        );
    }

    #[test]
    fn test_error_display_unknown_dependency() {
        let err = SolverError::UnknownDependency {
            network: "live".to_string(),
            contract: "SafeMath".to_string(),
            required_by: vec!["Token".to_string(), "Vault".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unknown dependency 'SafeMath' on network 'live' (required by Token, Vault)"
        );
    }

    #[test]
    fn test_error_display_duplicate() {
        let err = SolverError::DuplicateContract {
            node: NodeId::new("dev", "Token"),
        };
        assert_eq!(
            err.to_string(),
            "contract 'Token' is declared more than once on network 'dev'"
        );
    }
}
