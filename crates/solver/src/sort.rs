//! Deterministic topological ordering of a [`DependencyGraph`].

use std::collections::{BTreeMap, BTreeSet};

use crate::{DependencyGraph, NodeId, SolverError, SolverResult};

/// Order the graph so that every dependency precedes its dependents.
///
/// Kahn's algorithm. When several nodes are ready at once, the lexically
/// smallest `(network, contract)` goes first, so identical graphs always give
/// identical orders.
///
/// If some nodes can never become ready the graph has a cycle, and the error
/// carries all of them: the cycle members as well as anything waiting on them.
pub fn topological_order(graph: &DependencyGraph) -> SolverResult<Vec<NodeId>> {
    let mut in_degree: BTreeMap<&NodeId, usize> =
        graph.nodes().iter().map(|node| (node, 0)).collect();
    let mut dependents: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();

    for edge in graph.edges() {
        *in_degree.entry(&edge.to).or_default() += 1;
        dependents.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut ready: BTreeSet<&NodeId> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&node, _)| node)
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.clone());

        for &dependent in dependents.get(node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < graph.len() {
        let unresolved: BTreeSet<NodeId> = in_degree
            .into_iter()
            .filter(|&(_, degree)| degree > 0)
            .map(|(node, _)| node.clone())
            .collect();

        tracing::debug!(
            ordered = order.len(),
            unresolved = unresolved.len(),
            "Dependency graph contains a cycle"
        );

        return Err(SolverError::CyclicDependency { unresolved });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeId {
        NodeId::new("dev", name)
    }

    fn graph(edges: &[(&str, &str)], isolated: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (from, to) in edges {
            graph.add_edge(node(from), node(to));
        }
        for name in isolated {
            graph.add_node(node(name));
        }
        graph
    }

    fn names(order: &[NodeId]) -> Vec<&str> {
        order.iter().map(NodeId::contract).collect()
    }

    #[test]
    fn test_empty_graph() {
        let order = topological_order(&DependencyGraph::new()).expect("order");
        assert!(order.is_empty());
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        let order = topological_order(&graph(&[("Token", "Vault")], &[])).expect("order");
        assert_eq!(names(&order), vec!["Token", "Vault"]);
    }

    #[test]
    fn test_ties_break_lexically() {
        let order = topological_order(&graph(&[], &["C", "A", "B"])).expect("order");
        assert_eq!(names(&order), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_ready_nodes_interleave_lexically() {
        // Z unlocks B; A is ready from the start and sorts before Z.
        let order =
            topological_order(&graph(&[("Z", "B"), ("M", "N")], &["A"])).expect("order");
        assert_eq!(names(&order), vec!["A", "M", "N", "Z", "B"]);
    }

    #[test]
    fn test_diamond() {
        let order = topological_order(&graph(
            &[("Lib", "Left"), ("Lib", "Right"), ("Left", "App"), ("Right", "App")],
            &[],
        ))
        .expect("order");
        assert_eq!(names(&order), vec!["Lib", "Left", "Right", "App"]);
    }

    #[test]
    fn test_networks_tie_break_before_contracts() {
        let mut g = DependencyGraph::new();
        g.add_node(NodeId::new("live", "A"));
        g.add_node(NodeId::new("dev", "Z"));
        let order = topological_order(&g).expect("order");
        assert_eq!(order, vec![NodeId::new("dev", "Z"), NodeId::new("live", "A")]);
    }

    #[test]
    fn test_three_node_cycle_reports_all_members() {
        let result = topological_order(&graph(&[("A", "B"), ("B", "C"), ("C", "A")], &[]));
        let expected: BTreeSet<_> = ["A", "B", "C"].into_iter().map(node).collect();
        assert_eq!(
            result,
            Err(SolverError::CyclicDependency {
                unresolved: expected
            })
        );
    }

    #[test]
    fn test_cycle_reports_blocked_dependents_too() {
        let result = topological_order(&graph(
            &[("A", "B"), ("B", "A"), ("B", "Downstream"), ("Free", "Other")],
            &[],
        ));
        match result {
            Err(SolverError::CyclicDependency { unresolved }) => {
                let unresolved: Vec<_> = unresolved.iter().map(NodeId::contract).collect();
                assert_eq!(unresolved, vec!["A", "B", "Downstream"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_link_is_a_cycle() {
        let result = topological_order(&graph(&[("A", "A")], &["B"]));
        assert_eq!(
            result,
            Err(SolverError::CyclicDependency {
                unresolved: [node("A")].into_iter().collect()
            })
        );
    }
}
