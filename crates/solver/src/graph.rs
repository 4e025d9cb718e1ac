//! Dependency graph over network-scoped contracts.

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{ContractEntry, Declaration, SolverError, SolverResult};

/// Separator between the network and the contract name of a [`NodeId`].
pub const NODE_SEPARATOR: &str = "::";

/// Identifier of a deployable unit: a contract name scoped to its network.
///
/// Ordering is lexical on `(network, contract)`, which is also the tie-break
/// order of the topological sort. Network names never contain
/// [`NODE_SEPARATOR`], so the string form parses back unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[display("{network}::{contract}")]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    network: String,
    contract: String,
}

impl NodeId {
    pub fn new(network: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            contract: contract.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(NODE_SEPARATOR) {
            Some((network, contract)) if !network.is_empty() && !contract.is_empty() => {
                Ok(Self::new(network, contract))
            }
            _ => Err(format!(
                "invalid node id '{s}', expected <network>{NODE_SEPARATOR}<contract>"
            )),
        }
    }
}

impl From<NodeId> for String {
    fn from(node: NodeId) -> Self {
        node.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// `from` must be deployed before `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyEdge {
    pub from: NodeId,
    pub to: NodeId,
}

/// Nodes plus `dependency -> dependent` edges.
///
/// Every edge endpoint is also a node, so a link to an undeclared contract
/// still shows up as a node of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeSet<NodeId>,
    edges: BTreeSet<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Returns `false` if it was already present.
    pub fn add_node(&mut self, node: NodeId) -> bool {
        self.nodes.insert(node)
    }

    /// Register an edge together with both of its endpoints.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        self.edges.insert(DependencyEdge { from, to });
    }

    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    pub fn edges(&self) -> &BTreeSet<DependencyEdge> {
        &self.edges
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Nodes that must be deployed before `node`.
    pub fn dependencies_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a NodeId> {
        self.edges
            .iter()
            .filter(move |edge| &edge.to == node)
            .map(|edge| &edge.from)
    }

    /// Nodes that wait on `node`.
    pub fn dependents_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a NodeId> {
        self.edges
            .iter()
            .filter(move |edge| &edge.from == node)
            .map(|edge| &edge.to)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Declared contract entries indexed by node.
pub type EntryIndex = BTreeMap<NodeId, ContractEntry>;

/// Accumulates declarations into a [`DependencyGraph`] and its [`EntryIndex`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: DependencyGraph,
    entries: EntryIndex,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every entry of a declaration.
    pub fn add_declaration(&mut self, declaration: &Declaration) -> SolverResult<()> {
        for (network, entry) in declaration.entries() {
            self.add_entry(network, entry)?;
        }
        Ok(())
    }

    /// Add one entry. Links always resolve against the entry's own network.
    pub fn add_entry(&mut self, network: &str, entry: &ContractEntry) -> SolverResult<()> {
        let node = NodeId::new(network, entry.contract_name.as_str());

        if self.entries.contains_key(&node) {
            return Err(SolverError::DuplicateContract { node });
        }

        self.graph.add_node(node.clone());
        for link in &entry.links {
            self.graph
                .add_edge(NodeId::new(network, link.as_str()), node.clone());
        }

        tracing::debug!(
            node = %node,
            links = entry.links.len(),
            "Registered contract in dependency graph"
        );

        self.entries.insert(node, entry.clone());
        Ok(())
    }

    pub fn build(self) -> (DependencyGraph, EntryIndex) {
        (self.graph, self.entries)
    }
}

/// Build the dependency graph of a set of declarations.
///
/// Fails with [`SolverError::DuplicateContract`] if a contract is declared twice
/// on the same network, across declarations or within one.
pub fn build_graph(declarations: &[Declaration]) -> SolverResult<(DependencyGraph, EntryIndex)> {
    let mut builder = GraphBuilder::new();
    for declaration in declarations {
        builder.add_declaration(declaration)?;
    }

    let (graph, entries) = builder.build();
    tracing::debug!(
        nodes = graph.len(),
        edges = graph.edges().len(),
        "Built dependency graph"
    );

    Ok((graph, entries))
}
