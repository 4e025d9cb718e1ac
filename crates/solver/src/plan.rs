//! Deployment plan assembly and the step lifecycle.

use std::collections::{BTreeMap, BTreeSet};

use derive_more::Deref;
use serde::{Serialize, Serializer, ser::SerializeStruct};
use serde_json::{Map, Value};

use crate::{EntryIndex, NodeId, SolverError, SolverResult};

/// Lifecycle state of a [`DeploymentStep`].
///
/// ```text
/// Pending -> Running -> Completed
///               |
///               +----> Failed -> Running (retry)
/// ```
///
/// The solver only ever creates `Pending` steps. Every later transition belongs
/// to the executor.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One ordered unit of work, owned by the executor once the plan is handed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    node: NodeId,
    dependencies: Vec<String>,
    parameters: Map<String, Value>,
    status: StepStatus,
    failure: Option<String>,
}

impl DeploymentStep {
    fn pending(node: NodeId, dependencies: Vec<String>, parameters: Map<String, Value>) -> Self {
        Self {
            node,
            dependencies,
            parameters,
            status: StepStatus::Pending,
            failure: None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node
    }

    pub fn contract_name(&self) -> &str {
        self.node.contract()
    }

    pub fn network(&self) -> &str {
        self.node.network()
    }

    /// Contracts on the same network that must be deployed first, in declared order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Opaque deployment parameters from the declaration.
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Reason of the last failed attempt, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The executor starts the step. Allowed from `Pending` and, for a retry, `Failed`.
    pub fn begin(&mut self) -> SolverResult<()> {
        match self.status {
            StepStatus::Pending | StepStatus::Failed => {
                self.failure = None;
                self.transition(StepStatus::Running)
            }
            _ => Err(self.invalid(StepStatus::Running)),
        }
    }

    /// The step's action succeeded.
    pub fn complete(&mut self) -> SolverResult<()> {
        match self.status {
            StepStatus::Running => self.transition(StepStatus::Completed),
            _ => Err(self.invalid(StepStatus::Completed)),
        }
    }

    /// The step's action failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> SolverResult<()> {
        match self.status {
            StepStatus::Running => {
                self.failure = Some(reason.into());
                self.transition(StepStatus::Failed)
            }
            _ => Err(self.invalid(StepStatus::Failed)),
        }
    }

    fn transition(&mut self, to: StepStatus) -> SolverResult<()> {
        tracing::trace!(node = %self.node, from = %self.status, to = %to, "Step transition");
        self.status = to;
        Ok(())
    }

    fn invalid(&self, to: StepStatus) -> SolverError {
        SolverError::InvalidTransition {
            node: self.node.clone(),
            from: self.status,
            to,
        }
    }
}

impl Serialize for DeploymentStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = 5;
        if !self.parameters.is_empty() {
            fields += 1;
        }
        if self.failure.is_some() {
            fields += 1;
        }

        let mut state = serializer.serialize_struct("DeploymentStep", fields)?;
        state.serialize_field("contractName", self.contract_name())?;
        state.serialize_field("network", self.network())?;
        state.serialize_field("dependencies", &self.dependencies)?;
        state.serialize_field("isCompleted", &self.is_completed())?;
        state.serialize_field("status", &self.status)?;
        if !self.parameters.is_empty() {
            state.serialize_field("parameters", &self.parameters)?;
        }
        if let Some(failure) = &self.failure {
            state.serialize_field("failure", failure)?;
        }
        state.end()
    }
}

/// The ordered steps of one orchestration run.
///
/// For every step, its dependencies on the same network sit at strictly lower
/// indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize)]
#[serde(transparent)]
pub struct DeploymentPlan {
    #[deref]
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<DeploymentStep> {
        self.steps
    }

    pub fn step(&self, node: &NodeId) -> Option<&DeploymentStep> {
        self.steps.iter().find(|step| step.node_id() == node)
    }

    pub fn step_mut(&mut self, node: &NodeId) -> Option<&mut DeploymentStep> {
        self.steps.iter_mut().find(|step| step.node_id() == node)
    }

    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut DeploymentStep> {
        self.steps.iter_mut()
    }

    /// Steps still to run, in plan order.
    pub fn remaining(&self) -> impl Iterator<Item = &DeploymentStep> {
        self.steps.iter().filter(|step| !step.is_completed())
    }

    pub fn completed_nodes(&self) -> BTreeSet<NodeId> {
        self.steps
            .iter()
            .filter(|step| step.is_completed())
            .map(|step| step.node_id().clone())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.steps.iter().all(DeploymentStep::is_completed)
    }

    /// The steps named in `nodes`, keeping their relative plan order.
    pub fn subset(&self, nodes: &BTreeSet<NodeId>) -> Vec<&DeploymentStep> {
        self.steps
            .iter()
            .filter(|step| nodes.contains(step.node_id()))
            .collect()
    }

    /// Whether every dependency sits at a strictly lower index than its dependent.
    pub fn respects_dependencies(&self) -> bool {
        let positions = self.positions();
        self.steps.iter().enumerate().all(|(index, step)| {
            step.dependencies.iter().all(|dependency| {
                positions
                    .get(&NodeId::new(step.network(), dependency.as_str()))
                    .is_some_and(|&position| position < index)
            })
        })
    }

    /// Group step indices into levels of mutually independent steps.
    ///
    /// A step's level is one more than the highest level among its dependencies,
    /// so every step of a level can run concurrently once the previous levels
    /// are done. Plan order is kept within a level.
    pub fn execution_levels(&self) -> Vec<Vec<usize>> {
        let positions = self.positions();
        let mut step_levels = Vec::with_capacity(self.steps.len());
        let mut levels: Vec<Vec<usize>> = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            let level = step
                .dependencies
                .iter()
                .filter_map(|dependency| {
                    positions.get(&NodeId::new(step.network(), dependency.as_str()))
                })
                .map(|&position| step_levels[position] + 1)
                .max()
                .unwrap_or(0);

            step_levels.push(level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(index);
        }

        levels
    }

    /// Mark the listed nodes as already deployed. Returns the nodes that are not
    /// part of the plan.
    pub(crate) fn restore_completed(&mut self, completed: &BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut unknown: BTreeSet<&NodeId> = completed.iter().collect();
        for step in &mut self.steps {
            if unknown.remove(&step.node) {
                step.status = StepStatus::Completed;
            }
        }
        unknown.into_iter().cloned().collect()
    }

    pub(crate) fn replace_step(&mut self, index: usize, step: DeploymentStep) {
        debug_assert_eq!(self.steps[index].node, step.node);
        self.steps[index] = step;
    }

    fn positions(&self) -> BTreeMap<NodeId, usize> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| (step.node.clone(), index))
            .collect()
    }
}

impl<'a> IntoIterator for &'a DeploymentPlan {
    type Item = &'a DeploymentStep;
    type IntoIter = std::slice::Iter<'a, DeploymentStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Map a sorted node order back onto declared entries.
///
/// Every node must have a declared entry: a link to a contract that is not
/// declared on its network fails with [`SolverError::UnknownDependency`]
/// instead of leaving a gap in the plan. Nothing is returned on failure.
pub fn assemble(order: &[NodeId], entries: &EntryIndex) -> SolverResult<DeploymentPlan> {
    let mut steps = Vec::with_capacity(order.len());

    for node in order {
        let Some(entry) = entries.get(node) else {
            let required_by = entries
                .iter()
                .filter(|(other, entry)| {
                    other.network() == node.network()
                        && entry.links.iter().any(|link| link == node.contract())
                })
                .map(|(other, _)| other.contract().to_string())
                .collect();

            return Err(SolverError::UnknownDependency {
                network: node.network().to_string(),
                contract: node.contract().to_string(),
                required_by,
            });
        };

        steps.push(DeploymentStep::pending(
            node.clone(),
            entry.links.clone(),
            entry.parameters.clone(),
        ));
    }

    Ok(DeploymentPlan { steps })
}
