//! Drives a [`DeploymentPlan`] through an external executor.
//!
//! The solver decides the order; a [`StepExecutor`] performs the actual
//! deployment of each step. [`PlanRunner`] connects the two and owns the
//! lifecycle transitions of the steps it runs.

use std::future::Future;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{DeploymentPlan, DeploymentStep, NodeId};

/// Performs the deployment of a single step.
pub trait StepExecutor: Send + Sync {
    /// Deploy `step`. All of its dependencies are completed when this is called.
    fn run(&self, step: &DeploymentStep) -> impl Future<Output = Result<()>> + Send;
}

/// How a plan is walked.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExecutionMode {
    /// One step at a time, in plan order.
    #[default]
    Sequential,
    /// Every step of an execution level at once, level after level.
    Levels,
}

/// Outcome of a [`PlanRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Steps completed during this run, in completion order.
    pub completed: Vec<NodeId>,
    /// Steps that were already completed and left untouched.
    pub skipped: Vec<NodeId>,
    /// Steps that failed, with their error.
    pub failed: Vec<(NodeId, String)>,
    /// Steps not attempted because the run stopped early.
    pub not_attempted: Vec<NodeId>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }
}

/// Called with each step as soon as it completes.
pub type CompletionHook = Box<dyn Fn(&NodeId) -> Result<()> + Send + Sync>;

/// Runs the steps of a plan with a [`StepExecutor`].
pub struct PlanRunner<E> {
    executor: E,
    mode: ExecutionMode,
    on_completed: Option<CompletionHook>,
}

impl<E: StepExecutor> PlanRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            mode: ExecutionMode::default(),
            on_completed: None,
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Call `hook` after every completed step, before the next one starts.
    ///
    /// A hook error aborts the run; the step itself stays completed.
    pub fn on_step_completed(
        mut self,
        hook: impl Fn(&NodeId) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_completed = Some(Box::new(hook));
        self
    }

    fn notify_completed(&self, node: &NodeId) -> Result<()> {
        match &self.on_completed {
            Some(hook) => hook(node)
                .with_context(|| format!("Failed to record completion of {node}")),
            None => Ok(()),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run every step that is not completed yet.
    ///
    /// Completed steps are skipped, so running the same plan again after a
    /// failure only retries what is left. The run stops at the first failure;
    /// an error is only returned for an invalid lifecycle transition.
    pub async fn run(&self, plan: &mut DeploymentPlan) -> Result<RunReport> {
        tracing::info!(
            mode = %self.mode,
            steps = plan.len(),
            remaining = plan.remaining().count(),
            "Running deployment plan"
        );

        let report = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(plan).await?,
            ExecutionMode::Levels => self.run_levels(plan).await?,
        };

        if report.is_success() {
            tracing::info!(
                completed = report.completed.len(),
                skipped = report.skipped.len(),
                "Deployment plan finished"
            );
        } else {
            tracing::error!(
                completed = report.completed.len(),
                failed = report.failed.len(),
                not_attempted = report.not_attempted.len(),
                "Deployment plan stopped"
            );
        }

        Ok(report)
    }

    async fn run_sequential(&self, plan: &mut DeploymentPlan) -> Result<RunReport> {
        let mut report = RunReport::default();

        for step in plan.steps_mut() {
            if step.is_completed() {
                report.skipped.push(step.node_id().clone());
                continue;
            }

            if !report.failed.is_empty() {
                report.not_attempted.push(step.node_id().clone());
                continue;
            }

            step.begin()?;
            tracing::info!(network = %step.network(), contract = %step.contract_name(), "Deploying contract");

            match self.executor.run(step).await {
                Ok(()) => {
                    step.complete()?;
                    report.completed.push(step.node_id().clone());
                    self.notify_completed(step.node_id())?;
                }
                Err(err) => {
                    tracing::error!(node = %step.node_id(), error = %err, "Deployment step failed");
                    step.fail(format!("{err:#}"))?;
                    report.failed.push((step.node_id().clone(), format!("{err:#}")));
                }
            }
        }

        Ok(report)
    }

    async fn run_levels(&self, plan: &mut DeploymentPlan) -> Result<RunReport> {
        let mut report = RunReport::default();
        let levels = plan.execution_levels();

        for (depth, level) in levels.iter().enumerate() {
            let mut batch = Vec::new();
            for &index in level {
                let step = &plan[index];
                if step.is_completed() {
                    report.skipped.push(step.node_id().clone());
                } else if !report.failed.is_empty() {
                    report.not_attempted.push(step.node_id().clone());
                } else {
                    batch.push(index);
                }
            }

            if batch.is_empty() {
                continue;
            }

            tracing::info!(level = depth, steps = batch.len(), "Deploying execution level");

            let mut running = Vec::with_capacity(batch.len());
            for &index in &batch {
                let mut step = plan[index].clone();
                step.begin()?;
                running.push(step);
            }

            let outcomes = join_all(running.iter().map(|step| self.executor.run(step))).await;

            let mut finished = Vec::new();
            for ((index, mut step), outcome) in batch.into_iter().zip(running).zip(outcomes) {
                match outcome {
                    Ok(()) => {
                        step.complete()?;
                        report.completed.push(step.node_id().clone());
                        finished.push(step.node_id().clone());
                    }
                    Err(err) => {
                        tracing::error!(node = %step.node_id(), error = %err, "Deployment step failed");
                        step.fail(format!("{err:#}"))?;
                        report.failed.push((step.node_id().clone(), format!("{err:#}")));
                    }
                }
                plan.replace_step(index, step);
            }

            for node in &finished {
                self.notify_completed(node)?;
            }
        }

        Ok(report)
    }
}
