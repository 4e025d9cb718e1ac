//! Step executors available from the command line.

use anyhow::{Context, Result};
use linkplan_solver::{DeploymentStep, StepExecutor};
use tokio::process::Command;

/// Executor used by `linkplan run`.
pub enum CliExecutor {
    /// Logs each step without deploying anything.
    DryRun,
    /// Runs a shell command per step.
    Command(ShellExecutor),
}

impl CliExecutor {
    pub fn new(exec: Option<String>) -> Self {
        match exec {
            Some(template) => Self::Command(ShellExecutor { template }),
            None => Self::DryRun,
        }
    }
}

impl StepExecutor for CliExecutor {
    async fn run(&self, step: &DeploymentStep) -> Result<()> {
        match self {
            Self::DryRun => {
                tracing::info!(
                    network = %step.network(),
                    contract = %step.contract_name(),
                    dependencies = ?step.dependencies(),
                    "Dry run, nothing deployed"
                );
                Ok(())
            }
            Self::Command(shell) => shell.run(step).await,
        }
    }
}

/// Runs `template` through `sh -c` for each step.
pub struct ShellExecutor {
    template: String,
}

impl ShellExecutor {
    /// Substitute the step placeholders into the command template.
    ///
    /// Substituted values are single-quoted, so they always reach the command
    /// as one literal word.
    pub fn render(&self, step: &DeploymentStep) -> String {
        self.template
            .replace("{network}", &shell_quote(step.network()))
            .replace("{contract}", &shell_quote(step.contract_name()))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl StepExecutor for ShellExecutor {
    async fn run(&self, step: &DeploymentStep) -> Result<()> {
        let command = self.render(step);
        let parameters =
            serde_json::to_string(step.parameters()).context("Failed to serialize parameters")?;

        tracing::debug!(node = %step.node_id(), command = %command, "Running step command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .env("LINKPLAN_NETWORK", step.network())
            .env("LINKPLAN_CONTRACT", step.contract_name())
            .env("LINKPLAN_DEPENDENCIES", step.dependencies().join(","))
            .env("LINKPLAN_PARAMETERS", parameters)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn `{command}`"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            tracing::info!(node = %step.node_id(), "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "`{}` exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use linkplan_solver::Solver;
    use serde_json::json;

    use super::*;

    fn vault_step() -> DeploymentStep {
        let plan = Solver::solve(&[json!({
            "dev": [
                { "contractName": "Token" },
                { "contractName": "Vault", "links": ["Token"], "salt": 7 }
            ]
        })])
        .expect("plan");
        plan.into_steps().remove(1)
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let shell = ShellExecutor {
            template: "deploy --network {network} {contract}".to_string(),
        };
        assert_eq!(shell.render(&vault_step()), "deploy --network 'dev' 'Vault'");
    }

    #[tokio::test]
    async fn test_substituted_names_are_not_interpreted_by_the_shell() {
        let plan = Solver::solve(&[json!({
            "dev": [{ "contractName": "X'; exit 7; echo '$(exit 9)" }]
        })])
        .expect("plan");
        let shell = ShellExecutor {
            template: r#"test {contract} = "$LINKPLAN_CONTRACT""#.to_string(),
        };

        shell.run(&plan[0]).await.expect("name passed as a literal word");
    }

    #[tokio::test]
    async fn test_shell_executor_exposes_step_environment() {
        let shell = ShellExecutor {
            template: r#"test "$LINKPLAN_DEPENDENCIES" = "Token" && test "$LINKPLAN_PARAMETERS" = '{"salt":7}'"#
                .to_string(),
        };
        shell.run(&vault_step()).await.expect("command succeeds");
    }

    #[tokio::test]
    async fn test_shell_executor_reports_failure() {
        let shell = ShellExecutor {
            template: "echo boom >&2; exit 3".to_string(),
        };
        let err = shell.run(&vault_step()).await.expect_err("command fails");
        assert!(err.to_string().contains("boom"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_dry_run_succeeds() {
        CliExecutor::new(None)
            .run(&vault_step())
            .await
            .expect("dry run");
    }
}
