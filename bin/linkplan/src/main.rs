//! linkplan is a CLI tool to order and run contract deployments across networks.

mod cli;
mod config;
mod executor;
mod render;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use linkplan_solver::{
    PlanProgress, PlanRunner, ProgressRecorder, Solver, declarations_hash, source,
};

use cli::{Cli, Command};
use config::Config;
use executor::CliExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    execute(cli).await
}

async fn execute(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Init { path, force } => init(&path, force)?,

        Command::Plan {
            descriptor,
            format,
            levels,
        } => {
            let config = Config::load(config_path)?;
            let raw = source::read_declarations(&descriptor)?;
            let plan = Solver::solve(&raw)?;
            println!(
                "{}",
                render::plan(&plan, format.unwrap_or(config.format), levels)?
            );
        }

        Command::Status {
            descriptor,
            progress_file,
            format,
        } => {
            let config = Config::load(config_path)?;
            let raw = source::read_declarations(&descriptor)?;
            let progress_file = progress_file.unwrap_or(config.progress_file);
            let completed =
                PlanProgress::load_completed(&progress_file, &declarations_hash(&raw))?;
            let plan = Solver::resume(&raw, &completed)?;
            println!(
                "{}",
                render::plan(&plan, format.unwrap_or(config.format), false)?
            );
        }

        Command::Run {
            descriptor,
            mode,
            exec,
            progress_file,
            fresh,
        } => {
            let config = Config::load(config_path)?;
            let raw = source::read_declarations(&descriptor)?;
            let hash = declarations_hash(&raw);
            let progress_file = progress_file.unwrap_or(config.progress_file);

            tracing::info!(
                descriptor = %descriptor.display(),
                progress_file = %progress_file.display(),
                "Loading deployment plan..."
            );

            let completed = if fresh {
                Default::default()
            } else {
                PlanProgress::load_completed(&progress_file, &hash)?
            };
            let mut plan = Solver::resume(&raw, &completed)?;

            // Progress is saved after every completed step so an interrupted
            // run does not deploy the same contracts again.
            let recorder =
                ProgressRecorder::new(&progress_file, PlanProgress::from_plan(hash.clone(), &plan));
            let runner = PlanRunner::new(CliExecutor::new(exec.or(config.exec)))
                .mode(mode.unwrap_or(config.mode))
                .on_step_completed(move |node| recorder.record(node));
            let outcome = runner.run(&mut plan).await;

            PlanProgress::from_plan(hash, &plan)
                .save_to_file(&progress_file)
                .context("Failed to record deployment progress")?;
            let report = outcome?;

            println!("{}", render::report(&report));

            if !report.is_success() {
                anyhow::bail!("Deployment stopped before completing the plan");
            }
        }
    }

    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    Config::default().save_to_file(path)
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(config::CONFIG_FILENAME);
        std::fs::write(&path, "mode = \"levels\"\n").expect("Failed to write config");

        assert!(init(&path, false).is_err());
        assert_eq!(
            Config::load(Some(&path)).expect("config").mode,
            linkplan_solver::ExecutionMode::Levels
        );

        init(&path, true).expect("forced init");
        assert_eq!(Config::load(Some(&path)).expect("config"), Config::default());
    }

    #[tokio::test]
    async fn test_init_command_needs_no_configuration() {
        let temp_dir = TempDir::new("linkplan-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(config::CONFIG_FILENAME);
        let missing = temp_dir.path().join("missing.toml");
        let cli = Cli::parse_from([
            "linkplan",
            "--config",
            missing.to_str().expect("utf-8 path"),
            "init",
            path.to_str().expect("utf-8 path"),
        ]);

        execute(cli).await.expect("init runs before the configuration is loaded");
        assert!(path.exists());
    }
}
