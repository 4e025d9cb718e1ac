use std::path::PathBuf;

use clap::{Parser, Subcommand};
use linkplan_solver::ExecutionMode;
use tracing::level_filters::LevelFilter;

/// How a plan is printed.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "linkplan")]
#[command(
    author,
    version,
    about = "Order and run contract deployments across networks, libraries first"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "LINKPLAN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Linkplan.toml configuration file.
    ///
    /// If not provided, ./Linkplan.toml is used when it exists.
    #[arg(long, alias = "conf", global = true, env = "LINKPLAN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Solve a descriptor and print the ordered deployment plan.
    Plan {
        /// The descriptor file (YAML, possibly multi-document, or JSON).
        descriptor: PathBuf,

        /// The output format.
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Group the steps into levels of mutually independent deployments.
        #[arg(long)]
        levels: bool,
    },

    /// Run the remaining steps of a plan and record progress.
    Run {
        /// The descriptor file (YAML, possibly multi-document, or JSON).
        descriptor: PathBuf,

        /// Run steps one by one or level by level.
        #[arg(long)]
        mode: Option<ExecutionMode>,

        /// Shell command run for each step.
        ///
        /// `{network}` and `{contract}` are substituted; the step is also exposed through
        /// LINKPLAN_NETWORK, LINKPLAN_CONTRACT, LINKPLAN_DEPENDENCIES and LINKPLAN_PARAMETERS.
        /// Without it, steps are only logged.
        #[arg(long)]
        exec: Option<String>,

        /// Where progress is stored.
        #[arg(long)]
        progress_file: Option<PathBuf>,

        /// Ignore stored progress and run every step.
        #[arg(long)]
        fresh: bool,
    },

    /// Print the plan together with the stored progress.
    Status {
        /// The descriptor file (YAML, possibly multi-document, or JSON).
        descriptor: PathBuf,

        /// Where progress is stored.
        #[arg(long)]
        progress_file: Option<PathBuf>,

        /// The output format.
        #[arg(long)]
        format: Option<OutputFormat>,
    },

    /// Write a default Linkplan.toml.
    Init {
        /// Where to write the configuration.
        #[arg(default_value = crate::config::CONFIG_FILENAME)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
