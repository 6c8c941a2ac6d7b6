use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fz", version, about = "Parametric simulation orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// fzi: discover variable and formula tokens in a template
    Discover {
        /// Path to the run-spec TOML file
        spec: PathBuf,
    },
    /// fzc: compile every declared case into its own directory
    Compile {
        spec: PathBuf,
    },
    /// fzo: extract outputs from an already-run case directory
    Extract {
        spec: PathBuf,
        case_dir: PathBuf,
    },
    /// fzr: compile, run, and assemble the full result table
    Run {
        spec: PathBuf,
    },
    /// fzd: drive an iterative design of experiments
    Drive {
        spec: PathBuf,
    },
}
