//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "stagerun",
    about = "Multi-phase CI test sequencer - static analysis tools",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a run configuration without touching a cluster
    Validate(ValidateCommand),

    /// Print the dependency-link tokens a run requires
    Graph(GraphCommand),
}

#[derive(Debug, Clone, Args)]
pub struct ValidateCommand {
    /// Run configuration file (YAML)
    pub file: PathBuf,

    /// Run-context binding, repeatable (KEY=VALUE)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct GraphCommand {
    /// Run configuration file (YAML)
    pub file: PathBuf,

    /// Additional pipeline-built image name, repeatable
    #[arg(long = "image", value_name = "NAME")]
    pub image: Vec<String>,
}

/// Parse repeated KEY=VALUE flags into a binding map
pub fn parse_bindings(pairs: &[String]) -> Result<BTreeMap<String, String>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| format!("invalid binding {pair:?}, expected KEY=VALUE"))
        })
        .collect()
}
