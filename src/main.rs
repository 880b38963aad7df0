use anyhow::{anyhow, Context, Result};
use clap::Parser;
use stagerun::cli::{parse_bindings, Cli, Command, GraphCommand, ValidateCommand};
use stagerun::core::config::{self, RunConfig};
use stagerun::core::link::{self, PipelineInventory};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Validate(cmd) => validate(cmd),
        Command::Graph(cmd) => graph(cmd),
    }
}

fn validate(cmd: &ValidateCommand) -> Result<()> {
    let config = RunConfig::from_file(&cmd.file)
        .with_context(|| format!("Failed to load run config {}", cmd.file.display()))?;
    let phases = config.to_phase_list()?;
    let bindings = parse_bindings(&cmd.env).map_err(|e| anyhow!(e))?;
    config::validate_bindings(&phases, &bindings)?;

    println!(
        "{}: run {:?} is valid ({} pre, {} test, {} post steps)",
        cmd.file.display(),
        config.name,
        phases.pre.len(),
        phases.test.len(),
        phases.post.len(),
    );
    Ok(())
}

fn graph(cmd: &GraphCommand) -> Result<()> {
    let config = RunConfig::from_file(&cmd.file)
        .with_context(|| format!("Failed to load run config {}", cmd.file.display()))?;
    let phases = config.to_phase_list()?;

    let images = config.images.iter().chain(cmd.image.iter()).cloned();
    let inventory = PipelineInventory::new(images);

    println!("run {:?} requires:", config.name);
    for token in link::requires(&phases, &inventory) {
        println!("  {token}");
    }
    Ok(())
}
