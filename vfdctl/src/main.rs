use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::{Config, PreopenSpec, build_table};

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(name = "vfdctl")]
#[command(version, about = "Run file operations through a libvfd descriptor table", long_about = None)]
struct Cli {
    /// YAML file listing preopens
    #[arg(short, long, env = "VFD_CONFIG")]
    config: Option<PathBuf>,

    /// Expose a host directory as GUEST=HOST; may be repeated
    #[arg(short, long = "preopen", env = "VFD_PREOPEN", value_delimiter = ',')]
    preopens: Vec<PreopenSpec>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut specs = match &cli.config {
        Some(path) => Config::load(path)?.preopens,
        None => Vec::new(),
    };
    specs.extend(cli.preopens.iter().cloned());

    let mut table = build_table(&specs).await?;
    let mut stdout = std::io::stdout().lock();
    commands::run(&mut table, &cli.command, &mut stdout).await
}
