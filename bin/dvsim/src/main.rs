//! Distance-vector routing simulator binary.

use std::path::PathBuf;

use clap::Parser;
use eyre::Result;

use dvsim_coordinator::{Config, Coordinator, topology::Topology};

#[derive(Parser, Debug)]
#[command(name = "dvsim")]
#[command(about = "Simulates distance-vector routing over a static topology")]
struct Args {
    /// Topology file: whitespace-separated `u v cost` triples, one
    /// undirected edge each
    topology: PathBuf,

    /// Directory receiving one routing-table file per router, recreated
    /// fresh at startup
    #[arg(long, default_value = "routing_table")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();

    tracing::info!(topology = %args.topology.display(), "loading topology");
    let topology = Topology::load(&args.topology)?;

    let config = Config {
        output_dir: args.output_dir,
        ..Config::default()
    };
    let summary = Coordinator::new(config).run(topology).await?;

    if !summary.all_completed() {
        for (id, reason) in summary.failures() {
            tracing::error!(router = id, reason, "router exited abnormally");
        }
        eyre::bail!("some routers exited abnormally; their tables are missing");
    }

    Ok(())
}
