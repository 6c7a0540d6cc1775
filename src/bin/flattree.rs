//! flattree - run a path query against a configured repository
//!
//! Usage:
//!   flattree <query> [--config <config.json>]
//!
//! Without a config file the in-memory backend is used, which is only
//! useful for checking that a query parses and lowers.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use flattree::{AdapterConfig, PersistenceManager};

fn print_usage() {
    eprintln!("Usage: flattree <query> [--config <config.json>]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <query>        Path query, e.g. \"/jcr:root/content//*[@title]\"");
    eprintln!("  --config       JSON adapter configuration (default: in-memory backend)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  -V, --version  Print version information");
    eprintln!("  -h, --help     Print this help message");
    eprintln!("  --ids          Also print the identifier chain of every hit");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("flattree {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.len() < 2 || args[1].starts_with("--") {
        print_usage();
        bail!("missing query");
    }

    let query = &args[1];
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);
    let show_ids = args.iter().any(|a| a == "--ids");

    let config = match &config_path {
        Some(path) => AdapterConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AdapterConfig::default(),
    };

    let manager = PersistenceManager::open(config).context("opening repository")?;
    manager.init()?;
    let hits = manager
        .query(query)
        .with_context(|| format!("running query {}", query))?;

    for hit in &hits {
        if show_ids {
            println!("{}\t{}", hit.path, hit.pids.join(" "));
        } else {
            println!("{}", hit.path);
        }
    }
    tracing::info!(hits = hits.len(), "query finished");
    manager.close()?;
    Ok(())
}
