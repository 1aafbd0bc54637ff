mod config;
mod main_lib;
mod snapshot;

use config::Config;
use main_lib::{build_engine, init_tracing, parse_request};

const USAGE: &str = "usage: groupscape-resolve <domain> <subject> [--from <rfc3339>] [--to <rfc3339>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_format);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let descriptor = parse_request(&args).map_err(|e| anyhow::anyhow!("{}\n{}", e, USAGE))?;
    let engine = build_engine(&config)?;

    tracing::info!("Resolving {}", descriptor);
    let record = engine.resolve(&descriptor).await;
    tracing::info!(
        "Resolved {} from [{}]",
        descriptor,
        record.sources().join(", ")
    );

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
