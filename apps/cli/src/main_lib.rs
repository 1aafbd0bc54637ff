use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use groupscape_resolution::{
    sources, standard_policies, AggregationProvider, FallbackProvider, InvalidationBus,
    PluginProvider, RequestDescriptor, ResolutionEngine, SnapshotBridge, SourceProvider,
    TimeRange, UnavailableProvider, WikiProvider,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::snapshot;

/// Ceiling for a single HTTP request. Engine attempt deadlines are usually tighter.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Wire the provider chain for `config` into an engine.
///
/// Offline, the network providers are replaced by stubs so diagnostics keep
/// the same chain. The plugin is served from a snapshot file when one is
/// configured; this binary has no live plugin runtime otherwise.
pub fn build_engine(config: &Config) -> anyhow::Result<ResolutionEngine> {
    let (engine, _bridge) = assemble(config)?;
    Ok(engine)
}

/// Build the engine and hand back the snapshot bridge, if one was loaded.
///
/// The bridge and the engine share one bus, so later pushes to the bridge
/// invalidate the plugin-fed domains.
fn assemble(config: &Config) -> anyhow::Result<(ResolutionEngine, Option<Arc<SnapshotBridge>>)> {
    let bus = InvalidationBus::new();
    let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();

    let bridge = match &config.plugin_snapshot {
        Some(path) => {
            // Attached after loading: the initial entries have nothing to invalidate
            let bridge = Arc::new(snapshot::load_bridge(path)?.with_bus(bus.clone()));
            tracing::info!("Loaded {} plugin snapshot(s) from {}", bridge.len(), path.display());
            providers.push(Arc::new(PluginProvider::new(bridge.clone())));
            Some(bridge)
        }
        None => {
            providers.push(Arc::new(UnavailableProvider::new(sources::PLUGIN, 0)));
            None
        }
    };

    if config.offline {
        tracing::info!("Offline mode: aggregation and wiki providers are stubbed");
        providers.push(Arc::new(UnavailableProvider::new(sources::AGGREGATION, 10)));
        providers.push(Arc::new(UnavailableProvider::new(sources::WIKI, 20)));
    } else {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        providers.push(Arc::new(AggregationProvider::with_client(
            client.clone(),
            config.aggregation_url.clone(),
        )));
        providers.push(Arc::new(WikiProvider::with_client(
            client,
            config.wiki_url.clone(),
        )));
    }

    providers.push(Arc::new(FallbackProvider::default()));

    let engine = providers
        .into_iter()
        .fold(ResolutionEngine::builder(), |builder, p| builder.provider(p))
        .policies(standard_policies())
        .settings(config.engine_settings())
        .bus(bus)
        .build()?;
    Ok((engine, bridge))
}

/// Parse `<domain> <subject> [--from <rfc3339>] [--to <rfc3339>]`.
pub fn parse_request(args: &[String]) -> anyhow::Result<RequestDescriptor> {
    let mut positional = Vec::new();
    let mut from = None;
    let mut to = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--from" | "--to" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("{} needs a timestamp", arg))?;
                let at = parse_timestamp(value)?;
                if arg == "--from" {
                    from = Some(at);
                } else {
                    to = Some(at);
                }
            }
            flag if flag.starts_with("--") => bail!("unknown option '{}'", flag),
            _ => positional.push(arg.as_str()),
        }
    }

    let [domain, subject] = positional.as_slice() else {
        bail!("expected <domain> <subject>, got {} argument(s)", positional.len());
    };

    let descriptor = if from.is_some() || to.is_some() {
        RequestDescriptor::with_range(*domain, *subject, TimeRange::new(from, to))?
    } else {
        RequestDescriptor::new(*domain, *subject)?
    };
    Ok(descriptor)
}

fn parse_timestamp(value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("'{}' is not an RFC 3339 timestamp", value))
}
