use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use concord_cache::config::CacheConfig;
use concord_cache::engine::dispatch::CacheHandle;
use concord_cache::engine::entity_cache::EntityCache;
use concord_cache::engine::events::CacheEvent;

/// Replay recorded update events into an entity cache and print each
/// member's effective permissions.
#[derive(Parser)]
#[command(name = "concord-cache", version)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "concord-cache.toml")]
    config: String,

    /// File with one JSON-encoded event per line.
    events: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = CacheConfig::load(&args.config)?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .init();

    let handle = CacheHandle::new(EntityCache::new(config.to_cache_options()));
    let (tx, task) = handle.spawn_event_loop(config.cache.event_queue);

    let file = tokio::fs::File::open(&args.events)
        .await
        .with_context(|| format!("failed to open {}", args.events.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match CacheEvent::from_json(&line) {
            Ok(event) => tx
                .send(event)
                .await
                .context("event loop stopped unexpectedly")?,
            Err(e) => warn!(line = line_no, error = %e, "skipping undecodable event"),
        }
    }
    drop(tx);

    let stats = task.await.context("event loop panicked")?;
    info!(
        applied = stats.applied,
        dropped = stats.dropped,
        "replay finished"
    );

    let cache = handle.read().await;
    let mut servers: Vec<_> = cache.servers().collect();
    servers.sort_by(|a, b| a.id().cmp(b.id()));

    for server in servers {
        println!("{} ({})", server.id(), server.name().unwrap_or("unnamed"));
        for member in cache.server_members(server.id()) {
            let perms = member.effective_permissions();
            println!("  {:<24} {:#018x} {:?}", member.user_id(), perms.bits(), perms);
        }
    }

    Ok(())
}
