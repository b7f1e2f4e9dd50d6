//! Standalone mode: every subsystem in one process.
//!
//! In this mode, the daemon:
//! 1. Loads and validates the TOML configuration
//! 2. Opens the keyed table (on disk or in memory) and the cache client
//! 3. Reserves one registry slot per runtime instance, then builds and
//!    starts each runtime
//! 4. Serves the HTTP API until Ctrl-C
//! 5. Closes the runtimes, draining queued records

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use repartitioner_api::{build_router, ApiState};
use repartitioner_core::{format_iso8601, InstanceProvider, RepartitionerConfig};
use repartitioner_health::HealthIndicator;
use repartitioner_stream::{RuntimeRegistry, StageMetrics, StreamRuntime, Topology};
use repartitioner_table::KeyedTable;

pub async fn run(
    config_path: Option<PathBuf>,
    port: u16,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("repartitioner daemon starting in standalone mode");

    let config = RepartitionerConfig::load(config_path.as_deref())?;
    let threshold = config.health.rebalancing_max()?;
    info!(
        application = %config.application.name,
        input_topic = %config.stream.input_topic,
        instances = config.stream.instances,
        threads_per_instance = config.stream.threads_per_instance,
        table = %config.table.name,
        store = %config.table.store,
        cache_backend = ?config.cache.backend,
        cache_address = %config.cache.address,
        rebalancing_max = %format_iso8601(threshold),
        "effective configuration"
    );

    // ── Keyed table ────────────────────────────────────────────

    let table_path = config
        .table
        .path
        .clone()
        .or_else(|| data_dir.map(|dir| dir.join(format!("{}.redb", config.table.store))));
    let table = open_table(table_path.as_deref())?;

    // ── Cache ──────────────────────────────────────────────────

    let cache = repartitioner_cache::from_config(&config.cache)?;
    let pinger = cache.clone();
    match tokio::task::spawn_blocking(move || pinger.ping()).await? {
        Ok(()) => info!(backend = cache.backend_name(), "cache reachable"),
        Err(e) => warn!(
            backend = cache.backend_name(),
            error = %e,
            "cache not reachable yet; records will be processed without it"
        ),
    }

    // ── Stream runtimes ────────────────────────────────────────

    let metrics = Arc::new(StageMetrics::new());
    let registry = Arc::new(RuntimeRegistry::new(config.stream.input_topic.clone()));
    let health = Arc::new(HealthIndicator::new(
        config.application.name.clone(),
        registry.clone() as Arc<dyn InstanceProvider>,
        threshold,
    ));

    let slots: Vec<usize> = (0..config.stream.instances)
        .map(|_| registry.reserve())
        .collect();

    let topology = Arc::new(Topology::new(
        config.stream.input_topic.clone(),
        cache,
        table.clone(),
        metrics.clone(),
    ));

    for (ordinal, slot) in slots.into_iter().enumerate() {
        let id = format!("{}-topology-{ordinal}", config.application.name);
        let runtime = Arc::new(StreamRuntime::new(
            id.clone(),
            topology.clone(),
            config.stream.channel_capacity,
        ));
        registry.install(slot, runtime.clone());
        runtime.start(config.stream.threads_per_instance as usize)?;
        info!(instance = %id, "stream runtime started");
    }

    // ── API server ─────────────────────────────────────────────

    let router = build_router(ApiState {
        application: config.application.name.clone(),
        registry: registry.clone(),
        table,
        health,
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    // Joining worker threads blocks.
    tokio::task::spawn_blocking(move || registry.close_all()).await?;

    info!("repartitioner daemon stopped");
    Ok(())
}

fn open_table(path: Option<&Path>) -> anyhow::Result<KeyedTable> {
    let Some(path) = path else {
        info!("keyed table running in memory");
        return Ok(KeyedTable::open_in_memory()?);
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let table = KeyedTable::open(path)?;
    let removed = table.compact_changelog()?;
    info!(?path, entries = table.len()?, compacted = removed, "keyed table opened");
    Ok(table)
}
