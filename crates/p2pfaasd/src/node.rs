//! Node assembly: builds every subsystem from the configuration, serves
//! the API and tears things down on Ctrl-C.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use p2pfaas_api::{ApiState, build_router};
use p2pfaas_core::config::read_json_file;
use p2pfaas_core::{DynamicConfig, NodeConfig, PeerDirectory, SchedulerDescriptor};
use p2pfaas_learner::{SocketPool, TcpConnector};
use p2pfaas_net::{DiscoveryClient, HttpClient, HttpFaasBackend, HttpLoadSource, HttpPeerForwarder};
use p2pfaas_scheduler::{
    AdmissionQueue, LoadProber, LoadTable, NodeIdentity, Policy, QueueConfig, SchedulerContext,
    SchedulerService,
};

const IDENTITY_ATTEMPTS: u32 = 5;
const IDENTITY_RETRY_DELAY: Duration = Duration::from_secs(2);

pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    info!(port = config.listening_port, data = ?config.data_path, "P2PFaaS node starting");

    if let Err(e) = std::fs::create_dir_all(&config.data_path) {
        warn!(path = ?config.data_path, error = %e, "cannot create data directory");
    }

    // ── Persisted runtime configuration ────────────────────────

    let dynamic: DynamicConfig = load_or_default(&config.dynamic_config_path(), "configuration");
    let policy = match read_json_file::<SchedulerDescriptor>(&config.scheduler_config_path()) {
        Ok(Some(descriptor)) => Policy::from_descriptor(&descriptor).unwrap_or_else(|e| {
            warn!(error = %e, "stored scheduler is not valid, using the default");
            Policy::default()
        }),
        Ok(None) => Policy::default(),
        Err(e) => {
            warn!(error = %e, "cannot read stored scheduler, using the default");
            Policy::default()
        }
    };
    info!(?dynamic, scheduler = %policy.full_name(), "runtime configuration loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Discovery and identity ─────────────────────────────────

    let discovery = Arc::new(DiscoveryClient::new(
        HttpClient::new(config.timeouts.discovery()),
        config.discovery_address(),
    ));
    let identity = resolve_identity(&config, &discovery).await;
    info!(machine_id = %identity.machine_id, machine_ip = %identity.machine_ip, "node identity");

    match discovery.refresh().await {
        Ok(peers) => info!(peers = peers.len(), "initial peer list fetched"),
        Err(e) => warn!(error = %e, "cannot fetch initial peer list"),
    }
    let refresh_handle = {
        let discovery = discovery.clone();
        let interval = Duration::from_secs(config.discovery.refresh_interval_secs);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { discovery.refresh_loop(interval, shutdown).await })
    };

    // ── Execution ──────────────────────────────────────────────

    let load = Arc::new(LoadTable::new());
    let backend = Arc::new(HttpFaasBackend::new(
        HttpClient::new(config.timeouts.faas()),
        config.faas_address(),
    ));
    let queue = AdmissionQueue::start(
        QueueConfig::from(dynamic),
        backend,
        load.clone(),
        shutdown_rx.clone(),
    );

    // ── Peers ──────────────────────────────────────────────────

    let directory: Arc<dyn PeerDirectory> = discovery.clone();
    let prober = LoadProber::new(
        directory.clone(),
        Arc::new(HttpLoadSource::new(
            HttpClient::new(config.timeouts.probe()),
            config.listening_port,
        )),
    );
    let forwarder = Arc::new(HttpPeerForwarder::new(
        HttpClient::new(config.timeouts.peer()),
        config.listening_port,
    ));

    // ── Learning service ───────────────────────────────────────

    let pool = SocketPool::start(
        Arc::new(TcpConnector::new(config.learner_address(), config.timeouts.peer())),
        config.learner.pool_size,
    );
    if config.learner.enabled {
        let pool = pool.clone();
        tokio::spawn(async move {
            let connected = pool.connect_all().await;
            info!(connected, size = pool.size(), "learner connections opened");
        });
    }

    // ── Scheduler and API ──────────────────────────────────────

    let ctx = SchedulerContext {
        queue,
        load,
        directory,
        prober,
        forwarder,
        learner: Some(Arc::new(pool.clone())),
        identity,
    };
    let scheduler = Arc::new(SchedulerService::new(ctx, policy));
    let state = ApiState::new(
        scheduler,
        dynamic,
        config.dynamic_config_path(),
        config.scheduler_config_path(),
    );

    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listening_port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    pool.shutdown().await;
    let _ = refresh_handle.await;

    info!("P2PFaaS node stopped");
    Ok(())
}

/// Stored JSON value at `path`, or the default when missing or unreadable.
fn load_or_default<T>(path: &Path, what: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match read_json_file::<T>(path) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            warn!(%what, error = %e, "cannot read stored value, using defaults");
            T::default()
        }
    }
}

/// Identity from the configuration, falling back to what the discovery
/// service reports for this machine.
async fn resolve_identity(config: &NodeConfig, discovery: &DiscoveryClient) -> NodeIdentity {
    if let (Some(id), Some(ip)) = (&config.node.machine_id, &config.node.machine_ip) {
        return NodeIdentity::new(id.clone(), ip.clone());
    }

    for attempt in 1..=IDENTITY_ATTEMPTS {
        match discovery.fetch_configuration().await {
            Ok(remote) => {
                return NodeIdentity::new(
                    config.node.machine_id.clone().unwrap_or(remote.machine_id),
                    config.node.machine_ip.clone().unwrap_or(remote.machine_ip),
                );
            }
            Err(e) => {
                warn!(attempt, error = %e, "cannot fetch machine configuration");
                tokio::time::sleep(IDENTITY_RETRY_DELAY).await;
            }
        }
    }

    warn!("discovery did not report an identity, peers lists will carry blanks");
    NodeIdentity::new(
        config.node.machine_id.clone().unwrap_or_default(),
        config.node.machine_ip.clone().unwrap_or_default(),
    )
}
