//! Read-only client of the discovery service.
//!
//! The discovery service owns membership; this node only reads the list of
//! alive peers (`GET /list`) and its own identity (`GET /configuration`).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use p2pfaas_core::{DiscoveryError, PeerDirectory};

use crate::client::HttpClient;
use crate::error::{NetError, NetResult};

/// Entry of the discovery service's machine list. Only the address is
/// consumed.
#[derive(Debug, Clone, Deserialize)]
struct Machine {
    ip: String,
}

/// Identity the discovery service knows this node by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MachineConfiguration {
    pub machine_id: String,
    pub machine_ip: String,
}

pub struct DiscoveryClient {
    client: HttpClient,
    address: String,
    cache: RwLock<Vec<String>>,
}

impl DiscoveryClient {
    pub fn new(client: HttpClient, address: impl Into<String>) -> Self {
        Self {
            client,
            address: address.into(),
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the alive peers and replace the cached list.
    pub async fn refresh(&self) -> NetResult<Vec<String>> {
        let machines: Vec<Machine> = self.get_json("/list").await?;
        let ips: Vec<String> = machines
            .into_iter()
            .map(|m| m.ip)
            .filter(|ip| !ip.is_empty())
            .collect();
        debug!(peers = ips.len(), "peer list refreshed");
        *self.cache.write().await = ips.clone();
        Ok(ips)
    }

    pub async fn cached(&self) -> Vec<String> {
        self.cache.read().await.clone()
    }

    pub async fn fetch_configuration(&self) -> NetResult<MachineConfiguration> {
        self.get_json("/configuration").await
    }

    /// Refresh the cached list every `interval` until shutdown.
    pub async fn refresh_loop(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "peer list refresh started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "peer list refresh failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("peer list refresh shutting down");
                    break;
                }
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> NetResult<T> {
        let reply = self.client.get(&self.address, path, &[]).await?;
        let uri = format!("http://{}{path}", self.address);
        if !reply.status.is_success() {
            return Err(NetError::Status {
                uri,
                status: reply.status.as_u16(),
            });
        }
        serde_json::from_slice(&reply.body).map_err(|source| NetError::Decode { uri, source })
    }
}

#[async_trait]
impl PeerDirectory for DiscoveryClient {
    async fn machines(&self, cached: bool) -> Result<Vec<String>, DiscoveryError> {
        if cached {
            let list = self.cached().await;
            if !list.is_empty() {
                return Ok(list);
            }
        }
        self.refresh()
            .await
            .map_err(|e| DiscoveryError::Unavailable(e.to_string()))
    }
}
