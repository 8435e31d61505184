//! Peer load probing over the monitoring endpoint.

use async_trait::async_trait;
use http::HeaderMap;

use p2pfaas_core::{LoadSource, PeerLoad, headers};

use crate::client::HttpClient;
use crate::error::{NetError, NetResult};
use crate::peer_address;

pub const MONITORING_LOAD_PATH: &str = "/monitoring/load";

/// Reads a peer's load from the headers of `GET /monitoring/load`.
#[derive(Debug, Clone)]
pub struct HttpLoadSource {
    client: HttpClient,
    peer_port: u16,
}

impl HttpLoadSource {
    pub fn new(client: HttpClient, peer_port: u16) -> Self {
        Self { client, peer_port }
    }
}

#[async_trait]
impl LoadSource for HttpLoadSource {
    async fn load(&self, machine: &str) -> anyhow::Result<PeerLoad> {
        let address = peer_address(machine, self.peer_port);
        let reply = self
            .client
            .get(&address, MONITORING_LOAD_PATH, &[("user-agent", headers::USER_AGENT_MACHINE)])
            .await?;
        if !reply.status.is_success() {
            return Err(NetError::Status {
                uri: format!("http://{address}{MONITORING_LOAD_PATH}"),
                status: reply.status.as_u16(),
            }
            .into());
        }
        Ok(parse_load(&reply.headers)?)
    }
}

/// Running and queued counts are required; the running limit is optional.
pub fn parse_load(map: &HeaderMap) -> NetResult<PeerLoad> {
    Ok(PeerLoad {
        running: required(map, headers::MONITORING_LOAD)?,
        queue_length: required(map, headers::MONITORING_QUEUE_LENGTH)?,
        max_running: optional(map, headers::MONITORING_MAX_LOAD)?,
    })
}

fn required(map: &HeaderMap, name: &'static str) -> NetResult<u32> {
    optional(map, name)?.ok_or(NetError::Header {
        name,
        reason: "missing".to_string(),
    })
}

fn optional(map: &HeaderMap, name: &'static str) -> NetResult<Option<u32>> {
    let Some(value) = map.get(name) else {
        return Ok(None);
    };
    let text = value.to_str().map_err(|e| NetError::Header {
        name,
        reason: e.to_string(),
    })?;
    text.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| NetError::Header {
            name,
            reason: format!("{text:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use http::{HeaderName, HeaderValue};
    use std::time::Duration;

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            let name = HeaderName::from_bytes(k.as_bytes()).unwrap();
            map.insert(name, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn parses_all_headers() {
        let load = parse_load(&map(&[
            (headers::MONITORING_LOAD, "3"),
            (headers::MONITORING_QUEUE_LENGTH, "2"),
            (headers::MONITORING_MAX_LOAD, "4"),
        ]))
        .unwrap();
        assert_eq!(load.running, 3);
        assert_eq!(load.queue_length, 2);
        assert_eq!(load.max_running, Some(4));
        assert_eq!(load.total(), 5);
    }

    #[test]
    fn missing_queue_length_is_an_error() {
        let err = parse_load(&map(&[(headers::MONITORING_LOAD, "3")])).unwrap_err();
        assert!(matches!(err, NetError::Header { name, .. } if name == headers::MONITORING_QUEUE_LENGTH));
    }

    #[test]
    fn non_numeric_load_is_an_error() {
        let err = parse_load(&map(&[
            (headers::MONITORING_LOAD, "many"),
            (headers::MONITORING_QUEUE_LENGTH, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, NetError::Header { .. }));
    }

    #[tokio::test]
    async fn load_reads_monitoring_endpoint() {
        let router = Router::new().route(
            MONITORING_LOAD_PATH,
            get(|| async {
                [
                    (headers::MONITORING_LOAD, "1"),
                    (headers::MONITORING_MAX_LOAD, "4"),
                    (headers::MONITORING_QUEUE_LENGTH, "6"),
                ]
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let source = HttpLoadSource::new(HttpClient::new(Duration::from_secs(2)), 1);
        let load = source.load(&address).await.unwrap();
        assert_eq!(load.total(), 7);
    }
}
