//! Client side of the peer protocol.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use p2pfaas_core::{PeerForwarder, PeerJobRequest, PeerJobResponse, headers};

use crate::client::{HttpClient, HttpReply};
use crate::peer_address;

/// Posts job envelopes to `/peer/function/{name}` on a peer.
///
/// Transport failures are errors. A reply that carries no envelope (empty
/// body, or anything that does not decode as one) is `Ok(None)`.
#[derive(Debug, Clone)]
pub struct HttpPeerForwarder {
    client: HttpClient,
    peer_port: u16,
}

impl HttpPeerForwarder {
    pub fn new(client: HttpClient, peer_port: u16) -> Self {
        Self { client, peer_port }
    }
}

#[async_trait]
impl PeerForwarder for HttpPeerForwarder {
    async fn forward(
        &self,
        machine: &str,
        request: &PeerJobRequest,
    ) -> anyhow::Result<Option<PeerJobResponse>> {
        let address = peer_address(machine, self.peer_port);
        let path = format!("/peer/function/{}", request.function_name);
        let body = serde_json::to_vec(request)?;

        let mut hdrs = vec![
            ("content-type", "application/json"),
            ("user-agent", headers::USER_AGENT_MACHINE),
        ];
        if !request.service_id_tracing.is_empty() {
            hdrs.push((headers::SCHEDULER_TRACING_ID, request.service_id_tracing.as_str()));
        }

        debug!(
            peer = %address,
            function = %request.function_name,
            hops = request.hops,
            "forwarding job"
        );
        let reply = self.client.post(&address, &path, &hdrs, Bytes::from(body)).await?;
        Ok(decode_envelope(machine, &reply))
    }
}

fn decode_envelope(machine: &str, reply: &HttpReply) -> Option<PeerJobResponse> {
    if reply.body.is_empty() {
        warn!(peer = %machine, status = reply.status.as_u16(), "peer replied without a body");
        return None;
    }
    match serde_json::from_slice::<PeerJobResponse>(&reply.body) {
        Ok(mut envelope) => {
            if envelope.status_code == 0 {
                envelope.status_code = reply.status.as_u16();
            }
            Some(envelope)
        }
        Err(e) => {
            warn!(peer = %machine, status = reply.status.as_u16(), error = %e, "cannot decode peer reply");
            None
        }
    }
}
