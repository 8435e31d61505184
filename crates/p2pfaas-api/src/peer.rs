//! Peer entry point: `/peer/function/{function}`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, warn};

use p2pfaas_core::{PeerJobRequest, headers};
use p2pfaas_scheduler::ReplyCode;
use p2pfaas_scheduler::peer::{peer_response, request_from_peer};

use crate::ApiState;
use crate::reply::{self, header_value, x_headers};

/// POST /peer/function/{function}
///
/// Only other nodes (user agent `Machine`) may call it. The job goes
/// through the active policy like a client call, and the reply is always
/// a peer envelope whose HTTP status matches its `status_code`.
pub async fn execute_from_peer(
    State(state): State<ApiState>,
    Path(function): Path<String>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let tracing_id = header_value(&request_headers, headers::SCHEDULER_TRACING_ID);

    if header_value(&request_headers, header::USER_AGENT.as_str()) != headers::USER_AGENT_MACHINE {
        warn!(%tracing_id, "peer endpoint called by a non-machine client");
        return reply::error(ReplyCode::GENERIC, "", HashMap::new());
    }

    let ctx = state.scheduler.context();
    let id = ctx.load.next_peer_request_id();

    let envelope: PeerJobRequest = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            warn!(request_id = id, %tracing_id, error = %e, "cannot parse peer request");
            return reply::error(ReplyCode::INPUT_NOT_VALID, "", HashMap::new());
        }
    };
    debug!(
        request_id = id,
        %tracing_id,
        %function,
        hops = envelope.hops,
        peers = envelope.peers_list.len(),
        "job received from peer"
    );

    let request = request_from_peer(id, tracing_id, &function, envelope, x_headers(&request_headers));
    let outcome = state.scheduler.schedule(request).await;
    let response = peer_response(outcome, &ctx.identity);

    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::to_vec(&response) {
        Ok(json) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            json,
        )
            .into_response(),
        Err(e) => {
            warn!(request_id = id, error = %e, "cannot encode peer response");
            reply::error(ReplyCode::GENERIC, e.to_string(), HashMap::new())
        }
    }
}
