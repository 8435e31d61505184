//! Receiving side of the peer protocol.
//!
//! A node that handles a peer job (executing it or relaying it) appends
//! itself to the peers list before replying, so the path grows by one entry
//! per node on the way back:
//!
//! ```text
//! origin ──► relay ──► executor
//!                         peers_list = [executor]
//!            peers_list = [executor, relay]
//! peers_list = [executor, relay, origin]     hops = len - 1 = 2
//! ```

use std::collections::HashMap;

use tracing::debug;

use p2pfaas_core::{PeerJobRequest, PeerJobResponse, PeersListMember, ServiceRequest, payload};

use crate::context::NodeIdentity;
use crate::error::{ReplyCode, ScheduleResult};
use crate::job::JobResult;

/// Build the service request for a job received from a peer.
///
/// The payload stays base64 until the job is executed here.
pub fn request_from_peer(
    id: u64,
    tracing_id: String,
    function: &str,
    mut envelope: PeerJobRequest,
    headers: HashMap<String, String>,
) -> ServiceRequest {
    envelope.service_id_request = id;
    envelope.service_id_tracing = tracing_id.clone();
    ServiceRequest {
        id,
        tracing_id,
        function_name: function.to_string(),
        task_type: 0,
        payload: envelope.payload.clone().into_bytes(),
        content_type: envelope.content_type.clone(),
        headers,
        external: true,
        peer_request: Some(envelope),
    }
}

/// Append this node to the job's path, after deriving its own timings.
///
/// Returns the full path, executing node first.
pub fn append_self(result: &mut JobResult, identity: &NodeIdentity) -> Vec<PeersListMember> {
    result.compute_timings();
    let me = identity.peers_list_member(result.timings);
    match result.external_info.as_mut() {
        Some(info) if result.external_execution => {
            info.peers_list.push(me);
            info.peers_list.clone()
        }
        _ => vec![me],
    }
}

/// Turn a schedule outcome into the envelope returned to the calling peer.
///
/// The HTTP status of the reply equals `status_code`. Bodies produced on
/// this node (function output or error reply) are base64-encoded; a body
/// relayed from a further peer is already encoded and passes through.
pub fn peer_response(outcome: ScheduleResult, identity: &NodeIdentity) -> PeerJobResponse {
    let (mut result, error) = match outcome {
        Ok(result) => (result, None),
        Err(failure) => (*failure.result, Some(failure.error)),
    };
    let peers_list = append_self(&mut result, identity);

    let relayed = result.external_execution && error.is_none();
    let (body, status_code) = match (&error, result.response.take()) {
        (Some(e), _) => {
            debug!(error = %e, "peer job failed");
            let code = e.reply_code();
            (e.error_reply().to_json().into_bytes(), code.status)
        }
        (None, Some(response)) => (response.body, response.status_code),
        (None, None) => {
            let code = ReplyCode::GENERIC;
            (code.reply("function execution failed").to_json().into_bytes(), code.status)
        }
    };

    let body = if relayed {
        String::from_utf8_lossy(&body).into_owned()
    } else {
        payload::encode(&body)
    };

    PeerJobResponse {
        peers_list,
        body,
        status_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JobFailure, SchedulerError};
    use crate::job::ExternalExecutionInfo;
    use p2pfaas_core::{ApiResponse, Timings, TimingsStart};

    fn me() -> NodeIdentity {
        NodeIdentity::new("node-b", "10.0.0.2")
    }

    fn member(ip: &str) -> PeersListMember {
        PeersListMember {
            machine_id: format!("id-{ip}"),
            machine_ip: ip.to_string(),
            timings: Timings::default(),
        }
    }

    #[test]
    fn request_from_peer_keeps_payload_encoded() {
        let envelope = PeerJobRequest {
            service_id_request: 99,
            function_name: "figlet".into(),
            hops: 1,
            payload: payload::encode(b"hi"),
            content_type: "text/plain".into(),
            ..Default::default()
        };
        let req = request_from_peer(3, "t-1".into(), "figlet", envelope, HashMap::new());
        assert!(req.external);
        assert_eq!(req.id, 3);
        assert_eq!(req.hops(), 1);
        assert_eq!(req.payload, b"aGk=");
        assert_eq!(req.peer_request.unwrap().service_id_request, 3);
    }

    #[test]
    fn local_execution_encodes_body_and_starts_path() {
        let mut result = JobResult::new("S", TimingsStart::arrived_now());
        result.response = Some(ApiResponse {
            body: b"\x00binary".to_vec(),
            status_code: 200,
            ..Default::default()
        });
        result.timings.execution_time = Some(0.25);

        let resp = peer_response(Ok(result), &me());
        assert_eq!(resp.status_code, 200);
        assert_eq!(payload::decode(resp.body.as_bytes()).unwrap(), b"\x00binary");
        assert_eq!(resp.peers_list.len(), 1);
        assert_eq!(resp.peers_list[0].machine_ip, "10.0.0.2");
        assert_eq!(resp.peers_list[0].timings.execution_time, Some(0.25));
        assert!(resp.peers_list[0].timings.total_time.is_some());
    }

    #[test]
    fn relayed_body_passes_through_and_path_grows() {
        let mut result = JobResult::new("S", TimingsStart::arrived_now());
        result.external_execution = true;
        result.response = Some(ApiResponse {
            body: b"aGk=".to_vec(),
            status_code: 200,
            ..Default::default()
        });
        result.external_info = Some(ExternalExecutionInfo {
            peer: "10.0.0.3".into(),
            peers_list: vec![member("10.0.0.3")],
        });

        let resp = peer_response(Ok(result), &me());
        assert_eq!(resp.body, "aGk=");
        let ips: Vec<_> = resp.peers_list.iter().map(|m| m.machine_ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.3", "10.0.0.2"]);
    }

    #[test]
    fn errors_become_encoded_error_replies() {
        let failure = JobFailure::new(
            SchedulerError::JobCannotBeScheduled("queue full".into()),
            JobResult::new("S", TimingsStart::arrived_now()),
        );
        let resp = peer_response(Err(failure), &me());
        assert_eq!(resp.status_code, 500);
        let body = payload::decode(resp.body.as_bytes()).unwrap();
        let reply: crate::error::ErrorReply = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply.code, 400);
        assert_eq!(resp.peers_list.len(), 1);
    }

    #[test]
    fn rejection_keeps_its_own_status() {
        let failure = JobFailure::new(
            SchedulerError::JobDeliberatelyRejected,
            JobResult::new("S", TimingsStart::arrived_now()),
        );
        assert_eq!(peer_response(Err(failure), &me()).status_code, 503);
    }
}
