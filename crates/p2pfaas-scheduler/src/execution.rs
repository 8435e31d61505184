//! Enacting a decision: run the job here or send it to a peer.
//!
//! Both paths stamp `scheduled_at` and always hand back a `JobResult`, also
//! on failure, so callers can still report timings and the policy name.

use tracing::{debug, error};

use p2pfaas_core::{ApiResponse, PeerJobRequest, ServiceRequest, TimingsStart, payload};

use crate::context::SchedulerContext;
use crate::error::{JobFailure, ScheduleResult, SchedulerError};
use crate::job::{ExternalExecutionInfo, JobResult};

impl SchedulerContext {
    /// Run the job through the local admission queue and wait for it.
    pub async fn execute_locally(
        &self,
        mut request: ServiceRequest,
        mut timings_start: TimingsStart,
        scheduler: &str,
    ) -> ScheduleResult {
        debug!(
            request_id = request.id,
            tracing_id = %request.tracing_id,
            function = %request.function_name,
            external = request.external,
            "scheduled to run locally"
        );
        timings_start.mark_scheduled();
        let mut result = JobResult::new(scheduler, timings_start);

        let free_slots = self.free_slots();
        if !self.queue.enabled() && free_slots == 0 {
            debug!(request_id = request.id, free_slots, "no free slot and queue disabled");
            return Err(JobFailure::new(
                SchedulerError::JobCannotBeScheduled("no free execution slot".into()),
                result,
            ));
        }

        // Peer envelopes carry the payload as base64 text.
        if request.external {
            match payload::decode(&request.payload) {
                Ok(raw) => request.payload = raw,
                Err(e) => {
                    debug!(request_id = request.id, error = %e, "invalid base64 payload");
                    return Err(JobFailure::new(
                        SchedulerError::JobCannotBeScheduled(format!("invalid payload: {e}")),
                        result,
                    ));
                }
            }
        }

        let request_id = request.id;
        let completed = match self.queue.enqueue(request).await {
            Ok(completed) => completed,
            Err(e) => {
                debug!(request_id, error = %e, "cannot add job to queue, job discarded");
                return Err(JobFailure::new(
                    SchedulerError::JobCannotBeScheduled(e.to_string()),
                    result,
                ));
            }
        };

        if let Some(response) = &completed.response {
            debug!(request_id, status_code = response.status_code, "local execution done");
        }
        result.response = completed.response;
        result.error_execution = completed.error_execution;
        result.timings.execution_time = Some(completed.execution_time);
        Ok(result)
    }

    /// Forward the job to `peer` and wait for its reply.
    pub async fn execute_externally(
        &self,
        request: ServiceRequest,
        peer: &str,
        mut timings_start: TimingsStart,
        scheduler: &str,
    ) -> ScheduleResult {
        debug!(
            request_id = request.id,
            tracing_id = %request.tracing_id,
            function = %request.function_name,
            %peer,
            "scheduled to run at peer"
        );
        timings_start.mark_scheduled();
        let mut result = JobResult::new(scheduler, timings_start);
        result.external_execution = true;

        let envelope = prepare_forward_request(&request);
        let reply = self.forwarder.forward(peer, &envelope).await;

        match reply {
            Err(e) => {
                error!(request_id = request.id, %peer, error = %e, "request to peer failed");
                result.error_execution = true;
                Err(JobFailure::new(
                    SchedulerError::JobCannotBeForwarded {
                        peer: peer.to_string(),
                        reason: e.to_string(),
                    },
                    result,
                ))
            }
            Ok(None) => {
                error!(request_id = request.id, %peer, "response from peer is empty");
                result.error_execution = true;
                Err(JobFailure::new(
                    SchedulerError::PeerResponseNil {
                        peer: peer.to_string(),
                    },
                    result,
                ))
            }
            Ok(Some(reply)) => {
                debug!(
                    request_id = request.id,
                    %peer,
                    status_code = reply.status_code,
                    hops = reply.peers_list.len(),
                    "response from peer"
                );
                result.response = Some(ApiResponse {
                    headers: Default::default(),
                    body: reply.body.into_bytes(),
                    status_code: reply.status_code,
                });
                result.external_info = Some(ExternalExecutionInfo {
                    peer: peer.to_string(),
                    peers_list: reply.peers_list,
                });
                Ok(result)
            }
        }
    }
}

/// Build the envelope sent to the next peer.
///
/// A locally originated job starts at one hop with its payload encoded; a
/// job that already arrived from a peer keeps its base64 payload and
/// envelope fields and gains one hop.
pub fn prepare_forward_request(request: &ServiceRequest) -> PeerJobRequest {
    let mut envelope = PeerJobRequest {
        service_id_request: request.id,
        service_id_tracing: request.tracing_id.clone(),
        function_name: request.function_name.clone(),
        hops: 1,
        peers_list: Vec::new(),
        payload: String::new(),
        content_type: request.content_type.clone(),
        headers: request.headers.clone(),
    };

    match (&request.peer_request, request.external) {
        (Some(incoming), true) => {
            envelope.hops = incoming.hops + 1;
            envelope.peers_list = incoming.peers_list.clone();
            envelope.headers = incoming.headers.clone();
            envelope.payload = String::from_utf8_lossy(&request.payload).into_owned();
        }
        (None, true) => {
            envelope.payload = String::from_utf8_lossy(&request.payload).into_owned();
        }
        _ => {
            envelope.payload = payload::encode(&request.payload);
        }
    }

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestNode, external_request, local_request};

    #[test]
    fn local_job_is_encoded_at_first_hop() {
        let req = local_request("figlet", b"\x00\xffhello");
        let envelope = prepare_forward_request(&req);
        assert_eq!(envelope.hops, 1);
        assert_eq!(payload::decode(envelope.payload.as_bytes()).unwrap(), b"\x00\xffhello");
        assert_eq!(envelope.function_name, "figlet");
    }

    #[test]
    fn reforwarded_job_passes_payload_and_gains_a_hop() {
        let req = external_request("figlet", b"hello", 2);
        let envelope = prepare_forward_request(&req);
        assert_eq!(envelope.hops, 3);
        assert_eq!(envelope.payload, payload::encode(b"hello"));
    }

    #[tokio::test]
    async fn local_execution_reports_execution_time() {
        let node = TestNode::builder().build();
        let result = node
            .ctx
            .execute_locally(local_request("echo", b"hi"), TimingsStart::arrived_now(), "S")
            .await
            .unwrap();

        assert_eq!(result.response.unwrap().body, b"hi");
        assert!(!result.external_execution);
        assert!(result.timings.execution_time.is_some());
        assert!(result.timings_start.scheduled_at.is_some());
        assert_eq!(result.scheduler, "S");
    }

    #[tokio::test]
    async fn external_payload_is_decoded_before_execution() {
        let node = TestNode::builder().build();
        let result = node
            .ctx
            .execute_locally(external_request("echo", b"raw bytes", 1), TimingsStart::arrived_now(), "S")
            .await
            .unwrap();
        assert_eq!(result.response.unwrap().body, b"raw bytes");
    }

    #[tokio::test]
    async fn undecodable_external_payload_cannot_be_scheduled() {
        let node = TestNode::builder().build();
        let mut req = external_request("echo", b"", 1);
        req.payload = b"%%% not base64".to_vec();

        let failure = node
            .ctx
            .execute_locally(req, TimingsStart::arrived_now(), "S")
            .await
            .unwrap_err();
        assert!(matches!(failure.error, SchedulerError::JobCannotBeScheduled(_)));
    }

    #[tokio::test]
    async fn disabled_queue_without_free_slot_fails_fast() {
        let node = TestNode::builder().running_max(0).queue_enabled(false).build();
        let failure = node
            .ctx
            .execute_locally(local_request("echo", b"x"), TimingsStart::arrived_now(), "S")
            .await
            .unwrap_err();
        assert!(matches!(failure.error, SchedulerError::JobCannotBeScheduled(_)));
        assert_eq!(failure.result.scheduler, "S");
    }

    #[tokio::test]
    async fn forward_failure_is_job_cannot_be_forwarded() {
        let node = TestNode::builder().peers(&["10.0.0.2"]).build();
        node.forwarder.fail_for("10.0.0.2");

        let failure = node
            .ctx
            .execute_externally(local_request("echo", b"x"), "10.0.0.2", TimingsStart::arrived_now(), "S")
            .await
            .unwrap_err();
        assert!(matches!(failure.error, SchedulerError::JobCannotBeForwarded { .. }));
        assert!(failure.result.error_execution);
        assert!(failure.result.external_execution);
    }

    #[tokio::test]
    async fn empty_peer_reply_is_peer_response_nil() {
        let node = TestNode::builder().peers(&["10.0.0.2"]).build();
        node.forwarder.empty_for("10.0.0.2");

        let failure = node
            .ctx
            .execute_externally(local_request("echo", b"x"), "10.0.0.2", TimingsStart::arrived_now(), "S")
            .await
            .unwrap_err();
        assert_eq!(
            failure.error,
            SchedulerError::PeerResponseNil {
                peer: "10.0.0.2".into()
            }
        );
    }

    #[tokio::test]
    async fn forwarded_job_keeps_base64_body_and_path() {
        let node = TestNode::builder().peers(&["10.0.0.2"]).build();
        let result = node
            .ctx
            .execute_externally(local_request("echo", b"ping"), "10.0.0.2", TimingsStart::arrived_now(), "S")
            .await
            .unwrap();

        let response = result.response.as_ref().unwrap();
        assert_eq!(payload::decode(&response.body).unwrap(), b"ping");
        assert_eq!(result.peers_list().len(), 1);
        assert_eq!(result.peers_list()[0].machine_ip, "10.0.0.2");
        assert_eq!(node.forwarder.sent()[0].0, "10.0.0.2");
        assert_eq!(node.forwarder.sent()[0].1.hops, 1);
    }
}
