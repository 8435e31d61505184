//! Client entry point: `/function/{function}`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use bytes::Bytes;
use tracing::{debug, error, warn};

use p2pfaas_core::{ServiceRequest, headers};
use p2pfaas_scheduler::peer::append_self;
use p2pfaas_scheduler::{ReplyCode, ScheduleResult, SchedulerError};

use crate::ApiState;
use crate::reply::{self, header_value, x_headers};

/// GET, POST /function/{function}
///
/// Schedules the call with the active policy unless the client asks for a
/// bypass, a forced forward or a rejection through the scheduler headers.
pub async fn execute_function(
    State(state): State<ApiState>,
    Path(function): Path<String>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let tracing_id = header_value(&request_headers, headers::SCHEDULER_TRACING_ID);
    let scheduler = &state.scheduler;
    let ctx = scheduler.context();

    if function.is_empty() {
        debug!(%tracing_id, "function not specified");
        return reply::error(
            ReplyCode::GENERIC,
            "function is not specified",
            reply::result_headers(&scheduler.full_name(), None),
        );
    }

    let id = ctx.load.next_request_id();
    debug!(request_id = id, %tracing_id, %function, "execute function called");

    let request = ServiceRequest {
        id,
        tracing_id: tracing_id.clone(),
        function_name: function.clone(),
        task_type: 0,
        payload: body.to_vec(),
        content_type: header_value(&request_headers, header::CONTENT_TYPE.as_str()),
        headers: x_headers(&request_headers),
        external: false,
        peer_request: None,
    };

    let requested = |name: &str| !header_value(&request_headers, name).is_empty();
    let outcome: ScheduleResult = if requested(headers::SCHEDULER_BYPASS) {
        scheduler.schedule_bypass(request).await
    } else if requested(headers::SCHEDULER_FORWARD) {
        scheduler.schedule_forward(request).await
    } else if requested(headers::SCHEDULER_REJECT) {
        scheduler.schedule_reject(request).await
    } else {
        scheduler.schedule(request).await
    };

    let active = scheduler.full_name();
    match outcome {
        Ok(mut result) => {
            if result.response.is_none() {
                error!(request_id = id, %tracing_id, "job completed without a response");
                return reply::error(
                    ReplyCode::GENERIC,
                    format!("[R#{id},T{tracing_id}] job completed without a response"),
                    reply::result_headers(&active, Some(&result)),
                );
            }
            append_self(&mut result, &ctx.identity);
            debug!(
                request_id = id,
                %tracing_id,
                %function,
                external = result.external_execution,
                status = result.response.as_ref().map(|r| r.status_code),
                "execute function done"
            );
            reply::job_success(&active, &result)
        }
        Err(failure) => {
            let e = &failure.error;
            if e.is_rejection() || matches!(e, SchedulerError::JobCannotBeScheduled(_)) {
                debug!(request_id = id, %tracing_id, error = %e, "job not run")
            } else {
                warn!(request_id = id, %tracing_id, error = %e, "job failed")
            }
            reply::error(
                failure.error.reply_code(),
                failure.error.to_string(),
                reply::result_headers(&active, Some(&failure.result)),
            )
        }
    }
}
