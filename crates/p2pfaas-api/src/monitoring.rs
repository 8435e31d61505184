use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use p2pfaas_core::headers;

use crate::ApiState;

/// GET /monitoring/load
///
/// Load is reported in headers only; peers probing this node read them.
pub async fn load(State(state): State<ApiState>) -> impl IntoResponse {
    let ctx = state.scheduler.context();
    (
        StatusCode::OK,
        [
            (headers::MONITORING_LOAD, ctx.load.total_running().to_string()),
            (headers::MONITORING_MAX_LOAD, ctx.queue.running_max().to_string()),
            (headers::MONITORING_QUEUE_LENGTH, ctx.queue.len().to_string()),
        ],
    )
}
