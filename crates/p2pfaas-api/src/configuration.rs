//! Runtime configuration endpoints.
//!
//! Accepted changes are written back to the data directory so they survive
//! a restart.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{error, info, warn};

use p2pfaas_core::config::write_json_file;
use p2pfaas_core::{DynamicConfig, SchedulerDescriptor};
use p2pfaas_scheduler::ReplyCode;

use crate::ApiState;
use crate::reply;

/// GET /configuration
pub async fn get_configuration(State(state): State<ApiState>) -> Json<DynamicConfig> {
    Json(state.dynamic())
}

/// POST /configuration
///
/// Fields absent from the body keep their current value. Queue limits
/// apply at once; a new running limit applies from the next start.
pub async fn set_configuration(State(state): State<ApiState>, body: Bytes) -> Response {
    let current = state.dynamic();
    let updated = match merge(&current, &body) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "cannot decode configuration");
            return reply::error(ReplyCode::GENERIC, "", HashMap::new());
        }
    };

    let queue = &state.scheduler.context().queue;
    queue.set_length_max(updated.queue_length_max);
    queue.set_enabled(updated.queue_enabled);
    if updated.parallel_running_functions_max != queue.running_max() {
        info!(
            current = queue.running_max(),
            next = updated.parallel_running_functions_max,
            "running limit saved, applies after restart"
        );
    }
    *state.dynamic.lock().unwrap_or_else(|e| e.into_inner()) = updated;

    if let Err(e) = write_json_file(&state.dynamic_config_path, &updated) {
        warn!(error = %e, "cannot save configuration");
    }
    info!(?updated, "configuration updated");
    StatusCode::OK.into_response()
}

/// Overlay the JSON object in `body` on `current`.
fn merge(current: &DynamicConfig, body: &[u8]) -> serde_json::Result<DynamicConfig> {
    let mut value = serde_json::to_value(current)?;
    let patch: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;
    if let serde_json::Value::Object(fields) = &mut value {
        fields.extend(patch);
    }
    serde_json::from_value(value)
}

/// GET /configuration/scheduler
pub async fn get_scheduler(State(state): State<ApiState>) -> Json<SchedulerDescriptor> {
    Json(state.scheduler.descriptor())
}

/// POST /configuration/scheduler
pub async fn set_scheduler(State(state): State<ApiState>, body: Bytes) -> Response {
    let descriptor: SchedulerDescriptor = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "cannot decode scheduler descriptor");
            return reply::error(ReplyCode::INPUT_NOT_VALID, "", HashMap::new());
        }
    };

    if let Err(e) = state.scheduler.set_scheduler(&descriptor) {
        error!(error = %e, "cannot set new scheduler");
        return reply::error(e.reply_code(), e.to_string(), HashMap::new());
    }

    if let Err(e) = write_json_file(&state.scheduler_config_path, &state.scheduler.descriptor()) {
        error!(error = %e, "cannot save scheduler configuration");
    }
    info!(scheduler = %state.scheduler.full_name(), "scheduler updated");
    StatusCode::OK.into_response()
}
