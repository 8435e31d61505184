//! Building client replies from job results.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use p2pfaas_core::config::APP_VERSION;
use p2pfaas_core::{headers, payload};
use p2pfaas_scheduler::{JobResult, ReplyCode};

/// `X-*` headers of an incoming request, by canonical name.
pub fn x_headers(map: &HeaderMap) -> HashMap<String, String> {
    map.iter()
        .filter(|(name, _)| headers::is_x_header(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (headers::canonical(name.as_str()), v.to_string()))
        })
        .collect()
}

/// Value of a request header, empty when absent.
pub fn header_value(map: &HeaderMap, name: &str) -> String {
    map.get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Headers every reply carries, then what the job result adds: the name
/// of the policy that handled it, policy headers, and the function's own
/// `X-*` headers.
pub fn result_headers(active_scheduler: &str, result: Option<&JobResult>) -> HashMap<String, String> {
    let mut out = HashMap::from([
        (headers::VERSION.to_string(), APP_VERSION.to_string()),
        (headers::SCHEDULER.to_string(), active_scheduler.to_string()),
    ]);
    let Some(result) = result else {
        return out;
    };
    if !result.scheduler.is_empty() {
        out.insert(headers::SCHEDULER.to_string(), result.scheduler.clone());
    }
    out.extend(result.response_headers.clone());
    if let Some(response) = &result.response {
        out.extend(response.x_headers());
    }
    out
}

/// Timing and path headers of a completed job.
///
/// Local jobs report their own timings as one-element lists. Forwarded
/// jobs report one entry per node, originating node first, with the
/// execution time taken from the node that ran the function.
pub fn execution_headers(result: &JobResult) -> HashMap<String, String> {
    let mut out = HashMap::new();

    if !result.external_execution {
        let t = &result.timings;
        let list = |v: f64| format!("[{v:.6}]");
        if let Some(v) = t.total_time {
            out.insert(headers::TIMING_TOTAL_LIST.to_string(), list(v));
        }
        if let Some(v) = t.scheduling_time {
            out.insert(headers::TIMING_SCHEDULING_LIST.to_string(), list(v));
        }
        if let Some(v) = t.probing_time {
            out.insert(headers::TIMING_PROBING_LIST.to_string(), list(v));
        }
        if let Some(v) = t.execution_time {
            out.insert(headers::TIMING_EXECUTION_TIME.to_string(), format!("{v:.6}"));
        }
        return out;
    }

    let peers = result.peers_list();
    out.insert(headers::EXTERNALLY_EXECUTED.to_string(), "True".to_string());
    out.insert(
        headers::HOPS.to_string(),
        peers.len().saturating_sub(1).to_string(),
    );
    if let Some(v) = peers.first().and_then(|p| p.timings.execution_time) {
        out.insert(headers::TIMING_EXECUTION_TIME.to_string(), format!("{v:.6}"));
    }

    let origin_first = || peers.iter().rev();
    let json = |values: Vec<serde_json::Value>| serde_json::Value::Array(values).to_string();
    let times = |f: fn(&p2pfaas_core::Timings) -> Option<f64>| {
        json(origin_first().map(|p| f(&p.timings).unwrap_or(0.0).into()).collect())
    };

    out.insert(
        headers::PEERS_LIST_IP.to_string(),
        json(origin_first().map(|p| p.machine_ip.clone().into()).collect()),
    );
    out.insert(
        headers::PEERS_LIST_ID.to_string(),
        json(origin_first().map(|p| p.machine_id.clone().into()).collect()),
    );
    out.insert(headers::TIMING_TOTAL_LIST.to_string(), times(|t| t.total_time));
    out.insert(headers::TIMING_PROBING_LIST.to_string(), times(|t| t.probing_time));
    out.insert(headers::TIMING_SCHEDULING_LIST.to_string(), times(|t| t.scheduling_time));
    out
}

/// Convert to a header map, skipping entries that are not valid HTTP.
pub fn header_map(values: HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in values {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid response header"),
        }
    }
    map
}

/// JSON error reply.
pub fn error(code: ReplyCode, message: impl Into<String>, extra: HashMap<String, String>) -> Response {
    let status = StatusCode::from_u16(code.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut map = header_map(extra);
    map.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    (status, map, code.reply(message).to_json()).into_response()
}

/// Client reply for a job that produced a function response.
///
/// A forwarded job's body is still base64 and is decoded here.
pub fn job_success(active_scheduler: &str, result: &JobResult) -> Response {
    let mut values = result_headers(active_scheduler, Some(result));
    values.extend(execution_headers(result));
    let mut map = header_map(values);

    let Some(response) = &result.response else {
        return error(ReplyCode::GENERIC, "job completed without a response", HashMap::new());
    };
    if let Some(ct) = response
        .headers
        .get("Content-Type")
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        map.insert(header::CONTENT_TYPE, ct);
    }

    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    let body = if result.external_execution && !response.body.is_empty() {
        match payload::decode(&response.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "cannot decode forwarded job output");
                Vec::new()
            }
        }
    } else {
        response.body.clone()
    };

    (status, map, body).into_response()
}
