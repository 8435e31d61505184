use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("request to {uri} timed out")]
    Timeout { uri: String },

    #[error("HTTP handshake with {address} failed: {source}")]
    Handshake {
        address: String,
        source: hyper::Error,
    },

    #[error("request to {uri} failed: {source}")]
    Request { uri: String, source: hyper::Error },

    #[error("cannot read response body from {uri}: {source}")]
    Body { uri: String, source: hyper::Error },

    #[error("invalid request: {0}")]
    Build(#[from] http::Error),

    #[error("cannot decode response from {uri}: {source}")]
    Decode {
        uri: String,
        source: serde_json::Error,
    },

    #[error("header {name}: {reason}")]
    Header { name: &'static str, reason: String },

    #[error("{uri} answered {status}")]
    Status { uri: String, status: u16 },
}

pub type NetResult<T> = Result<T, NetError>;
