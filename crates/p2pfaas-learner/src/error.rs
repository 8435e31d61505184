use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearnerError {
    #[error("cannot connect to learner at {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("learner I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("learner did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("learner closed the connection")]
    Disconnected,

    #[error("malformed learner reply {0:?}")]
    Reply(String),

    #[error("cannot encode state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket pool is shut down")]
    PoolClosed,
}

pub type LearnerResult<T> = Result<T, LearnerError>;
