//! Scheduler error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobResult;

/// Errors that can occur while scheduling a job or reconfiguring the scheduler.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    #[error("job cannot be scheduled: {0}")]
    JobCannotBeScheduled(String),

    #[error("job deliberately rejected")]
    JobDeliberatelyRejected,

    #[error("cannot retrieve action from learner: {0}")]
    CannotRetrieveAction(String),

    #[error("job cannot be forwarded to {peer}: {reason}")]
    JobCannotBeForwarded { peer: String, reason: String },

    #[error("peer {peer} returned no usable response")]
    PeerResponseNil { peer: String },

    #[error("cannot retrieve recipient node: {0}")]
    CannotRetrieveRecipientNode(String),

    #[error("bad scheduler parameters: {0}")]
    BadSchedulerParameters(String),

    #[error("cannot change scheduler while {running} jobs are running")]
    CannotChangeScheduler { running: u32 },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error code and HTTP status of the JSON error reply sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCode {
    pub code: u16,
    pub status: u16,
}

impl ReplyCode {
    pub const GENERIC: ReplyCode = ReplyCode { code: 1, status: 500 };
    pub const INPUT_NOT_VALID: ReplyCode = ReplyCode { code: 4, status: 400 };

    /// JSON error body carrying this code.
    pub fn reply(self, message: impl Into<String>) -> ErrorReply {
        ErrorReply {
            code: self.code,
            message: message.into(),
        }
    }
}

/// Body of every error reply, to clients and to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ErrorReply {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"code\":{}}}", self.code))
    }
}

impl SchedulerError {
    pub fn reply_code(&self) -> ReplyCode {
        let (code, status) = match self {
            SchedulerError::JobCannotBeScheduled(_) => (400, 500),
            SchedulerError::JobDeliberatelyRejected => (401, 503),
            SchedulerError::CannotRetrieveAction(_) => (402, 500),
            SchedulerError::JobCannotBeForwarded { .. } => (403, 500),
            SchedulerError::PeerResponseNil { .. } => (404, 500),
            SchedulerError::CannotRetrieveRecipientNode(_) => (405, 500),
            SchedulerError::BadSchedulerParameters(_)
            | SchedulerError::CannotChangeScheduler { .. } => return ReplyCode::GENERIC,
        };
        ReplyCode { code, status }
    }

    pub fn error_reply(&self) -> ErrorReply {
        self.reply_code().reply(self.to_string())
    }

    /// Whether the error is a policy decision rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SchedulerError::JobDeliberatelyRejected)
    }
}

/// A failed schedule together with what is known about the job.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct JobFailure {
    pub error: SchedulerError,
    pub result: Box<JobResult>,
}

impl JobFailure {
    pub fn new(error: SchedulerError, result: JobResult) -> Self {
        Self {
            error,
            result: Box::new(result),
        }
    }
}

/// Outcome of `Schedule`: the job result, or the error with a partial result.
pub type ScheduleResult = Result<JobResult, JobFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_codes_follow_error_kind() {
        let cases = [
            (SchedulerError::JobCannotBeScheduled("full".into()), 400, 500),
            (SchedulerError::JobDeliberatelyRejected, 401, 503),
            (SchedulerError::CannotRetrieveAction("down".into()), 402, 500),
            (
                SchedulerError::JobCannotBeForwarded {
                    peer: "10.0.0.2".into(),
                    reason: "refused".into(),
                },
                403,
                500,
            ),
            (
                SchedulerError::PeerResponseNil {
                    peer: "10.0.0.2".into(),
                },
                404,
                500,
            ),
            (SchedulerError::CannotRetrieveRecipientNode("idx".into()), 405, 500),
            (SchedulerError::BadSchedulerParameters("x".into()), 1, 500),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.reply_code(), ReplyCode { code, status }, "{err}");
        }
    }

    #[test]
    fn error_reply_json() {
        let reply = SchedulerError::JobDeliberatelyRejected.error_reply();
        assert_eq!(
            reply.to_json(),
            r#"{"code":401,"message":"job deliberately rejected"}"#
        );
        assert_eq!(ReplyCode::GENERIC.reply("").to_json(), r#"{"code":1}"#);
    }

    #[test]
    fn only_rejection_is_rejection() {
        assert!(SchedulerError::JobDeliberatelyRejected.is_rejection());
        assert!(!SchedulerError::JobCannotBeScheduled(String::new()).is_rejection());
    }
}
