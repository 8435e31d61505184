//! p2pfaas-scheduler: per-request placement of function jobs.
//!
//! Each request is handed to the active scheduling policy, which decides
//! whether the job runs on this node or on a peer:
//!
//! - Local jobs go through a bounded admission queue that caps both the
//!   jobs waiting and the jobs running on the FaaS backend
//! - Probing policies query random peers' load in parallel
//! - Remote jobs travel in a JSON envelope that records every hop
//!
//! # Architecture
//!
//! ```text
//! SchedulerService
//!   ├── active Policy (swappable while idle)
//!   │     └── bypass / forward / reject overrides
//!   └── SchedulerContext
//!         ├── AdmissionQueue ──► FaasBackend
//!         ├── LoadTable (running / queued per function and task type)
//!         ├── LoadProber ──► LoadSource (peer monitoring)
//!         ├── PeerDirectory (discovery)
//!         ├── PeerForwarder ──► /peer/function/{name}
//!         └── Learner (learning service)
//! ```

pub mod context;
pub mod error;
pub mod execution;
pub mod job;
pub mod load_table;
pub mod peer;
pub mod policy;
pub mod prober;
pub mod queue;
pub mod round_robin;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{NodeIdentity, SchedulerContext};
pub use error::{ErrorReply, JobFailure, ReplyCode, ScheduleResult, SchedulerError, SchedulerResult};
pub use job::{ExternalExecutionInfo, JobResult};
pub use load_table::LoadTable;
pub use policy::Policy;
pub use prober::{LoadProber, ProbeReport};
pub use queue::{AdmissionQueue, CompletedJob, QueueConfig, QueueError};
pub use round_robin::RoundRobinCursor;
pub use service::SchedulerService;
