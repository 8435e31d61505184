//! p2pfaas-learner: client of the external learning service.
//!
//! A fixed number of long-lived connections carry every "act" request of
//! the node. Callers queue their state vector and wait; a dispatcher hands
//! each pending request to a free connection.
//!
//! # Architecture
//!
//! ```text
//! SocketPool
//!   ├── pending requests (≤ 3 × pool size)
//!   │     free / filled semaphores
//!   ├── dispatcher task (one consumer permit per connection)
//!   └── slots[pool size]
//!         └── LearnerConnection (opened lazily, reopened once on failure)
//! ```
//!
//! Wire format: one JSON array per line (`[1.0,0.0,2.0]\n`), answered by
//! one line `action,eps`.

pub mod connection;
pub mod error;
pub mod pool;

pub use connection::{Connector, LearnerConnection, TcpConnector, parse_reply};
pub use error::{LearnerError, LearnerResult};
pub use pool::SocketPool;
