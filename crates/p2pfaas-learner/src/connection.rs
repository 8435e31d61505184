//! Connections to the learning service.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use p2pfaas_core::ActOutput;

use crate::error::{LearnerError, LearnerResult};

/// One duplex connection, used by a single request at a time.
#[async_trait]
pub trait LearnerConnection: Send {
    async fn act(&mut self, state: &[f64]) -> LearnerResult<ActOutput>;

    async fn close(&mut self);
}

/// Opens new connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> LearnerResult<Box<dyn LearnerConnection>>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> LearnerResult<Box<dyn LearnerConnection>> {
        let stream = match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(s)) => s,
            Ok(Err(source)) => {
                return Err(LearnerError::Connect {
                    address: self.address.clone(),
                    source,
                });
            }
            Err(_) => return Err(LearnerError::Timeout(self.timeout)),
        };
        stream.set_nodelay(true)?;
        debug!(address = %self.address, local = ?stream.local_addr().ok(), "learner connection opened");

        let (read, write) = stream.into_split();
        Ok(Box::new(TcpConnection {
            reader: BufReader::new(read),
            writer: write,
            timeout: self.timeout,
        }))
    }
}

struct TcpConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl TcpConnection {
    async fn exchange(&mut self, state: &[f64]) -> LearnerResult<ActOutput> {
        let mut line = serde_json::to_vec(state)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply).await? == 0 {
            return Err(LearnerError::Disconnected);
        }
        parse_reply(&reply)
    }
}

#[async_trait]
impl LearnerConnection for TcpConnection {
    async fn act(&mut self, state: &[f64]) -> LearnerResult<ActOutput> {
        match tokio::time::timeout(self.timeout, self.exchange(state)).await {
            Ok(result) => result,
            Err(_) => Err(LearnerError::Timeout(self.timeout)),
        }
    }

    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// Parse an `action,eps` reply.
pub fn parse_reply(reply: &str) -> LearnerResult<ActOutput> {
    let malformed = || LearnerError::Reply(reply.trim_end().to_string());
    let (action, eps) = reply.trim().split_once(',').ok_or_else(malformed)?;
    Ok(ActOutput {
        action: action.trim().parse().map_err(|_| malformed())?,
        eps: eps.trim().parse().map_err(|_| malformed())?,
    })
}
