//! Minimal HTTP/1.1 client over hyper.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{NetError, NetResult};

/// Response with the body fully read.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Opens one connection per request; the whole exchange, body included,
/// must finish within `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct HttpClient {
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(
        &self,
        address: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> NetResult<HttpReply> {
        self.send(Method::GET, address, path, headers, Bytes::new()).await
    }

    pub async fn post(
        &self,
        address: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> NetResult<HttpReply> {
        self.send(Method::POST, address, path, headers, body).await
    }

    pub async fn send(
        &self,
        method: Method,
        address: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> NetResult<HttpReply> {
        let uri = format!("http://{address}{path}");
        match tokio::time::timeout(self.timeout, exchange(method, address, &uri, headers, body)).await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(%uri, "request timed out");
                Err(NetError::Timeout { uri })
            }
        }
    }
}

async fn exchange(
    method: Method,
    address: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Bytes,
) -> NetResult<HttpReply> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|source| NetError::Connect {
            address: address.to_string(),
            source,
        })?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|source| NetError::Handshake {
            address: address.to_string(),
            source,
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, address);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Full::new(body))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|source| NetError::Request {
            uri: uri.to_string(),
            source,
        })?;

    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|source| NetError::Body {
            uri: uri.to_string(),
            source,
        })?
        .to_bytes();

    Ok(HttpReply {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}
