//! FaaS gateway client.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use tracing::debug;

use p2pfaas_core::{ApiResponse, FaasBackend, headers};

use crate::client::HttpClient;

/// Runs functions by POSTing the payload to `/function/{name}` on the
/// gateway. Whatever status the function answers with is returned as-is.
#[derive(Debug, Clone)]
pub struct HttpFaasBackend {
    client: HttpClient,
    address: String,
}

impl HttpFaasBackend {
    pub fn new(client: HttpClient, address: impl Into<String>) -> Self {
        Self {
            client,
            address: address.into(),
        }
    }
}

#[async_trait]
impl FaasBackend for HttpFaasBackend {
    async fn execute(
        &self,
        function: &str,
        payload: &[u8],
        content_type: &str,
    ) -> anyhow::Result<ApiResponse> {
        let path = format!("/function/{function}");
        let mut headers = Vec::new();
        if !content_type.is_empty() {
            headers.push(("content-type", content_type));
        }

        let reply = self
            .client
            .post(&self.address, &path, &headers, Bytes::copy_from_slice(payload))
            .await?;
        debug!(%function, status = reply.status.as_u16(), bytes = reply.body.len(), "function executed");

        Ok(ApiResponse {
            headers: header_map(&reply.headers),
            body: reply.body.to_vec(),
            status_code: reply.status.as_u16(),
        })
    }
}

/// Canonical-cased copy of the headers that are valid text.
pub(crate) fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (headers::canonical(name.as_str()), v.to_string()))
        })
        .collect()
}
