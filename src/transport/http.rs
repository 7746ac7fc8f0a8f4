//! [`Transport`] over a caller-configured `reqwest::Client`.
//!
//! Credentials, TLS, proxies and timeouts all belong to the client the
//! caller builds; this adapter only moves bytes.

use super::Transport;
use crate::error::{Error, Result};
use crate::model::{RequestRecord, ResponseRecord, TransportError, TransportErrorKind};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RequestRecord) -> Result<ResponseRecord> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Protocol,
                format!("invalid method {:?}: {e}", request.method),
            )
        })?;
        debug!(request = %request.debug_key(), "HTTP transport: sending request");

        let mut builder = self.client.request(method, &request.target);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        // Non-UTF-8 header values are kept lossily.
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(ResponseRecord {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_builder() || err.is_decode() || err.is_body() {
        TransportErrorKind::Protocol
    } else {
        TransportErrorKind::Other
    };
    Error::Transport(TransportError::new(kind, err.to_string()))
}
