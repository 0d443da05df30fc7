//! Transport contract and the reqwest-backed marketplace transport
//!
//! The orchestrator only ever sees `Transport::download()`: one request in,
//! one `RawResponse` or `TransportError` out. Retries, TLS and DNS belong to
//! the implementation; `HttpTransport` performs none of its own retries.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use common::Secret;
use tracing::debug;

use crate::BoxFuture;

/// Category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Host unreachable, connection refused or reset, TLS failure
    Http,
    /// The request exceeded its deadline
    Timeout,
    /// The caller cancelled the request
    Cancelled,
    /// A response arrived but its body could not be read
    InvalidResponse,
}

impl TransportErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            TransportErrorKind::Http => "HttpError",
            TransportErrorKind::Timeout => "Timeout",
            TransportErrorKind::Cancelled => "Cancelled",
            TransportErrorKind::InvalidResponse => "InvalidResponse",
        }
    }
}

/// Connectivity failure raised by a transport.
///
/// `Display` is the bare message so that it reaches the caller exactly as
/// the transport produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::InvalidResponse
        } else {
            TransportErrorKind::Http
        };
        Self::new(kind, err.to_string())
    }
}

/// A single marketplace request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub action: String,
    pub params: BTreeMap<String, String>,
    /// Sent as a bearer credential when present
    pub access_token: Option<Secret<String>>,
}

impl TransportRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: BTreeMap::new(),
            access_token: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn access_token(mut self, token: Secret<String>) -> Self {
        self.access_token = Some(token);
        self
    }
}

/// Unclassified marketplace response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub data: String,
}

impl RawResponse {
    pub fn new(status: u16, data: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            data: data.into(),
        }
    }
}

/// Performs one marketplace request.
///
/// Uses `Pin<Box<dyn Future>>` returns so the orchestrator can hold an
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn download<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, std::result::Result<RawResponse, TransportError>>;
}

/// HTTP transport: POSTs form-encoded params to `{base_url}/{action}`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}", self.base_url, action.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn download<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, std::result::Result<RawResponse, TransportError>> {
        Box::pin(async move {
            let url = self.url(&request.action);
            let mut builder = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .form(&request.params);
            if let Some(token) = &request.access_token {
                builder = builder.bearer_auth(token.expose());
            }

            let response = builder.send().await.map_err(TransportError::from_reqwest)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let data = response.text().await.map_err(TransportError::from_reqwest)?;

            debug!(action = %request.action, status, bytes = data.len(), "marketplace responded");

            Ok(RawResponse {
                status,
                headers,
                data,
            })
        })
    }
}
