//! 传输层抽象：执行实际网络调用的外部协作者。
//!
//! # Transport Module
//!
//! The orchestration core never performs network I/O itself. Every call goes
//! through a [`Transport`], which receives the endpoint path, the method and the
//! (possibly aggregated) input, and returns a [`Response`].
//!
//! The core only ever looks at [`Response::ok`]. Status codes, headers and
//! retries belong to the transport.

mod http;

pub use http::HttpTransport;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A completed call, successful or not.
///
/// The body is kept as shared bytes so a response can be cached and handed to
/// every waiting caller without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub ok: bool,
    pub status: u16,
    body: Bytes,
}

impl Response {
    /// `ok` is derived from the status (2xx).
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            body: body.into(),
        }
    }

    pub fn from_json<T: Serialize>(status: u16, body: &T) -> Result<Self> {
        Ok(Self::new(status, serde_json::to_vec(body)?))
    }

    /// Override the `ok` flag, e.g. for per-item failures split out of a batch.
    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The function that actually talks to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, path: &str, method: &Method, input: &Value) -> Result<Response>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Other(String),
}
