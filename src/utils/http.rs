// src/utils/http.rs

//! HTTP transport seam.
//!
//! Both pipelines talk to the archive through [`Transport`], so the real
//! client can be swapped for [`MockTransport`](crate::utils::MockTransport)
//! without touching the pipeline code.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::ArchiveConfig;

/// Streaming response body.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Status code plus a body that has not been read yet.
pub struct HttpResponse {
    status: u16,
    body: ByteStream,
}

impl HttpResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// Response with a body that is already in memory.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, stream::once(async move { Ok(body) }).boxed())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Buffer the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Buffer the whole body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests against the archive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a GET request; resolves once the response headers are in.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// Transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a configured asynchronous HTTP client.
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AppError::from))
            .boxed();
        Ok(HttpResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffers_chunked_body() {
        let chunks = vec![Ok(Bytes::from_static(b"Hello ")), Ok(Bytes::from_static(b"World"))];
        let response = HttpResponse::new(200, stream::iter(chunks).boxed());
        assert!(response.is_success());
        assert_eq!(response.text().await.unwrap(), "Hello World");
    }

    #[tokio::test]
    async fn body_error_surfaces_when_buffering() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(AppError::transport("http://a", "connection reset")),
        ];
        let response = HttpResponse::new(200, stream::iter(chunks).boxed());
        assert!(response.bytes().await.is_err());
    }

    #[test]
    fn only_2xx_is_success() {
        assert!(HttpResponse::from_bytes(204, "").is_success());
        assert!(!HttpResponse::from_bytes(302, "").is_success());
        assert!(!HttpResponse::from_bytes(404, "").is_success());
    }

    #[tokio::test]
    async fn reqwest_transport_reads_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("archived")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(&ArchiveConfig::default()).unwrap();
        let response = transport
            .get(&format!("{}/page", server.url()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "archived");
        mock.assert_async().await;
    }
}
