//! Streaming document download with a hard deadline.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::{redirect, Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::{ExtractError, Result};

/// Default bound for a whole download, measured from request initiation.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_millis(30000);

/// Raw document bytes plus their transport encoding.
///
/// `byte_length == bytes.len()` and `encoded_payload` is the standard
/// (padded) base64 encoding of `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedDocument {
    pub bytes: Vec<u8>,
    pub encoded_payload: String,
    pub byte_length: usize,
}

impl DownloadedDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let encoded_payload = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Self {
            byte_length: bytes.len(),
            encoded_payload,
            bytes,
        }
    }
}

/// Fetches a document by URL.
#[async_trait]
pub trait DocumentDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<DownloadedDocument>;
}

/// Transport picked from the URL's declared scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Secure,
    Plain,
}

impl Transport {
    pub fn for_url(url: &Url) -> Result<Self> {
        match url.scheme() {
            "https" => Ok(Transport::Secure),
            "http" => Ok(Transport::Plain),
            other => Err(ExtractError::download(format!(
                "unsupported URL scheme {other:?} for document download"
            ))),
        }
    }
}

/// HTTP(S) downloader. Only a 200 response is accepted; redirects are not
/// followed and nothing is retried.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    secure: Client,
    plain: Client,
    timeout: Duration,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let secure = Client::builder()
            .https_only(true)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ExtractError::Network)?;
        let plain = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ExtractError::Network)?;
        Ok(Self {
            secure,
            plain,
            timeout,
        })
    }

    fn client(&self, transport: Transport) -> &Client {
        match transport {
            Transport::Secure => &self.secure,
            Transport::Plain => &self.plain,
        }
    }

    async fn fetch(&self, url: Url, transport: Transport) -> Result<Vec<u8>> {
        let response = self
            .client(transport)
            .get(url)
            .send()
            .await
            .map_err(ExtractError::Network)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ExtractError::download_status(status.as_u16()));
        }

        // No size cap: callers bound untrusted endpoints themselves.
        let mut buffer = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(ExtractError::Network)?);
        }
        Ok(buffer)
    }
}

#[async_trait]
impl DocumentDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<DownloadedDocument> {
        let parsed = Url::parse(url)
            .map_err(|e| ExtractError::download(format!("invalid document URL: {e}")))?;
        let transport = Transport::for_url(&parsed)?;
        debug!(?transport, timeout = ?self.timeout, "starting document download");

        let start = Instant::now();
        // Dropping the fetch future on expiry tears down the in-flight connection.
        let bytes = tokio::time::timeout(self.timeout, self.fetch(parsed, transport))
            .await
            .map_err(|_| ExtractError::DownloadTimeout(self.timeout))??;

        debug!(
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document downloaded"
        );
        Ok(DownloadedDocument::from_bytes(bytes))
    }
}
