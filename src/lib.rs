//! Framefetch Library
//!
//! Renders a page in a headless browser, finds the document-preview link that
//! client-side scripts inject into a named sub-frame, downloads that document
//! and returns it base64-encoded.
//!
//! # Module Overview
//!
//! - [`browser`] - Headless browser sessions and named-frame lookup
//! - [`extract`] - Document URL matching over frame markup
//! - [`download`] - Streaming HTTP(S) download with a hard deadline
//! - [`pipeline`] - The orchestrated run with guaranteed browser teardown
//! - [`service`] - Concurrency-bounded front for batches of runs
//! - [`config`] - Configuration file support
//! - [`output`] - Request/response shapes
//!
//! # Example
//!
//! ```no_run
//! use framefetch_lib::{Config, ExtractionPipeline, ExtractionResponse, PageRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = ExtractionPipeline::from_config(&Config::default())?;
//! let request = PageRequest::new("https://example.test/policy")?;
//! let result = pipeline.run(&request).await;
//! println!("{}", serde_json::to_string(&ExtractionResponse::from_result(&result))?);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod service;

pub use browser::{
    BrowserLauncher, BrowserSession, DriverOptions, FrameHandle, FrameLoad, FrameLocator,
    LoadPolicy, LocatedFrame, PlaywrightLauncher, PlaywrightSession, DEFAULT_FRAME_LOAD_TIMEOUT,
    DEFAULT_NAVIGATION_TIMEOUT,
};
pub use config::{BrowserSettings, Config, Timeouts, DEFAULT_FRAME_NAME};
pub use download::{
    DocumentDownloader, DownloadedDocument, HttpDownloader, Transport, DEFAULT_DOWNLOAD_TIMEOUT,
};
pub use error::{ErrorCategory, ErrorKind, ErrorPayload, ExtractError, Result};
pub use extract::{
    extract_document_url, ExtractedUrl, FrameSnapshot, PreviewUrlMatcher, UrlMatcher,
    PREVIEW_URL_PATTERN,
};
pub use output::{DocumentData, ExtractionResponse, PageRequest};
pub use pipeline::{ExtractedDocument, ExtractionPipeline, PipelineOptions, PipelineRun, Stage};
pub use service::ExtractionService;
pub use tokio_util::sync::CancellationToken;
