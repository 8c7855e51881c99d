//! Admission control in front of the pipeline.
//!
//! Every run holds a full browser process, so concurrent runs are bounded by
//! a semaphore here rather than inside the pipeline.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::output::{ExtractionResponse, PageRequest};
use crate::pipeline::{ExtractedDocument, ExtractionPipeline};
use crate::{Config, ExtractError, Result};

/// Runs extractions with at most `max_concurrent_sessions` browsers alive.
#[derive(Clone)]
pub struct ExtractionService {
    pipeline: Arc<ExtractionPipeline>,
    semaphore: Arc<Semaphore>,
}

impl ExtractionService {
    pub fn new(pipeline: ExtractionPipeline, max_concurrent_sessions: usize) -> Self {
        let permits = max_concurrent_sessions.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let pipeline = ExtractionPipeline::from_config(config)?;
        Ok(Self::new(pipeline, config.max_concurrent_sessions))
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn extract(&self, request: &PageRequest) -> Result<ExtractedDocument> {
        self.extract_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Waits for a free slot, then runs the pipeline. Cancelling while queued
    /// returns without ever opening a browser.
    pub async fn extract_with_cancel(
        &self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<ExtractedDocument> {
        request.validate()?;
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            permit = self.semaphore.acquire() => permit
                .map_err(|_| ExtractError::internal("extraction service unavailable"))?,
        };
        debug!(
            page_url = %request.page_url,
            free_slots = self.semaphore.available_permits(),
            "admitted extraction"
        );
        self.pipeline.run_with_cancel(request, cancel).await
    }

    /// Runs a batch concurrently (bounded by the semaphore). Responses come
    /// back in input order; one failure does not affect the others.
    pub async fn extract_all(&self, requests: &[PageRequest]) -> Vec<Result<ExtractedDocument>> {
        self.extract_all_with_cancel(requests, &CancellationToken::new())
            .await
    }

    pub async fn extract_all_with_cancel(
        &self,
        requests: &[PageRequest],
        cancel: &CancellationToken,
    ) -> Vec<Result<ExtractedDocument>> {
        join_all(
            requests
                .iter()
                .map(|request| self.extract_with_cancel(request, cancel)),
        )
        .await
    }

    /// Same as [`extract`](Self::extract) but folded into the wire response.
    pub async fn respond(&self, request: &PageRequest) -> ExtractionResponse {
        ExtractionResponse::from_result(&self.extract(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserLauncher, BrowserSession, FrameHandle, FrameLoad, LoadPolicy};
    use crate::download::{DocumentDownloader, DownloadedDocument};
    use crate::extract::PreviewUrlMatcher;
    use crate::pipeline::PipelineOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Gauge {
        live: AtomicUsize,
        peak: AtomicUsize,
        opened: AtomicUsize,
    }

    struct GaugedLauncher(Arc<Gauge>);

    struct GaugedSession(Arc<Gauge>);

    #[async_trait]
    impl BrowserLauncher for GaugedLauncher {
        async fn open(&self) -> Result<Box<dyn BrowserSession>> {
            let live = self.0.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.peak.fetch_max(live, Ordering::SeqCst);
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(GaugedSession(self.0.clone())))
        }
    }

    #[async_trait]
    impl BrowserSession for GaugedSession {
        async fn navigate(&mut self, url: &str, _policy: LoadPolicy) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if url.contains("broken") {
                return Err(ExtractError::Navigation("net::ERR_FAILED".into()));
            }
            Ok(())
        }

        async fn frame_by_name(&mut self, name: &str) -> Result<Option<FrameHandle>> {
            Ok(Some(FrameHandle {
                name: name.to_string(),
            }))
        }

        async fn wait_for_frame_load(
            &mut self,
            _frame: &FrameHandle,
            _timeout: Duration,
        ) -> Result<FrameLoad> {
            Ok(FrameLoad::Loaded)
        }

        async fn frame_content(&mut self, _frame: &FrameHandle) -> Result<String> {
            Ok("<a href=\"https://pdfnet.lockton.com/previewliabilityholder.aspx?id=1\">".into())
        }

        async fn close(&mut self) -> Result<()> {
            self.0.live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticDownloader;

    #[async_trait]
    impl DocumentDownloader for StaticDownloader {
        async fn download(&self, _url: &str) -> Result<DownloadedDocument> {
            Ok(DownloadedDocument::from_bytes(b"%PDF".to_vec()))
        }
    }

    fn service(gauge: Arc<Gauge>, slots: usize) -> ExtractionService {
        let pipeline = ExtractionPipeline::new(
            Arc::new(GaugedLauncher(gauge)),
            Arc::new(PreviewUrlMatcher::default()),
            Arc::new(StaticDownloader),
            PipelineOptions {
                settle_delay: Duration::ZERO,
                ..PipelineOptions::default()
            },
        );
        ExtractionService::new(pipeline, slots)
    }

    #[test]
    fn semaphore_never_zero() {
        let svc = service(Arc::new(Gauge::default()), 0);
        assert_eq!(svc.available_permits(), 1);
    }

    #[tokio::test]
    async fn batch_respects_concurrency_bound_and_order() {
        let gauge = Arc::new(Gauge::default());
        let svc = service(gauge.clone(), 2);
        let requests: Vec<PageRequest> = [
            "https://a.test",
            "https://broken.test",
            "https://c.test",
            "https://d.test",
            "https://e.test",
        ]
        .into_iter()
        .map(|url| PageRequest::new(url).unwrap())
        .collect();

        let results = svc.extract_all(&requests).await;

        assert_eq!(results.len(), 5);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ExtractError::Navigation(_))));
        assert!(results[2..].iter().all(|r| r.is_ok()));
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gauge.live.load(Ordering::SeqCst), 0);
        assert_eq!(svc.available_permits(), 2);
    }

    #[tokio::test]
    async fn invalid_request_never_opens_browser() {
        let gauge = Arc::new(Gauge::default());
        let svc = service(gauge.clone(), 1);
        let request = PageRequest {
            page_url: " ".into(),
        };

        let response = svc.respond(&request).await;

        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("pageUrl is required in request body")
        );
        assert_eq!(gauge.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_while_queued_skips_pipeline() {
        let gauge = Arc::new(Gauge::default());
        let svc = service(gauge.clone(), 1);
        let _held = svc.semaphore.clone().acquire_owned().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = svc
            .extract_with_cancel(&PageRequest::new("https://a.test").unwrap(), &cancel)
            .await;

        assert!(matches!(result, Err(ExtractError::Cancelled)));
        assert_eq!(gauge.opened.load(Ordering::SeqCst), 0);
    }
}
