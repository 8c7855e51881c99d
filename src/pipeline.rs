//! Orchestrates one extraction run: open browser, navigate, locate the frame,
//! extract the document URL, download it. The browser is closed exactly once
//! before returning, whichever stage failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::browser::{
    BrowserLauncher, BrowserSession, DriverOptions, FrameLoad, FrameLocator, LoadPolicy,
    LocatedFrame, PlaywrightLauncher,
};
use crate::download::{DocumentDownloader, DownloadedDocument, HttpDownloader};
use crate::extract::{extract_document_url, ExtractedUrl, PreviewUrlMatcher, UrlMatcher};
use crate::output::PageRequest;
use crate::{Config, ErrorKind, ExtractError, Result};

/// Where a run currently is. `Downloaded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    BrowserOpen,
    Navigated,
    FrameLoaded,
    UrlExtracted,
    Downloaded,
    Failed(ErrorKind),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Downloaded | Stage::Failed(_))
    }
}

/// The document URL found in the frame and the bytes behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub document_url: String,
    pub document: DownloadedDocument,
}

/// Terminal stage plus outcome of one run.
#[derive(Debug)]
pub struct PipelineRun {
    pub stage: Stage,
    pub outcome: Result<ExtractedDocument>,
}

/// Per-run knobs taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub frame_name: String,
    pub settle_delay: Duration,
    pub frame_load_timeout: Duration,
    pub stale_frame_rereads: u32,
    pub stale_frame_reread_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            frame_name: config.frame_name.clone(),
            settle_delay: config.timeouts.settle,
            frame_load_timeout: config.timeouts.frame_load,
            stale_frame_rereads: config.stale_frame_rereads,
            stale_frame_reread_interval: config.stale_frame_reread_interval,
        }
    }
}

pub struct ExtractionPipeline {
    launcher: Arc<dyn BrowserLauncher>,
    matcher: Arc<dyn UrlMatcher>,
    downloader: Arc<dyn DocumentDownloader>,
    locator: FrameLocator,
    options: PipelineOptions,
}

impl ExtractionPipeline {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        matcher: Arc<dyn UrlMatcher>,
        downloader: Arc<dyn DocumentDownloader>,
        options: PipelineOptions,
    ) -> Self {
        let locator = FrameLocator::new(options.frame_name.clone(), options.frame_load_timeout);
        Self {
            launcher,
            matcher,
            downloader,
            locator,
            options,
        }
    }

    /// Playwright browser, regex matcher and HTTP downloader wired from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let launcher = PlaywrightLauncher::new(DriverOptions {
            node_command: config.browser.node_command.clone(),
            headless: config.browser.headless,
            navigation_timeout: config.timeouts.navigation,
        });
        let matcher = PreviewUrlMatcher::new(config.url_pattern())?;
        let downloader = HttpDownloader::new(config.timeouts.download)?;
        Ok(Self::new(
            Arc::new(launcher),
            Arc::new(matcher),
            Arc::new(downloader),
            PipelineOptions::from(config),
        ))
    }

    pub async fn run(&self, request: &PageRequest) -> Result<ExtractedDocument> {
        self.execute(request, &CancellationToken::new()).await.outcome
    }

    pub async fn run_with_cancel(
        &self,
        request: &PageRequest,
        cancel: &CancellationToken,
    ) -> Result<ExtractedDocument> {
        self.execute(request, cancel).await.outcome
    }

    /// Runs the pipeline to a terminal stage. Never panics on stage failures;
    /// every error is folded into the returned run.
    #[instrument(skip(self, request, cancel), fields(page_url = %request.page_url))]
    pub async fn execute(&self, request: &PageRequest, cancel: &CancellationToken) -> PipelineRun {
        let mut stage = Stage::Idle;

        // A session dropped mid-open kills its own browser process.
        let mut session = match until_cancelled(cancel, self.launcher.open()).await {
            Ok(session) => session,
            Err(err) => return fail(stage, err),
        };
        advance(&mut stage, Stage::BrowserOpen);

        let outcome = self
            .drive(session.as_mut(), request, cancel, &mut stage)
            .await;

        if let Err(err) = session.close().await {
            warn!(error = %err, "browser close failed");
        }

        match outcome {
            Ok(document) => {
                info!(
                    document_url = %document.document_url,
                    bytes = document.document.byte_length,
                    "extraction succeeded"
                );
                PipelineRun {
                    stage,
                    outcome: Ok(document),
                }
            }
            Err(err) => fail(stage, err),
        }
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        request: &PageRequest,
        cancel: &CancellationToken,
        stage: &mut Stage,
    ) -> Result<ExtractedDocument> {
        until_cancelled(cancel, session.navigate(&request.page_url, LoadPolicy::Load)).await?;
        // Give client-side scripts time to inject the frame.
        until_cancelled(cancel, async {
            tokio::time::sleep(self.options.settle_delay).await;
            Ok(())
        })
        .await?;
        advance(stage, Stage::Navigated);

        let located = until_cancelled(cancel, self.locator.locate(session)).await?;
        advance(stage, Stage::FrameLoaded);

        let extracted = until_cancelled(cancel, self.extract(session, located)).await?;
        advance(stage, Stage::UrlExtracted);

        let document =
            until_cancelled(cancel, self.downloader.download(&extracted.document_url)).await?;
        advance(stage, Stage::Downloaded);

        Ok(ExtractedDocument {
            document_url: extracted.document_url,
            document,
        })
    }

    /// Matches the captured markup. After a frame-load timeout a miss may be
    /// stale markup, so the frame is re-read up to `stale_frame_rereads` times.
    async fn extract(
        &self,
        session: &mut dyn BrowserSession,
        located: LocatedFrame,
    ) -> Result<ExtractedUrl> {
        let mut rereads_left = match located.load {
            FrameLoad::TimedOut => self.options.stale_frame_rereads,
            FrameLoad::Loaded => 0,
        };
        let mut snapshot = located.snapshot;

        loop {
            match extract_document_url(self.matcher.as_ref(), &snapshot) {
                Ok(url) => return Ok(url),
                Err(err) if rereads_left == 0 => return Err(err),
                Err(_) => {
                    rereads_left -= 1;
                    debug!(rereads_left, "no document URL yet; re-reading frame");
                    tokio::time::sleep(self.options.stale_frame_reread_interval).await;
                    snapshot = self.locator.read(session, &located.handle).await?;
                }
            }
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = ?stage, to = ?next, "pipeline stage");
    *stage = next;
}

fn fail(stage: Stage, err: ExtractError) -> PipelineRun {
    warn!(at = ?stage, kind = ?err.kind(), error = %err, "extraction failed");
    PipelineRun {
        stage: Stage::Failed(err.kind()),
        outcome: Err(err),
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtractError::Cancelled),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FrameHandle;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DOC: &str = "https://pdfnet.lockton.com/previewliabilityholder.aspx?id=123";

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        closes: AtomicUsize,
        downloads: AtomicUsize,
    }

    #[derive(Clone)]
    struct Script {
        navigate_error: bool,
        frame: Option<&'static str>,
        load: FrameLoad,
        reads: Vec<String>,
        hang_on_frame: bool,
    }

    impl Script {
        fn with_markup(markup: &str) -> Self {
            Self {
                navigate_error: false,
                frame: Some("mainFrame"),
                load: FrameLoad::Loaded,
                reads: vec![markup.to_string()],
                hang_on_frame: false,
            }
        }
    }

    struct FakeLauncher {
        script: Script,
        counters: Arc<Counters>,
        fail_open: bool,
    }

    struct FakeSession {
        script: Script,
        reads: VecDeque<String>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn open(&self) -> Result<Box<dyn BrowserSession>> {
            if self.fail_open {
                return Err(ExtractError::Config("node not found on PATH".into()));
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                reads: self.script.reads.iter().cloned().collect(),
                script: self.script.clone(),
                counters: self.counters.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&mut self, url: &str, _policy: LoadPolicy) -> Result<()> {
            if self.script.navigate_error {
                return Err(ExtractError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED {url}")));
            }
            Ok(())
        }

        async fn frame_by_name(&mut self, name: &str) -> Result<Option<FrameHandle>> {
            if self.script.hang_on_frame {
                std::future::pending::<()>().await;
            }
            Ok(self.script.frame.filter(|f| *f == name).map(|f| FrameHandle {
                name: f.to_string(),
            }))
        }

        async fn wait_for_frame_load(
            &mut self,
            _frame: &FrameHandle,
            _timeout: Duration,
        ) -> Result<FrameLoad> {
            Ok(self.script.load)
        }

        async fn frame_content(&mut self, _frame: &FrameHandle) -> Result<String> {
            // Last scripted read repeats once the queue is drained.
            if self.reads.len() > 1 {
                Ok(self.reads.pop_front().unwrap_or_default())
            } else {
                Ok(self.reads.front().cloned().unwrap_or_default())
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeDownloader {
        counters: Arc<Counters>,
        response: Mutex<Option<Result<DownloadedDocument>>>,
    }

    #[async_trait]
    impl DocumentDownloader for FakeDownloader {
        async fn download(&self, _url: &str) -> Result<DownloadedDocument> {
            self.counters.downloads.fetch_add(1, Ordering::SeqCst);
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(DownloadedDocument::from_bytes(b"%PDF-1.4\n".to_vec())))
        }
    }

    fn pipeline(
        script: Script,
        download: Option<Result<DownloadedDocument>>,
        options: PipelineOptions,
    ) -> (ExtractionPipeline, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let pipeline = ExtractionPipeline::new(
            Arc::new(FakeLauncher {
                script,
                counters: counters.clone(),
                fail_open: false,
            }),
            Arc::new(PreviewUrlMatcher::default()),
            Arc::new(FakeDownloader {
                counters: counters.clone(),
                response: Mutex::new(download),
            }),
            options,
        );
        (pipeline, counters)
    }

    fn fast_options() -> PipelineOptions {
        PipelineOptions {
            settle_delay: Duration::ZERO,
            frame_load_timeout: Duration::from_millis(1),
            stale_frame_reread_interval: Duration::ZERO,
            ..PipelineOptions::default()
        }
    }

    fn request() -> PageRequest {
        PageRequest::new("https://example.test/policy").unwrap()
    }

    fn assert_closed_once(counters: &Counters) {
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_reaches_downloaded_and_closes() {
        let markup = format!(r#"<html><a href="{DOC}">pdf</a></html>"#);
        let (pipeline, counters) = pipeline(Script::with_markup(&markup), None, fast_options());

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Downloaded);
        let document = run.outcome.expect("success");
        assert_eq!(document.document_url, DOC);
        assert_eq!(document.document.encoded_payload, "JVBERi0xLjQK");
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn missing_frame_skips_download_and_closes() {
        let mut script = Script::with_markup(DOC);
        script.frame = Some("sideFrame");
        let (pipeline, counters) = pipeline(script, None, fast_options());

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::FrameNotFound));
        assert!(matches!(run.outcome, Err(ExtractError::FrameNotFound { .. })));
        assert_eq!(counters.downloads.load(Ordering::SeqCst), 0);
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn navigation_failure_closes_browser() {
        let mut script = Script::with_markup(DOC);
        script.navigate_error = true;
        let (pipeline, counters) = pipeline(script, None, fast_options());

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::Navigation));
        assert_eq!(counters.downloads.load(Ordering::SeqCst), 0);
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn no_match_is_extraction_failure() {
        let (pipeline, counters) =
            pipeline(Script::with_markup("<html>nothing</html>"), None, fast_options());

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::Extraction));
        assert_eq!(counters.downloads.load(Ordering::SeqCst), 0);
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn download_404_is_download_error_not_timeout() {
        let (pipeline, counters) = pipeline(
            Script::with_markup(DOC),
            Some(Err(ExtractError::download_status(404))),
            fast_options(),
        );

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::Download));
        assert_eq!(run.outcome.unwrap_err().status(), Some(404));
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn download_timeout_closes_browser() {
        let (pipeline, counters) = pipeline(
            Script::with_markup(DOC),
            Some(Err(ExtractError::DownloadTimeout(Duration::from_secs(30)))),
            fast_options(),
        );

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::DownloadTimeout));
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn launch_failure_has_nothing_to_close() {
        let counters = Arc::new(Counters::default());
        let pipeline = ExtractionPipeline::new(
            Arc::new(FakeLauncher {
                script: Script::with_markup(DOC),
                counters: counters.clone(),
                fail_open: true,
            }),
            Arc::new(PreviewUrlMatcher::default()),
            Arc::new(FakeDownloader {
                counters: counters.clone(),
                response: Mutex::new(None),
            }),
            fast_options(),
        );

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::Config));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_frame_is_reread_after_load_timeout() {
        let mut script = Script::with_markup("<html>loading…</html>");
        script.load = FrameLoad::TimedOut;
        script.reads.push(format!("<a href='{DOC}'>"));
        let options = PipelineOptions {
            stale_frame_rereads: 2,
            ..fast_options()
        };
        let (pipeline, counters) = pipeline(script, None, options);

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Downloaded);
        assert_closed_once(&counters);
    }

    #[tokio::test]
    async fn stale_frame_is_not_reread_by_default() {
        let mut script = Script::with_markup("<html>loading…</html>");
        script.load = FrameLoad::TimedOut;
        script.reads.push(DOC.to_string());
        let (pipeline, _counters) = pipeline(script, None, fast_options());

        let run = pipeline.execute(&request(), &CancellationToken::new()).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::Extraction));
    }

    #[tokio::test]
    async fn cancellation_stops_run_and_closes() {
        let mut script = Script::with_markup(DOC);
        script.hang_on_frame = true;
        let (pipeline, counters) = pipeline(script, None, fast_options());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let run = pipeline.execute(&request(), &cancel).await;

        assert_eq!(run.stage, Stage::Failed(ErrorKind::Cancelled));
        assert_eq!(counters.downloads.load(Ordering::SeqCst), 0);
        assert_closed_once(&counters);
    }

    #[test]
    fn terminal_stages() {
        assert!(Stage::Downloaded.is_terminal());
        assert!(Stage::Failed(ErrorKind::Internal).is_terminal());
        assert!(!Stage::FrameLoaded.is_terminal());
    }
}
