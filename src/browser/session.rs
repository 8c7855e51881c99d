use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// The `load` event fired.
    #[default]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

impl LoadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPolicy::Load => "load",
            LoadPolicy::DomContentLoaded => "domcontentloaded",
            LoadPolicy::NetworkIdle => "networkidle",
        }
    }
}

/// A sub-frame that existed when it was looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    pub name: String,
}

/// Outcome of waiting for a frame's own load event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLoad {
    Loaded,
    TimedOut,
}

/// One browser instance with one context and one page.
///
/// `close` must be called exactly once for every session handed out by a
/// [`BrowserLauncher`], whatever happened in between.
#[async_trait]
pub trait BrowserSession: Send {
    /// Loads `url` and returns once `policy` is satisfied.
    async fn navigate(&mut self, url: &str, policy: LoadPolicy) -> Result<()>;

    /// Looks up a sub-frame by its name attribute.
    async fn frame_by_name(&mut self, name: &str) -> Result<Option<FrameHandle>>;

    /// Waits for the frame's load event, at most `timeout`.
    async fn wait_for_frame_load(
        &mut self,
        frame: &FrameHandle,
        timeout: Duration,
    ) -> Result<FrameLoad>;

    /// Full serialized markup of the frame.
    async fn frame_content(&mut self, frame: &FrameHandle) -> Result<String>;

    /// Releases the browser instance.
    async fn close(&mut self) -> Result<()>;
}

/// Opens isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}
