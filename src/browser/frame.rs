use std::time::Duration;

use tracing::{debug, warn};

use super::session::{BrowserSession, FrameHandle, FrameLoad};
use crate::extract::FrameSnapshot;
use crate::{ExtractError, Result};

/// Default bound for the frame's own load event.
pub const DEFAULT_FRAME_LOAD_TIMEOUT: Duration = Duration::from_millis(10000);

/// Finds a named sub-frame and captures its markup.
#[derive(Debug, Clone)]
pub struct FrameLocator {
    name: String,
    load_timeout: Duration,
}

/// A frame that was found, with the markup read right after the load wait.
#[derive(Debug, Clone)]
pub struct LocatedFrame {
    pub handle: FrameHandle,
    pub load: FrameLoad,
    pub snapshot: FrameSnapshot,
}

impl FrameLocator {
    pub fn new(name: impl Into<String>, load_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            load_timeout,
        }
    }

    /// Missing frame is terminal. A load-wait timeout is not: content may
    /// already be injected before the frame's load event fires, so whatever
    /// markup is present gets read anyway.
    pub async fn locate(&self, session: &mut dyn BrowserSession) -> Result<LocatedFrame> {
        let handle = session
            .frame_by_name(&self.name)
            .await?
            .ok_or_else(|| ExtractError::FrameNotFound {
                name: self.name.clone(),
            })?;

        let load = session
            .wait_for_frame_load(&handle, self.load_timeout)
            .await?;
        if load == FrameLoad::TimedOut {
            warn!(
                frame = %self.name,
                timeout_ms = self.load_timeout.as_millis() as u64,
                "frame load wait timed out; reading current markup"
            );
        }

        let snapshot = self.read(session, &handle).await?;
        Ok(LocatedFrame {
            handle,
            load,
            snapshot,
        })
    }

    pub async fn read(
        &self,
        session: &mut dyn BrowserSession,
        handle: &FrameHandle,
    ) -> Result<FrameSnapshot> {
        let markup = session.frame_content(handle).await?;
        debug!(frame = %handle.name, bytes = markup.len(), "captured frame markup");
        Ok(FrameSnapshot { markup })
    }
}
