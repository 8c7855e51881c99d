//! Headless browser automation for rendering the source page.
//!
//! The browser is Playwright Chromium, driven from a long-lived Node.js helper
//! that speaks line-delimited JSON over stdin/stdout.
//!
//! # Module Structure
//!
//! - [`session`] - `BrowserSession`/`BrowserLauncher` capabilities used by the pipeline
//! - [`playwright`] - Node helper script, availability checks and the real session
//! - [`frame`] - Named sub-frame lookup and markup capture
//!
//! # Example
//!
//! ```no_run
//! use framefetch_lib::{BrowserLauncher, DriverOptions, LoadPolicy, PlaywrightLauncher};
//!
//! # async fn example() -> framefetch_lib::Result<()> {
//! let launcher = PlaywrightLauncher::new(DriverOptions::default());
//! let mut session = launcher.open().await?;
//! let outcome = session.navigate("https://example.com", LoadPolicy::Load).await;
//! session.close().await?;
//! outcome
//! # }
//! ```

mod frame;
mod playwright;
mod session;

pub use frame::{FrameLocator, LocatedFrame, DEFAULT_FRAME_LOAD_TIMEOUT};
pub use playwright::{
    DriverOptions, PlaywrightLauncher, PlaywrightSession, DEFAULT_NAVIGATION_TIMEOUT,
};
pub use session::{BrowserLauncher, BrowserSession, FrameHandle, FrameLoad, LoadPolicy};
