use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Frame not found: {name}")]
    FrameNotFound { name: String },

    #[error("No document URL matching {pattern} in frame content")]
    Extraction { pattern: String },

    #[error("Download error (status: {status:?}): {message}")]
    Download { status: Option<u16>, message: String },

    #[error("Download timed out after {0:?}")]
    DownloadTimeout(Duration),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a failure, used as the terminal pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    Navigation,
    FrameNotFound,
    Extraction,
    Download,
    DownloadTimeout,
    Cancelled,
    Config,
    Internal,
}

impl ExtractError {
    pub fn download_status(status: u16) -> Self {
        ExtractError::Download {
            status: Some(status),
            message: format!("Failed to download document. Status code: {status}"),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        ExtractError::Download {
            status: None,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExtractError::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Validation(_) => ErrorKind::Validation,
            ExtractError::Navigation(_) => ErrorKind::Navigation,
            ExtractError::FrameNotFound { .. } => ErrorKind::FrameNotFound,
            ExtractError::Extraction { .. } => ErrorKind::Extraction,
            ExtractError::Download { .. } | ExtractError::Network(_) => ErrorKind::Download,
            ExtractError::DownloadTimeout(_) => ErrorKind::DownloadTimeout,
            ExtractError::Cancelled => ErrorKind::Cancelled,
            ExtractError::Config(_) => ErrorKind::Config,
            ExtractError::Io(_) | ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Status code observed on a failed download, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExtractError::Download { status, .. } => *status,
            ExtractError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Message safe to hand back to an external caller.
    ///
    /// Underlying causes (transport errors, browser stderr) stay in `Display`
    /// for logs and never leak through here.
    pub fn public_message(&self) -> String {
        match self {
            ExtractError::Validation(msg) => msg.clone(),
            ExtractError::Navigation(_) => "Failed to load the requested page.".to_string(),
            ExtractError::FrameNotFound { name } => format!("{name} not found."),
            ExtractError::Extraction { .. } => {
                "Could not extract document URL from frame content.".to_string()
            }
            ExtractError::Download {
                status: Some(status),
                ..
            } => format!("Failed to download document. Status code: {status}"),
            ExtractError::Download { status: None, .. } | ExtractError::Network(_) => {
                "Failed to download document.".to_string()
            }
            ExtractError::DownloadTimeout(_) => "Download timeout".to_string(),
            ExtractError::Cancelled => "Extraction cancelled.".to_string(),
            ExtractError::Config(_) | ExtractError::Io(_) | ExtractError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            ExtractError::Validation(msg) => ErrorPayload::new(
                ErrorCategory::Validation,
                msg.to_string(),
                "Pass a non-empty page URL (e.g., --page-url https://example.com/policy).",
            ),
            ExtractError::Navigation(msg) => ErrorPayload::new(
                ErrorCategory::Browser,
                msg.to_string(),
                "Verify the page URL loads in a browser; check connectivity/proxy/VPN.",
            ),
            ExtractError::FrameNotFound { name } => ErrorPayload::new(
                ErrorCategory::Browser,
                format!("Frame not found: {name}"),
                "Check --frame-name or increase --settle-delay so scripts can inject the frame.",
            ),
            ExtractError::Extraction { pattern } => ErrorPayload::new(
                ErrorCategory::Extraction,
                format!("No document URL matching {pattern}"),
                "The frame rendered without a preview link; increase --frame-timeout or check url_pattern.",
            ),
            ExtractError::Download { message, .. } => ErrorPayload::new(
                ErrorCategory::Network,
                message.to_string(),
                "Check the document endpoint is reachable; links may expire shortly after rendering.",
            ),
            ExtractError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            ExtractError::DownloadTimeout(limit) => ErrorPayload::new(
                ErrorCategory::Network,
                format!("Download timed out after {limit:?}"),
                "Try increasing --download-timeout.",
            ),
            ExtractError::Cancelled => ErrorPayload::new(
                ErrorCategory::Unknown,
                "Extraction cancelled".to_string(),
                "The run was cancelled by the caller; rerun if needed.",
            ),
            ExtractError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            ExtractError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("playwright npm package is missing") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`).",
                    )
                } else if lower.contains("chromium executable") || lower.contains("executable doesn't exist") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Run `npx playwright install chromium` (or `playwright install chromium`) to download the browser.",
                    )
                } else if lower.contains("spawn browser driver")
                    || lower.contains("node command")
                    || lower.contains("not found on path")
                {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Install Node.js and ensure the node binary is on PATH; rerun after installing Playwright if needed.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags and the config file (durations use humantime, e.g. 5s or 250ms).",
                    )
                }
            }
            ExtractError::Internal(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Config,
    Browser,
    Extraction,
    Network,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
