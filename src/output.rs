//! Request and response shapes at the boundary with the outer request layer.

use serde::{Deserialize, Serialize};

use crate::pipeline::ExtractedDocument;
use crate::{ExtractError, Result};

/// Input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub page_url: String,
}

impl PageRequest {
    /// Builds a request, rejecting a missing or blank page URL.
    pub fn new(page_url: impl Into<String>) -> Result<Self> {
        let request = Self {
            page_url: page_url.into(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_url.trim().is_empty() {
            return Err(ExtractError::Validation(
                "pageUrl is required in request body".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentData {
    pub base64: String,
    pub size: usize,
    pub pdf_url: String,
}

/// `{ success: true, data }` or `{ success: false, error }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DocumentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResponse {
    pub fn success(document: &ExtractedDocument) -> Self {
        Self {
            success: true,
            data: Some(DocumentData {
                base64: document.document.encoded_payload.clone(),
                size: document.document.byte_length,
                pdf_url: document.document_url.clone(),
            }),
            error: None,
        }
    }

    pub fn failure(err: &ExtractError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.public_message()),
        }
    }

    pub fn from_result(result: &Result<ExtractedDocument>) -> Self {
        match result {
            Ok(document) => Self::success(document),
            Err(err) => Self::failure(err),
        }
    }
}
