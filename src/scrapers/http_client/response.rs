//! HTTP response wrappers.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};

use crate::scrapers::rate_limiter::DomainPermit;

/// HTTP response wrapper.
///
/// Holds the per-domain permit until the body has been consumed, so the
/// domain concurrency cap covers the whole transfer.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub(crate) response: Response,
    pub(crate) permit: Option<DomainPermit>,
}

impl HttpResponse {
    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &str {
        self.response.url().as_str()
    }

    /// Get response body as bytes.
    pub async fn bytes(self) -> Result<Vec<u8>, reqwest::Error> {
        let bytes = self.response.bytes().await.map(|b| b.to_vec());
        drop(self.permit);
        bytes
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        let text = self.response.text().await;
        drop(self.permit);
        text
    }
}

/// A fully read page handed to the parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL of the response.
    pub url: String,
    pub status: StatusCode,
    pub body: String,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}
