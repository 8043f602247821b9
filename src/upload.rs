//! Uploading optimized variants to the media host.
//!
//! The host speaks a small HTTP API: POST the variant as a multipart form
//! with a single part named `file`, authenticate with the API key passed
//! verbatim in the `Authorization` header (no `Bearer` prefix), and read the
//! hosted URL back from the `url` field of the JSON response.
//!
//! [`MediaHost`] is the seam the pipeline works against; [`HttpMediaHost`] is
//! the production implementation, built once per run so the HTTP client and
//! its connection pool are shared across every upload.

use serde::Deserialize;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::UploadConfig;

/// Longest response body carried inside a [`UploadError::Status`].
const BODY_SNIPPET_LIMIT: usize = 512;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("media host returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("media host response has no url field")]
    MissingUrl,
}

/// Destination for optimized variants. Returns the hosted URL.
pub trait MediaHost: Sync {
    fn upload(&self, path: &Path, api_key: &str) -> Result<String, UploadError>;
}

/// Production host speaking the multipart HTTP API.
pub struct HttpMediaHost {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpMediaHost {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        Self::new(&config.endpoint, Duration::from_secs(config.timeout_secs))
    }
}

#[derive(Deserialize)]
struct HostResponse {
    url: Option<String>,
}

impl MediaHost for HttpMediaHost {
    fn upload(&self, path: &Path, api_key: &str) -> Result<String, UploadError> {
        let form = reqwest::blocking::multipart::Form::new().file("file", path)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, api_key)
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        let parsed: HostResponse = response.json()?;
        match parsed.url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(UploadError::MissingUrl),
        }
    }
}

/// Cap an error body at [`BODY_SNIPPET_LIMIT`] bytes on a char boundary.
fn truncate_body(body: String) -> String {
    if body.len() <= BODY_SNIPPET_LIMIT {
        return body;
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
