use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::retry::{is_retryable_status, with_retry, RetryConfig, RetryableError};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Word export of a Google Doc
pub const DOCX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Error, Debug)]
pub enum DriveError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AuthRequired(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RetryableError for DriveError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriveError::RequestFailed(_) | DriveError::RateLimitExceeded | DriveError::NetworkError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DriveError>;

pub struct DriveClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl DriveClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, DRIVE_API_BASE.to_string())
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Name, owners and modification time of a file
    pub async fn file_metadata(&self, file_id: &str) -> Result<FileMetadata> {
        let url = format!("{}/files/{}", self.base_url, urlencoding::encode(file_id));

        with_retry(&self.retry_config, || async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("fields", "name,owners(displayName),modifiedTime"),
                    ("supportsAllDrives", "true"),
                ])
                .send()
                .await?;

            let response = check_status(response, file_id).await?;
            let metadata: FileMetadata = response.json().await?;
            Ok(metadata)
        })
        .await
    }

    /// Save a Google Doc as a Word document
    pub async fn export_docx(&self, file_id: &str, dest: &Path) -> Result<u64> {
        self.export_to_file(file_id, DOCX_MIME_TYPE, dest).await
    }

    /// Export a Google Workspace file to `dest`, returning the bytes written.
    ///
    /// Only the request is retried; once the body starts streaming a failure
    /// aborts and the partial file is removed.
    pub async fn export_to_file(&self, file_id: &str, mime_type: &str, dest: &Path) -> Result<u64> {
        let url = format!(
            "{}/files/{}/export",
            self.base_url,
            urlencoding::encode(file_id)
        );

        let mut response = with_retry(&self.retry_config, || async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("mimeType", mime_type)])
                .send()
                .await?;
            check_status(response, file_id).await
        })
        .await?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        let streamed: Result<()> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                match total {
                    Some(total) if total > 0 => {
                        debug!("Download progress: {}%", written * 100 / total)
                    }
                    _ => debug!("Downloaded {} bytes", written),
                }
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(err) = streamed {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(err);
        }

        info!("Exported {} ({} bytes) to {}", file_id, written, dest.display());
        Ok(written)
    }
}

async fn check_status(response: reqwest::Response, file_id: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == 404 {
        return Err(DriveError::NotFound(file_id.to_string()));
    }

    if status == 429 {
        return Err(DriveError::RateLimitExceeded);
    }

    let body = response.text().await.unwrap_or_default();

    if status == 401 || status == 403 {
        return Err(DriveError::AuthRequired(format!("{}: {}", file_id, body)));
    }

    if is_retryable_status(status) {
        return Err(DriveError::RequestFailed(format!("Status {}: {}", status, body)));
    }

    // Other 4xx: retrying won't change the answer
    Err(DriveError::Rejected {
        status: status.as_u16(),
        message: body,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owners: Vec<Owner>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default)]
    pub display_name: Option<String>,
}

impl FileMetadata {
    /// First owner's display name, "Unknown" when Drive doesn't say
    pub fn owner_name(&self) -> &str {
        self.owners
            .first()
            .and_then(|o| o.display_name.as_deref())
            .unwrap_or("Unknown")
    }
}
