use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookmark in an Instapaper folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    pub id: u64,
    pub url: String,
    pub title: String,
    /// Unix seconds when it was saved; Instapaper's only notion of order
    pub saved_at: i64,
}

/// What Drive tells us about a linked document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocMetadata {
    pub title: String,
    pub owner: String,
    pub modified: Option<DateTime<Utc>>,
}

/// A Google Doc found in the source folder, with its Drive metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocInfo {
    pub doc_id: String,
    /// Link as it appeared in the bookmark
    pub url: String,
    pub bookmark_title: String,
    /// Drive file name
    pub title: String,
    pub owner: String,
    /// Drive `modifiedTime`, used as the article date
    pub modified: Option<DateTime<Utc>>,
}

impl DocInfo {
    pub fn from_parts(doc_id: &str, bookmark: &Bookmark, metadata: DocMetadata) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            url: bookmark.url.clone(),
            bookmark_title: bookmark.title.clone(),
            title: metadata.title,
            owner: metadata.owner,
            modified: metadata.modified,
        }
    }

    /// `YYYY-MM-DD`, or "Unknown" when Drive has no modification time
    pub fn date_label(&self) -> String {
        self.modified
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// A bookmark about to be created in the target folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedBookmark {
    pub url: String,
    pub title: String,
    pub description: String,
    /// HTML body stored with the bookmark
    pub content: String,
}

/// Outcome of a `copy` run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyReport {
    pub source_folder: String,
    pub target_folder: String,
    /// `None` only on a dry run against a folder that doesn't exist yet
    pub target_folder_id: Option<u64>,
    pub created_folder: bool,
    pub dry_run: bool,
    /// Google Docs bookmarks found in the source folder
    pub found: usize,
    /// Docs skipped because their metadata couldn't be read
    pub skipped: usize,
    /// In the order they were (or would be) added
    pub planned: Vec<PlannedBookmark>,
    pub added: usize,
}

/// Outcome of a `download` run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    pub saved: Vec<std::path::PathBuf>,
    /// (bookmark url, error message)
    pub failed: Vec<(String, String)>,
}
