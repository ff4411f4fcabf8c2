// Service traits the pipeline runs against, and the implementations that
// bridge them to the API clients.
use async_trait::async_trait;
use instadocs_api::{DriveClient, InstapaperClient, NewBookmark, RetryConfig};
use std::path::Path;
use tracing::info;

use crate::config::InstapaperCredentials;
use crate::models::{Bookmark, DocMetadata, PlannedBookmark};
use crate::Result;

/// The bookmarking side: Instapaper in production
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookmarkService: Send + Sync {
    /// Id of the folder titled exactly `name`
    async fn folder_id(&self, name: &str) -> Result<Option<u64>>;
    async fn list_bookmarks(&self, folder_id: u64) -> Result<Vec<Bookmark>>;
    async fn create_folder(&self, name: &str) -> Result<u64>;
    async fn add_bookmark(&self, folder_id: u64, bookmark: &PlannedBookmark) -> Result<()>;
}

/// The document side: Google Drive in production
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn metadata(&self, doc_id: &str) -> Result<DocMetadata>;
    /// Save the doc as .docx at `dest`, returning bytes written
    async fn export_docx(&self, doc_id: &str, dest: &Path) -> Result<u64>;
}

/// Wrapper around InstapaperClient that implements BookmarkService
pub struct InstapaperProvider {
    client: InstapaperClient,
    page_size: u32,
}

impl InstapaperProvider {
    /// Log in with xAuth and return a ready provider
    pub async fn connect(
        credentials: &InstapaperCredentials,
        api_url: &str,
        page_size: u32,
        retry: RetryConfig,
    ) -> Result<Self> {
        let mut client = InstapaperClient::with_base_url(
            &credentials.consumer_key,
            &credentials.consumer_secret,
            api_url.to_string(),
        )
        .with_retry_config(retry);
        client
            .login(&credentials.username, &credentials.password)
            .await?;
        info!("Logged in to Instapaper as {}", credentials.username);

        Ok(Self { client, page_size })
    }
}

#[async_trait]
impl BookmarkService for InstapaperProvider {
    async fn folder_id(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.client.folder_id(name).await?)
    }

    async fn list_bookmarks(&self, folder_id: u64) -> Result<Vec<Bookmark>> {
        let bookmarks = self.client.list_bookmarks(folder_id, self.page_size).await?;
        Ok(bookmarks.into_iter().map(instapaper_to_bookmark).collect())
    }

    async fn create_folder(&self, name: &str) -> Result<u64> {
        let folder = self.client.create_folder(name).await?;
        Ok(folder.folder_id)
    }

    async fn add_bookmark(&self, folder_id: u64, bookmark: &PlannedBookmark) -> Result<()> {
        let request = NewBookmark {
            folder_id,
            url: bookmark.url.clone(),
            title: bookmark.title.clone(),
            description: bookmark.description.clone(),
            content: Some(bookmark.content.clone()),
        };
        self.client.add_bookmark(&request).await?;
        Ok(())
    }
}

/// Convert an Instapaper API bookmark to our internal model
fn instapaper_to_bookmark(b: instadocs_api::Bookmark) -> Bookmark {
    Bookmark {
        id: b.bookmark_id,
        url: b.url,
        title: b.title,
        saved_at: b.time,
    }
}

/// Wrapper around DriveClient that implements DocumentService
pub struct DriveProvider {
    client: DriveClient,
}

impl DriveProvider {
    pub fn new(access_token: String, retry: RetryConfig) -> Self {
        Self {
            client: DriveClient::new(access_token).with_retry_config(retry),
        }
    }
}

#[async_trait]
impl DocumentService for DriveProvider {
    async fn metadata(&self, doc_id: &str) -> Result<DocMetadata> {
        let file = self.client.file_metadata(doc_id).await?;
        Ok(DocMetadata {
            owner: file.owner_name().to_string(),
            title: file.name,
            modified: file.modified_time,
        })
    }

    async fn export_docx(&self, doc_id: &str, dest: &Path) -> Result<u64> {
        Ok(self.client.export_docx(doc_id, dest).await?)
    }
}
