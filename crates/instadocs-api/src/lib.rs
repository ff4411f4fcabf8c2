// API clients for Instapaper and Google
pub mod drive;
pub mod google_auth;
pub mod instapaper;
pub mod oauth1;
pub mod retry;

#[cfg(test)]
mod test_support;

// Re-export common types
pub use drive::{DriveClient, DriveError, FileMetadata, DOCX_MIME_TYPE};
pub use google_auth::{ClientSecrets, GoogleAuthClient, GoogleAuthError, TokenResponse, GOOGLE_API_SCOPES};
pub use instapaper::{
    AccessToken, Bookmark, Folder, InstapaperClient, InstapaperError, NewBookmark,
    MAX_BOOKMARKS_PER_PAGE,
};
pub use oauth1::OAuth1Credentials;
pub use retry::RetryConfig;

pub(crate) const USER_AGENT: &str = concat!("instadocs/", env!("CARGO_PKG_VERSION"));
