use thiserror::Error;

/// All the ways a run can go wrong
#[derive(Error, Debug)]
pub enum Error {
    #[error("Instapaper request failed: {0}")]
    Instapaper(#[from] instadocs_api::InstapaperError),

    #[error("Google Drive request failed: {0}")]
    Drive(#[from] instadocs_api::DriveError),

    #[error("Google authorization failed: {0}")]
    GoogleAuth(#[from] instadocs_api::GoogleAuthError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No such folder named {0}")]
    FolderNotFound(String),

    #[error("Not a Google Docs link: {0}")]
    NotAGoogleDoc(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Export failed: {0}")]
    ExportError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
