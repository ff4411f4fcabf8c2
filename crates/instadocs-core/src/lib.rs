// Core logic: find the Google Docs in an Instapaper folder, date them, and
// recreate them in order
pub mod config;
pub mod consent;
pub mod credentials;
pub mod error;
pub mod export;
pub mod gdocs;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod title;

pub use config::Config;
pub use consent::ConsentFlow;
pub use credentials::{AuthorizedUser, CredentialStore};
pub use error::Error;
pub use export::{ExportFormat, Exporter};
pub use pipeline::{CopyOptions, Pipeline};
pub use providers::{BookmarkService, DocumentService, DriveProvider, InstapaperProvider};
pub use title::TitleStyle;

pub type Result<T> = std::result::Result<T, Error>;
