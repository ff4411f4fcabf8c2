use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::oauth1::OAuth1Credentials;
use crate::retry::{is_retryable_status, with_retry, RetryConfig, RetryableError};

const INSTAPAPER_API_BASE: &str = "https://www.instapaper.com";

/// Instapaper refuses to return more than this many bookmarks per call
pub const MAX_BOOKMARKS_PER_PAGE: u32 = 500;

#[derive(Error, Debug)]
pub enum InstapaperError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Instapaper error {code}: {message}")]
    Api { code: u32, message: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl RetryableError for InstapaperError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            InstapaperError::RequestFailed(_)
                | InstapaperError::RateLimitExceeded
                | InstapaperError::NetworkError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, InstapaperError>;

/// OAuth token pair returned by the xAuth exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
}

pub struct InstapaperClient {
    client: reqwest::Client,
    credentials: OAuth1Credentials,
    base_url: String,
    retry_config: RetryConfig,
}

impl InstapaperClient {
    pub fn new(consumer_key: &str, consumer_secret: &str) -> Self {
        Self::with_base_url(consumer_key, consumer_secret, INSTAPAPER_API_BASE.to_string())
    }

    /// Point the client somewhere other than instapaper.com (tests, proxies)
    pub fn with_base_url(consumer_key: &str, consumer_secret: &str, base_url: String) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(crate::USER_AGENT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            credentials: OAuth1Credentials::consumer(consumer_key, consumer_secret),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn set_access_token(&mut self, token: AccessToken) {
        self.credentials = self.credentials.clone().with_token(token.token, token.secret);
    }

    /// Exchange username/password for an access token (xAuth)
    pub async fn access_token(&self, username: &str, password: &str) -> Result<AccessToken> {
        let form = vec![
            ("x_auth_username".to_string(), username.to_string()),
            ("x_auth_password".to_string(), password.to_string()),
            ("x_auth_mode".to_string(), "client_auth".to_string()),
        ];
        let body = self.post("/api/1/oauth/access_token", form).await?;
        parse_access_token(&body)
    }

    /// Log in and keep the resulting token on this client
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token = self.access_token(username, password).await?;
        debug!("Obtained Instapaper access token for {}", username);
        self.set_access_token(token);
        Ok(())
    }

    /// List the user's folders
    pub async fn list_folders(&self) -> Result<Vec<Folder>> {
        self.require_token()?;
        let body = self.post("/api/1.1/folders/list", Vec::new()).await?;
        let items = parse_items(&body)?;
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                ApiItem::Folder(folder) => Some(folder),
                _ => None,
            })
            .collect())
    }

    /// Numeric id of the folder with exactly this title
    pub async fn folder_id(&self, name: &str) -> Result<Option<u64>> {
        let folders = self.list_folders().await?;
        Ok(find_folder_id(&folders, name))
    }

    /// Bookmarks in a folder, following pages past `limit` with the `have` parameter
    pub async fn list_bookmarks(&self, folder_id: u64, limit: u32) -> Result<Vec<Bookmark>> {
        self.require_token()?;
        let limit = limit.clamp(1, MAX_BOOKMARKS_PER_PAGE);
        let mut bookmarks: Vec<Bookmark> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();

        loop {
            let mut form = vec![
                ("folder_id".to_string(), folder_id.to_string()),
                ("limit".to_string(), limit.to_string()),
            ];
            if !seen.is_empty() {
                form.push(("have".to_string(), have_param(&bookmarks)));
            }

            let body = self.post("/api/1/bookmarks/list", form).await?;
            let page = bookmarks_from_items(parse_items(&body)?);
            let page_len = page.len();

            let before = bookmarks.len();
            for bookmark in page {
                if seen.insert(bookmark.bookmark_id) {
                    bookmarks.push(bookmark);
                }
            }
            let fresh = bookmarks.len() - before;
            debug!(
                "Fetched page of {} bookmarks from folder {} ({} new)",
                page_len, folder_id, fresh
            );

            if page_len < limit as usize || fresh == 0 {
                break;
            }
        }

        Ok(bookmarks)
    }

    /// Create a folder and return it
    pub async fn create_folder(&self, title: &str) -> Result<Folder> {
        self.require_token()?;
        let form = vec![("title".to_string(), title.to_string())];
        let body = self.post("/api/1/folders/add", form).await?;
        parse_items(&body)?
            .into_iter()
            .find_map(|item| match item {
                ApiItem::Folder(folder) => Some(folder),
                _ => None,
            })
            .ok_or_else(|| InstapaperError::UnexpectedResponse(format!("no folder in {}", body)))
    }

    /// Save a bookmark into a folder
    pub async fn add_bookmark(&self, bookmark: &NewBookmark) -> Result<Bookmark> {
        self.require_token()?;
        let mut form = vec![
            ("url".to_string(), bookmark.url.clone()),
            ("title".to_string(), bookmark.title.clone()),
            ("description".to_string(), bookmark.description.clone()),
            ("folder_id".to_string(), bookmark.folder_id.to_string()),
        ];
        if let Some(content) = &bookmark.content {
            form.push(("content".to_string(), content.clone()));
        }

        let body = self.post("/api/1/bookmarks/add", form).await?;
        bookmarks_from_items(parse_items(&body)?)
            .into_iter()
            .next()
            .ok_or_else(|| InstapaperError::UnexpectedResponse(format!("no bookmark in {}", body)))
    }

    fn require_token(&self) -> Result<()> {
        if self.credentials.has_token() {
            Ok(())
        } else {
            Err(InstapaperError::AuthFailed("not logged in".into()))
        }
    }

    /// Signed form POST; every Instapaper endpoint is a POST
    async fn post(&self, path: &str, form: Vec<(String, String)>) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);

        with_retry(&self.retry_config, || async {
            // Fresh nonce and timestamp per attempt
            let auth = self.credentials.authorization_header("POST", &url, &form)?;

            let response = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, auth)
                .form(&form)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.is_success() {
                return Ok(body);
            }

            if status == 401 || status == 403 {
                return Err(InstapaperError::AuthFailed(error_message(&body, status)));
            }

            if status == 429 {
                return Err(InstapaperError::RateLimitExceeded);
            }

            if is_retryable_status(status) {
                return Err(InstapaperError::RequestFailed(format!(
                    "Status {}: {}",
                    status, body
                )));
            }

            Err(api_error(&body, status))
        })
        .await
    }
}

/// A folder as returned by `folders/list` and `folders/add`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(deserialize_with = "flexible_id")]
    pub folder_id: u64,
    pub title: String,
    #[serde(default)]
    pub position: Option<serde_json::Value>,
}

/// A bookmark as returned by `bookmarks/list` and `bookmarks/add`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    #[serde(deserialize_with = "flexible_id")]
    pub bookmark_id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Unix seconds when the bookmark was saved
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub progress: f64,
}

/// Parameters for `bookmarks/add`
#[derive(Debug, Clone, PartialEq)]
pub struct NewBookmark {
    pub folder_id: u64,
    pub url: String,
    pub title: String,
    pub description: String,
    /// Optional HTML body stored in place of fetching the page
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorItem {
    #[serde(default)]
    pub error_code: u32,
    #[serde(default)]
    pub message: String,
}

/// Responses are flat arrays of heterogeneous objects tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ApiItem {
    Folder(Folder),
    Bookmark(Bookmark),
    Error(ApiErrorItem),
    #[serde(other)]
    Other,
}

fn parse_items(body: &str) -> Result<Vec<ApiItem>> {
    let items: Vec<ApiItem> = serde_json::from_str(body)?;
    // Instapaper occasionally reports errors with a 200
    if let Some(err) = items.iter().find_map(|item| match item {
        ApiItem::Error(e) => Some(e.clone()),
        _ => None,
    }) {
        return Err(InstapaperError::Api {
            code: err.error_code,
            message: err.message,
        });
    }
    Ok(items)
}

fn bookmarks_from_items(items: Vec<ApiItem>) -> Vec<Bookmark> {
    items
        .into_iter()
        .filter_map(|item| match item {
            ApiItem::Bookmark(b) => Some(b),
            _ => None,
        })
        .collect()
}

fn find_folder_id(folders: &[Folder], name: &str) -> Option<u64> {
    folders.iter().find(|f| f.title == name).map(|f| f.folder_id)
}

fn have_param(bookmarks: &[Bookmark]) -> String {
    bookmarks
        .iter()
        .map(|b| b.bookmark_id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The xAuth endpoint answers with a query string, not JSON
fn parse_access_token(body: &str) -> Result<AccessToken> {
    let mut token = None;
    let mut secret = None;
    for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_token_secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }

    match (token, secret) {
        (Some(token), Some(secret)) => Ok(AccessToken { token, secret }),
        _ => Err(InstapaperError::AuthFailed(format!(
            "token response missing oauth_token/oauth_token_secret: {}",
            body
        ))),
    }
}

fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    match serde_json::from_str::<Vec<ApiErrorItem>>(body) {
        Ok(items) if !items.is_empty() => items[0].message.clone(),
        _ if body.is_empty() => format!("status {}", status),
        _ => body.to_string(),
    }
}

fn api_error(body: &str, status: reqwest::StatusCode) -> InstapaperError {
    match serde_json::from_str::<Vec<ApiErrorItem>>(body) {
        Ok(items) if !items.is_empty() => InstapaperError::Api {
            code: items[0].error_code,
            message: items[0].message.clone(),
        },
        _ => InstapaperError::Api {
            code: u32::from(status.as_u16()),
            message: body.to_string(),
        },
    }
}

/// Ids come back as numbers, but accept strings too
fn flexible_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(u64),
        Str(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Num(n) => Ok(n),
        Id::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
