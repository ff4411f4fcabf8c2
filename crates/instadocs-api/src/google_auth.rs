// Google OAuth 2.0 for installed applications: consent URL, code exchange, refresh
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{is_retryable_status, with_retry, RetryConfig, RetryableError};

pub const GOOGLE_API_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/documents.readonly",
    "https://www.googleapis.com/auth/drive.metadata.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Error, Debug)]
pub enum GoogleAuthError {
    #[error("Invalid client secrets: {0}")]
    InvalidClientSecrets(String),

    #[error("OAuth error {error}: {description}")]
    OAuth { error: String, description: String },

    #[error("Token request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl RetryableError for GoogleAuthError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            GoogleAuthError::RequestFailed(_) | GoogleAuthError::NetworkError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GoogleAuthError>;

/// The OAuth client registered in Google Cloud console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

pub fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// `credentials.json` as downloaded from the console wraps the client in
/// either an `installed` or a `web` section
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(contents)?;
        file.installed.or(file.web).ok_or_else(|| {
            GoogleAuthError::InvalidClientSecrets(
                "expected an \"installed\" or \"web\" section".into(),
            )
        })
    }

    /// URL the user visits to grant access
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let scope = GOOGLE_API_SCOPES.join(" ");
        let url = url::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        Ok(url.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until `access_token` expires
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Only sent on the first exchange (and only with `access_type=offline`)
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct GoogleAuthClient {
    client: reqwest::Client,
    retry_config: RetryConfig,
}

impl GoogleAuthClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Trade the code from the consent redirect for tokens
    pub async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ];
        self.token_request(&secrets.token_uri, &form).await
    }

    /// Mint a new access token from a stored refresh token
    pub async fn refresh(
        &self,
        token_uri: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        self.token_request(token_uri, &form).await
    }

    async fn token_request(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        with_retry(&self.retry_config, || async {
            let response = self.client.post(token_uri).form(form).send().await?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.is_success() {
                return Ok(serde_json::from_str::<TokenResponse>(&body)?);
            }

            if is_retryable_status(status) {
                return Err(GoogleAuthError::RequestFailed(format!(
                    "Status {}: {}",
                    status, body
                )));
            }

            Err(oauth_error(&body, status))
        })
        .await
    }
}

impl Default for GoogleAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

fn oauth_error(body: &str, status: reqwest::StatusCode) -> GoogleAuthError {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(err) => GoogleAuthError::OAuth {
            error: err.error,
            description: err.error_description.unwrap_or_default(),
        },
        Err(_) => GoogleAuthError::OAuth {
            error: status.to_string(),
            description: body.to_string(),
        },
    }
}
