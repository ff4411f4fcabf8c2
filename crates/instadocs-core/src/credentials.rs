use chrono::{DateTime, Duration, Utc};
use instadocs_api::google_auth::default_token_uri;
use instadocs_api::{ClientSecrets, GoogleAuthClient, TokenResponse, GOOGLE_API_SCOPES};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cached tokens are treated as expired this long before Google says so
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Google "authorized user" record: enough to mint access tokens without
/// asking the user again.
///
/// Field names match the JSON Google's own client libraries write, so an
/// existing `google-authorized-user.json` can be reused as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    /// Last access token handed out
    #[serde(default)]
    pub token: Option<String>,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUser {
    /// Build from the first code exchange, which must carry a refresh token
    pub fn from_token_response(
        secrets: &ClientSecrets,
        token: TokenResponse,
        now: DateTime<Utc>,
    ) -> crate::Result<Self> {
        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            crate::Error::AuthError(
                "Google did not return a refresh token; revoke the app's access and retry".into(),
            )
        })?;

        let mut user = Self {
            token: None,
            refresh_token,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: GOOGLE_API_SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        };
        user.apply_token(token, now);
        Ok(user)
    }

    /// The cached access token, if it is still good at `now`
    pub fn cached_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref()?;
        let expiry = self.expiry?;
        if expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
            Some(token)
        } else {
            None
        }
    }

    /// Store a freshly minted access token
    pub fn apply_token(&mut self, token: TokenResponse, now: DateTime<Utc>) {
        self.expiry = token.expires_in.map(|secs| now + Duration::seconds(secs));
        self.token = Some(token.access_token);
        // Google rotates refresh tokens rarely, but keep the new one when it does
        if let Some(refresh) = token.refresh_token {
            self.refresh_token = refresh;
        }
    }
}

/// JSON file holding the authorized-user record
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nobody has authorized yet
    pub fn load(&self) -> crate::Result<Option<AuthorizedUser>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let user: AuthorizedUser = serde_json::from_str(&contents).map_err(|e| {
            crate::Error::ConfigError(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(user))
    }

    pub fn save(&self, user: &AuthorizedUser) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(user)?;

        // Refresh token is as good as a password: the file is owner-only from
        // the moment it exists, and the rename replaces any looser old copy
        let tmp = self.path.with_extension("json.tmp");
        let _ = std::fs::remove_file(&tmp);
        {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        debug!("Saved Google credentials to {}", self.path.display());
        Ok(())
    }

    /// A usable access token, refreshing (and re-saving) when the cached one
    /// is stale. `None` means the consent flow has to run first.
    pub async fn access_token(&self, auth: &GoogleAuthClient) -> crate::Result<Option<String>> {
        let Some(mut user) = self.load()? else {
            return Ok(None);
        };

        let now = Utc::now();
        if let Some(token) = user.cached_token(now) {
            debug!("Reusing cached Google access token");
            return Ok(Some(token.to_string()));
        }

        info!("Refreshing Google access token");
        let token = auth
            .refresh(
                &user.token_uri,
                &user.client_id,
                &user.client_secret,
                &user.refresh_token,
            )
            .await?;
        user.apply_token(token, now);
        self.save(&user)?;

        Ok(user.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn secrets() -> ClientSecrets {
        ClientSecrets::from_json(r#"{"installed": {"client_id": "cid", "client_secret": "csec"}}"#)
            .unwrap()
    }

    fn token(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            expires_in,
            refresh_token: refresh.map(str::to_string),
            scope: None,
            token_type: Some("Bearer".into()),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_exchange_requires_refresh_token() {
        let err = AuthorizedUser::from_token_response(&secrets(), token("a", None, Some(3600)), noon())
            .unwrap_err();
        assert!(matches!(err, crate::Error::AuthError(_)));
    }

    #[test]
    fn test_cached_token_respects_expiry_margin() {
        let user = AuthorizedUser::from_token_response(
            &secrets(),
            token("access-1", Some("refresh-1"), Some(3600)),
            noon(),
        )
        .unwrap();

        assert_eq!(user.cached_token(noon()), Some("access-1"));
        assert_eq!(user.cached_token(noon() + Duration::seconds(3500)), Some("access-1"));
        // Inside the safety margin
        assert_eq!(user.cached_token(noon() + Duration::seconds(3550)), None);
        assert_eq!(user.cached_token(noon() + Duration::seconds(7200)), None);
    }

    #[test]
    fn test_token_without_expiry_is_never_cached() {
        let user = AuthorizedUser::from_token_response(
            &secrets(),
            token("access-1", Some("refresh-1"), None),
            noon(),
        )
        .unwrap();
        assert_eq!(user.cached_token(noon()), None);
    }

    #[test]
    fn test_refresh_keeps_refresh_token_unless_rotated() {
        let mut user = AuthorizedUser::from_token_response(
            &secrets(),
            token("access-1", Some("refresh-1"), Some(3600)),
            noon(),
        )
        .unwrap();

        user.apply_token(token("access-2", None, Some(3600)), noon());
        assert_eq!(user.refresh_token, "refresh-1");
        assert_eq!(user.token.as_deref(), Some("access-2"));

        user.apply_token(token("access-3", Some("refresh-2"), Some(3600)), noon());
        assert_eq!(user.refresh_token, "refresh-2");
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("google").join("user.json"));
        assert!(store.load().unwrap().is_none());

        let user = AuthorizedUser::from_token_response(
            &secrets(),
            token("access-1", Some("refresh-1"), Some(3600)),
            noon(),
        )
        .unwrap();
        store.save(&user).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.client_id, "cid");
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.expiry, user.expiry);
    }

    #[test]
    fn test_reads_google_library_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google-authorized-user.json");
        std::fs::write(
            &path,
            r#"{"token": "ya29.x", "refresh_token": "1//r", "token_uri": "https://oauth2.googleapis.com/token",
                "client_id": "cid", "client_secret": "csec",
                "scopes": ["https://www.googleapis.com/auth/drive.readonly"],
                "universe_domain": "googleapis.com", "account": "",
                "expiry": "2024-06-01T12:59:59.123456Z"}"#,
        )
        .unwrap();

        let user = CredentialStore::new(&path).load().unwrap().unwrap();
        assert_eq!(user.cached_token(noon()), Some("ya29.x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let user = AuthorizedUser::from_token_response(
            &secrets(),
            token("access-1", Some("refresh-1"), Some(3600)),
            noon(),
        )
        .unwrap();
        CredentialStore::new(&path).save(&user).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!path.with_extension("json.tmp").exists());
    }

    mod refresh {
        use super::*;
        use axum::routing::post;
        use axum::Router;
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        /// Fake token endpoint; returns its URL and a hit counter
        async fn token_endpoint() -> (String, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = calls.clone();
            let app = Router::new().route(
                "/token",
                post(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    r#"{"access_token": "ya29.fresh", "expires_in": 3599}"#
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{}/token", addr), calls)
        }

        fn stored_user(token_uri: String, expiry: DateTime<Utc>) -> AuthorizedUser {
            AuthorizedUser {
                token: Some("ya29.cached".into()),
                refresh_token: "1//refresh".into(),
                token_uri,
                client_id: "cid".into(),
                client_secret: "csec".into(),
                scopes: Vec::new(),
                expiry: Some(expiry),
            }
        }

        #[tokio::test]
        async fn test_expired_token_is_refreshed_and_saved() {
            let (token_uri, calls) = token_endpoint().await;
            let dir = tempfile::tempdir().unwrap();
            let store = CredentialStore::new(dir.path().join("user.json"));
            store
                .save(&stored_user(token_uri, Utc::now() - Duration::minutes(5)))
                .unwrap();

            let token = store.access_token(&GoogleAuthClient::new()).await.unwrap();
            assert_eq!(token.as_deref(), Some("ya29.fresh"));
            assert_eq!(calls.load(Ordering::SeqCst), 1);

            let saved = store.load().unwrap().unwrap();
            assert_eq!(saved.token.as_deref(), Some("ya29.fresh"));
            assert_eq!(saved.refresh_token, "1//refresh");
            assert!(saved.cached_token(Utc::now()).is_some());
        }

        #[tokio::test]
        async fn test_valid_token_skips_refresh() {
            let (token_uri, calls) = token_endpoint().await;
            let dir = tempfile::tempdir().unwrap();
            let store = CredentialStore::new(dir.path().join("user.json"));
            store
                .save(&stored_user(token_uri, Utc::now() + Duration::hours(1)))
                .unwrap();

            let token = store.access_token(&GoogleAuthClient::new()).await.unwrap();
            assert_eq!(token.as_deref(), Some("ya29.cached"));
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }

        #[tokio::test]
        async fn test_no_record_means_consent_needed() {
            let dir = tempfile::tempdir().unwrap();
            let store = CredentialStore::new(dir.path().join("missing.json"));
            assert!(store.access_token(&GoogleAuthClient::new()).await.unwrap().is_none());
        }
    }
}
