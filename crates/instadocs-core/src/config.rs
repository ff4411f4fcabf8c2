use instadocs_api::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::title::TitleStyle;

/// Main configuration structure
///
/// Loaded from the config file, then overridden by environment variables,
/// then by CLI flags. Priority: CLI > Env > File > Defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub instapaper: InstapaperConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub copy: CopyConfig,
    /// Backoff for every API client
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a specific file. `.json` files use the flat upper-case key layout
    /// of the old `config.json`; anything else is TOML.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            let legacy: LegacyJsonConfig = serde_json::from_str(&contents).map_err(|e| {
                crate::Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            Ok(legacy.into())
        } else {
            toml::from_str(&contents).map_err(|e| {
                crate::Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
            })
        }
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override file values with whatever is set in the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INSTAPAPER_CONSUMER_KEY") {
            self.instapaper.consumer_key = Some(v);
        }
        if let Some(v) = lookup("INSTAPAPER_CONSUMER_SECRET") {
            self.instapaper.consumer_secret = Some(v);
        }
        if let Some(v) = lookup("INSTAPAPER_USERNAME") {
            self.instapaper.username = Some(v);
        }
        if let Some(v) = lookup("INSTAPAPER_PASSWORD") {
            self.instapaper.password = Some(v);
        }
        if let Some(v) = lookup("GOOGLE_CREDENTIALS_PATH") {
            self.google.credentials_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GOOGLE_AUTHORIZED_USER_PATH") {
            self.google.authorized_user_path = Some(PathBuf::from(v));
        }
    }

    /// All four Instapaper values, or a config error naming the first missing one
    pub fn instapaper_credentials(&self) -> crate::Result<InstapaperCredentials> {
        fn required(value: &Option<String>, name: &str) -> crate::Result<String> {
            value.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
                crate::Error::ConfigError(format!(
                    "instapaper.{} is not set (config file or environment)",
                    name
                ))
            })
        }

        Ok(InstapaperCredentials {
            consumer_key: required(&self.instapaper.consumer_key, "consumer_key")?,
            consumer_secret: required(&self.instapaper.consumer_secret, "consumer_secret")?,
            username: required(&self.instapaper.username, "username")?,
            password: self.instapaper.password.clone().unwrap_or_default(),
        })
    }

    /// Where the Google authorized-user record lives
    pub fn authorized_user_path(&self) -> crate::Result<PathBuf> {
        if let Some(path) = &self.google.authorized_user_path {
            return Ok(path.clone());
        }
        Ok(data_dir()?.join("google-authorized-user.json"))
    }

    /// Get the config file path (XDG on Linux, AppData on Windows)
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("instadocs");

        Ok(config_dir.join("config.toml"))
    }
}

fn data_dir() -> crate::Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_else(|| crate::Error::ConfigError("Could not find data directory".into()))?
        .join("instadocs"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstapaperConfig {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub username: Option<String>,
    /// Instapaper accounts may have no password
    pub password: Option<String>,

    #[serde(default = "default_instapaper_url")]
    pub api_url: String,
}

fn default_instapaper_url() -> String {
    "https://www.instapaper.com".to_string()
}

impl Default for InstapaperConfig {
    fn default() -> Self {
        Self {
            consumer_key: None,
            consumer_secret: None,
            username: None,
            password: None,
            api_url: default_instapaper_url(),
        }
    }
}

/// Validated Instapaper login material
#[derive(Debug, Clone)]
pub struct InstapaperCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client file downloaded from the Google Cloud console
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Defaults to the platform data dir
    #[serde(default)]
    pub authorized_user_path: Option<PathBuf>,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            authorized_user_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Pause between bookmark creations; Instapaper ingests adds
    /// asynchronously and can reorder them without it
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Page size for bookmark listing (Instapaper caps this at 500)
    #[serde(default = "default_bookmark_limit")]
    pub bookmark_limit: u32,

    #[serde(default)]
    pub title_style: TitleStyle,
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_bookmark_limit() -> u32 {
    500
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            bookmark_limit: default_bookmark_limit(),
            title_style: TitleStyle::default(),
        }
    }
}

/// The older flat `config.json` layout
#[derive(Debug, Deserialize)]
struct LegacyJsonConfig {
    #[serde(rename = "INSTAPAPER_CONSUMER_KEY")]
    consumer_key: Option<String>,
    #[serde(rename = "INSTAPAPER_CONSUMER_SECRET")]
    consumer_secret: Option<String>,
    #[serde(rename = "INSTAPAPER_USERNAME")]
    username: Option<String>,
    #[serde(rename = "INSTAPAPER_PASSWORD")]
    password: Option<String>,
    #[serde(rename = "GOOGLE_CREDENTIALS_PATH")]
    google_credentials_path: Option<PathBuf>,
}

impl From<LegacyJsonConfig> for Config {
    fn from(legacy: LegacyJsonConfig) -> Self {
        let mut config = Config::default();
        config.instapaper.consumer_key = legacy.consumer_key;
        config.instapaper.consumer_secret = legacy.consumer_secret;
        config.instapaper.username = legacy.username;
        config.instapaper.password = legacy.password;
        if let Some(path) = legacy.google_credentials_path {
            config.google.credentials_path = path;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.copy.delay_ms, 1000);
        assert_eq!(config.copy.bookmark_limit, 500);
        assert_eq!(config.copy.title_style, TitleStyle::Full);
        assert_eq!(config.google.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(config.instapaper.api_url, "https://www.instapaper.com");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.instapaper.username = Some("reader@example.com".into());
        config.copy.title_style = TitleStyle::TitleDate;

        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("delay_ms"));
        assert!(toml.contains("title-date"));

        let back: Config = toml::from_str(&toml).unwrap();
        assert_eq!(back.instapaper.username.as_deref(), Some("reader@example.com"));
        assert_eq!(back.copy.title_style, TitleStyle::TitleDate);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [instapaper]
            consumer_key = "ck"
            consumer_secret = "cs"
            username = "me"

            [copy]
            delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.copy.delay_ms, 250);
        assert_eq!(config.copy.bookmark_limit, 500);
        assert_eq!(config.retry, RetryConfig::default());
        let creds = config.instapaper_credentials().unwrap();
        assert_eq!(creds.consumer_key, "ck");
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_retry_table() {
        let config: Config = toml::from_str(
            r#"
            [retry]
            max_retries = 1
            initial_delay_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 50);
        assert_eq!(config.retry.max_delay_ms, RetryConfig::default().max_delay_ms);
    }

    #[test]
    fn test_legacy_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "INSTAPAPER_CONSUMER_KEY": "ck",
                "INSTAPAPER_CONSUMER_SECRET": "cs",
                "INSTAPAPER_USERNAME": "me@example.com",
                "INSTAPAPER_PASSWORD": "pw",
                "GOOGLE_CREDENTIALS_PATH": "secrets/credentials.json"
            }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.instapaper.username.as_deref(), Some("me@example.com"));
        assert_eq!(
            config.google.credentials_path,
            PathBuf::from("secrets/credentials.json")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.instapaper.username = Some("from-file".into());

        let env: HashMap<&str, &str> = [
            ("INSTAPAPER_USERNAME", "from-env"),
            ("GOOGLE_CREDENTIALS_PATH", "/tmp/creds.json"),
        ]
        .into_iter()
        .collect();
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.instapaper.username.as_deref(), Some("from-env"));
        assert_eq!(config.google.credentials_path, PathBuf::from("/tmp/creds.json"));
        assert!(config.instapaper.consumer_key.is_none());
    }

    #[test]
    fn test_missing_credentials_named() {
        let err = Config::default().instapaper_credentials().unwrap_err();
        assert!(err.to_string().contains("consumer_key"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.copy.delay_ms = 0;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.copy.delay_ms, 0);
    }
}
