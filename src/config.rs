//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
const KEYRING_SERVICE: &str = "intake-desk";

/// Inbound email webhook settings.
///
/// The signing key is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WebhookConfig {
    /// Maximum accepted skew between the signed timestamp and now; 0 disables the check.
    #[serde(default = "default_max_timestamp_age")]
    pub max_timestamp_age_seconds: u64,
    /// Whether requests must carry a valid signature.
    #[serde(default = "default_true")]
    pub require_signature: bool,
    /// Shared signing secret (populated at runtime).
    #[serde(skip)]
    pub signing_key: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_timestamp_age_seconds: default_max_timestamp_age(),
            require_signature: true,
            signing_key: None,
        }
    }
}

/// Text-classification oracle settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClassifierConfig {
    /// Chat-completions endpoint URL.
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    /// Model identifier sent with each request.
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Upper bound on a single classification call.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_seconds: u64,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            model: default_classifier_model(),
            timeout_seconds: default_classifier_timeout(),
            api_key: String::new(),
        }
    }
}

impl ClassifierConfig {
    /// Classification call timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_timestamp_age() -> u64 {
    900
}

fn default_classifier_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_classifier_model() -> String {
    "gpt-4-turbo-preview".into()
}

fn default_classifier_timeout() -> u64 {
    30
}

fn default_http_host() -> String {
    "127.0.0.1".into()
}

fn default_http_port() -> u16 {
    3000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file path.
    pub db_path: PathBuf,
    /// Interface the HTTP server binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// HTTP port; 0 lets the OS choose.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Origin allowed to call the JSON API from a browser.
    pub cors_origin: String,
    /// Inbound email webhook settings.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Classification oracle settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the webhook signing key and classifier API key.
    ///
    /// Tries the `intake-desk` keyring service first, then falls back to
    /// `MAILGUN_WEBHOOK_SIGNING_KEY` / `OPENAI_API_KEY`. A missing signing
    /// key is tolerated: the webhook then rejects every request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain worker cannot run.
    pub async fn load_credentials(&mut self) -> Result<()> {
        match load_credential("webhook_signing_key", "MAILGUN_WEBHOOK_SIGNING_KEY").await? {
            Some(key) => self.webhook.signing_key = Some(key),
            None => warn!("no webhook signing key configured; inbound email will be rejected"),
        }
        match load_credential("openai_api_key", "OPENAI_API_KEY").await? {
            Some(key) => self.classifier.api_key = key,
            None => warn!("no classifier api key configured; classification calls will fail"),
        }
        Ok(())
    }

    /// Socket address string the HTTP server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Check invariants; re-run after applying command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(AppError::Config("http_port must be non-zero".into()));
        }

        if self.cors_origin.trim().is_empty() {
            return Err(AppError::Config("cors_origin must not be empty".into()));
        }

        if self.classifier.timeout_seconds == 0 {
            return Err(AppError::Config(
                "classifier.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config("db_path must not be empty".into()));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}
