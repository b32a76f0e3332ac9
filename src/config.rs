//! Configuration — resolved once at startup from environment variables.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::mail::gmail::{GMAIL_API_BASE, GmailConfig};
use crate::mail::types::INBOX_LABEL;

const DEFAULT_DB_PATH: &str = "./data/emails.db";
const DEFAULT_RULES_PATH: &str = "./rules.json";
const DEFAULT_TOKEN_PATH: &str = "./token.json";
const DEFAULT_MAX_MESSAGES: usize = 100;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub rules_path: PathBuf,
    pub gmail_user_id: String,
    /// Label whose messages are fetched.
    pub gmail_label: String,
    pub max_messages: usize,
    pub api_base: String,
    pub access_token: SecretString,
}

/// Stored OAuth token. Either field name is accepted.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(alias = "access_token")]
    token: Option<String>,
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_messages = match var("GMAIL_MAX_MESSAGES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "GMAIL_MAX_MESSAGES".to_string(),
                    message: format!("expected a positive integer, got {raw:?}"),
                })?,
            None => DEFAULT_MAX_MESSAGES,
        };

        let access_token = match var("GMAIL_ACCESS_TOKEN") {
            Some(token) => SecretString::from(token),
            None => {
                let path = var("GMAIL_TOKEN_PATH").unwrap_or_else(|| DEFAULT_TOKEN_PATH.into());
                read_token_file(Path::new(&path))?
            }
        };

        Ok(Self {
            db_path: var("INBOX_RULES_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.into())
                .into(),
            rules_path: var("INBOX_RULES_RULES_PATH")
                .unwrap_or_else(|| DEFAULT_RULES_PATH.into())
                .into(),
            gmail_user_id: var("GMAIL_USER_ID").unwrap_or_else(|| "me".into()),
            gmail_label: var("GMAIL_LABEL").unwrap_or_else(|| INBOX_LABEL.into()),
            max_messages,
            api_base: var("GMAIL_API_BASE").unwrap_or_else(|| GMAIL_API_BASE.into()),
            access_token,
        })
    }

    /// Mail source settings derived from this configuration.
    pub fn gmail_config(&self) -> GmailConfig {
        GmailConfig {
            api_base: self.api_base.trim_end_matches('/').to_string(),
            user_id: self.gmail_user_id.clone(),
            label: self.gmail_label.clone(),
            max_messages: self.max_messages,
            access_token: self.access_token.clone(),
        }
    }
}

fn read_token_file(path: &Path) -> Result<SecretString, ConfigError> {
    let missing = || ConfigError::MissingRequired {
        key: "GMAIL_ACCESS_TOKEN".to_string(),
        hint: format!(
            "Set it, or store an OAuth token at {} (GMAIL_TOKEN_PATH)",
            path.display()
        ),
    };

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let file: TokenFile = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    file.token
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
        .ok_or_else(missing)
}
