use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Characters ASP.NET-style identity stores accept in a user name by default.
pub const DEFAULT_ALLOWED_USER_NAME_CHARACTERS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._@+";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct UserOptions {
    /// Empty string allows any character.
    #[serde(default = "default_allowed_user_name_characters")]
    pub allowed_user_name_characters: String,
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            allowed_user_name_characters: default_allowed_user_name_characters(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PasswordOptions {
    pub required_length: usize,
    pub required_unique_chars: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            required_length: 6,
            required_unique_chars: 1,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        }
    }
}

/// Policy handed to the identity-provider runtime.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct IdentityOptions {
    #[serde(default)]
    pub user: UserOptions,
    #[serde(default)]
    pub password: PasswordOptions,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct PagingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditSink {
    /// Persist every event to the `audit_log` table of the identity store.
    #[default]
    Database,
    /// Emit every event as a structured `tracing` event only.
    Tracing,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSink,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Identity store (users, roles, claims, logins, tokens, audit log).
    pub database_url: String,
    /// Persisted grant store. Defaults to `database_url` when unset.
    #[serde(default)]
    pub grants_database_url: Option<String>,
    #[serde(default)]
    pub identity: IdentityOptions,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Message overrides keyed by message code (e.g. `user_exists`).
    #[serde(default)]
    pub messages: HashMap<String, String>,
}

impl AppConfig {
    /// Defaults everywhere, both stores at `database_url`.
    pub fn with_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            grants_database_url: None,
            identity: IdentityOptions::default(),
            paging: PagingConfig::default(),
            audit: AuditConfig::default(),
            messages: HashMap::new(),
        }
    }

    pub fn grants_database_url(&self) -> &str {
        self.grants_database_url
            .as_deref()
            .unwrap_or(&self.database_url)
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation("database_url must be set".into()));
        }
        if self.paging.default_page_size == 0 {
            return Err(ConfigError::Validation(
                "paging.default_page_size must be > 0".into(),
            ));
        }
        if self.paging.default_page_size > self.paging.max_page_size {
            return Err(ConfigError::Validation(
                "paging.default_page_size must not exceed paging.max_page_size".into(),
            ));
        }
        if self.identity.password.required_length == 0 {
            return Err(ConfigError::Validation(
                "identity.password.required_length must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_allowed_user_name_characters() -> String {
    DEFAULT_ALLOWED_USER_NAME_CHARACTERS.to_string()
}

fn default_page_size() -> u64 {
    10
}

fn default_max_page_size() -> u64 {
    100
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variables prefixed with `IDENTITY_ADMIN` and using double
/// underscores as path separator override file values
/// (e.g. `IDENTITY_ADMIN__PAGING__MAX_PAGE_SIZE`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

/// Same as [`load_config`], reading the given file instead of `config.yaml`.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::from(path.as_ref()))
        .add_source(
            Environment::with_prefix("IDENTITY_ADMIN")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(yaml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config")
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let app = parse(r#"database_url: "sqlite::memory:""#);
        assert_eq!(app.grants_database_url(), "sqlite::memory:");
        assert_eq!(app.paging, PagingConfig::default());
        assert_eq!(app.identity, IdentityOptions::default());
        assert_eq!(app.audit.sink, AuditSink::Database);
        assert!(app.messages.is_empty());
        assert!(app.validate().is_ok());
    }

    #[test]
    fn password_options_partial_override() {
        let app = parse(
            r#"
database_url: "postgres://localhost/identity"
identity:
  password:
    required_length: 12
    require_non_alphanumeric: false
"#,
        );
        assert_eq!(app.identity.password.required_length, 12);
        assert!(!app.identity.password.require_non_alphanumeric);
        assert!(app.identity.password.require_digit);
    }

    #[test]
    fn validate_rejects_default_page_size_above_max() {
        let app = parse(
            r#"
database_url: "sqlite::memory:"
paging:
  default_page_size: 200
  max_page_size: 50
"#,
        );
        assert!(matches!(app.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn audit_sink_parses_snake_case() {
        let app = parse(
            r#"
database_url: "sqlite::memory:"
audit:
  sink: tracing
"#,
        );
        assert_eq!(app.audit.sink, AuditSink::Tracing);
    }
}
