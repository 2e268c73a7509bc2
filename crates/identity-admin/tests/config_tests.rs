use identity_admin::config::{AppConfig, AuditSink, ConfigError, load_config_from};
use std::env;
use std::fs;
use std::path::PathBuf;

fn write_config(name: &str, content: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("identity_admin_{}_{name}.yaml", std::process::id()));
    fs::write(&path, content).expect("Failed to write temp config");
    path
}

#[test]
fn test_load_config_from_file() {
    let path = write_config(
        "full",
        r#"
database_url: "postgres://localhost/identity"
identity:
  user:
    allowed_user_name_characters: ""
  password:
    required_length: 10
    require_non_alphanumeric: false
paging:
  default_page_size: 25
  max_page_size: 200
audit:
  sink: tracing
messages:
  user_exists: "That user name is taken."
"#,
    );

    let app = load_config_from(&path).expect("Failed to load config");
    assert_eq!(app.database_url, "postgres://localhost/identity");
    assert!(app.identity.user.allowed_user_name_characters.is_empty());
    assert_eq!(app.identity.password.required_length, 10);
    assert!(!app.identity.password.require_non_alphanumeric);
    assert!(app.identity.password.require_uppercase);
    assert_eq!(app.paging.default_page_size, 25);
    assert_eq!(app.paging.max_page_size, 200);
    assert_eq!(app.audit.sink, AuditSink::Tracing);
    assert_eq!(
        app.messages.get("user_exists").map(String::as_str),
        Some("That user name is taken.")
    );

    let _ = fs::remove_file(path);
}

#[test]
fn test_config_with_environment_variables() {
    let path = write_config(
        "env",
        r#"
database_url: "sqlite://identity.db?mode=rwc"
"#,
    );

    // Environment variables should override file values
    unsafe {
        env::set_var(
            "IDENTITY_ADMIN__GRANTS_DATABASE_URL",
            "postgres://grants.internal/grants",
        );
    }
    let app = load_config_from(&path).expect("Failed to load config");
    unsafe {
        env::remove_var("IDENTITY_ADMIN__GRANTS_DATABASE_URL");
    }

    assert_eq!(app.database_url, "sqlite://identity.db?mode=rwc");
    assert_eq!(app.grants_database_url(), "postgres://grants.internal/grants");

    let _ = fs::remove_file(path);
}

#[test]
fn test_invalid_paging_is_rejected() {
    let path = write_config(
        "paging",
        r#"
database_url: "sqlite::memory:"
paging:
  default_page_size: 500
  max_page_size: 100
"#,
    );

    let result = load_config_from(&path);
    assert!(matches!(result, Err(ConfigError::Validation(_))));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("paging.default_page_size"));

    let _ = fs::remove_file(path);
}

#[test]
fn test_missing_database_url_fails() {
    let path = write_config("no_db", "paging:\n  default_page_size: 5\n");

    let result = load_config_from(&path);
    assert!(matches!(result, Err(ConfigError::Build(_))));

    let _ = fs::remove_file(path);
}

#[test]
fn test_load_config_missing_file() {
    let path = env::temp_dir().join("identity_admin_does_not_exist.yaml");
    let result = load_config_from(&path);
    assert!(matches!(result, Err(ConfigError::Build(_))));
}

#[test]
fn test_with_database_defaults() {
    let app = AppConfig::with_database("sqlite::memory:");
    assert_eq!(app.grants_database_url(), "sqlite::memory:");
    assert_eq!(app.paging.default_page_size, 10);
    assert_eq!(app.paging.max_page_size, 100);
    assert_eq!(app.audit.sink, AuditSink::Database);
    assert!(app.validate().is_ok());
}
