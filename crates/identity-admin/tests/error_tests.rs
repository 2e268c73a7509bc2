use identity_admin::error::{AdminError, ErrorKind};
use identity_admin::identity::CredentialError;
use identity_admin::resources::{DefaultResources, MessageId, ResourceProvider};
use sea_orm::DbErr;

#[test]
fn test_error_kinds_and_display() {
    let not_found = AdminError::not_found(MessageId::UserDoesNotExist);
    assert_eq!(not_found.kind(), ErrorKind::NotFound);
    assert_eq!(not_found.to_string(), "Not found: user_does_not_exist");

    let validation = AdminError::validation(MessageId::UserExists, "user_name");
    assert_eq!(validation.kind(), ErrorKind::Validation);
    assert_eq!(
        validation.to_string(),
        "Validation failed: user_exists (field: user_name)"
    );

    let conflict = AdminError::conflict(MessageId::UserRoleExists);
    assert_eq!(conflict.kind(), ErrorKind::Conflict);
    assert!(format!("{:?}", conflict).contains("Conflict"));
}

#[test]
fn test_localized_errors_carry_resource_text() {
    let error = AdminError::validation(MessageId::RoleExists, "name").localized(&DefaultResources);
    let expected = DefaultResources.message(MessageId::RoleExists);
    assert_eq!(error.detail().message.as_deref(), Some(expected.as_str()));
    assert_eq!(
        error.to_string(),
        format!("Validation failed: {expected} (field: name)")
    );
}

#[test]
fn test_provider_error_mapping() {
    let password = AdminError::provider(&CredentialError::PasswordRequiresDigit, "password");
    assert_eq!(password.kind(), ErrorKind::Provider);
    assert_eq!(password.message_id(), MessageId::PasswordRejected);
    assert_eq!(
        password.detail().reason.as_deref(),
        Some("password_requires_digit")
    );

    let user_name = AdminError::provider(
        &CredentialError::InvalidUserName("bad name".into()),
        "user_name",
    );
    assert_eq!(user_name.message_id(), MessageId::UserNameInvalid);
    assert_eq!(user_name.detail().field, Some("user_name"));
    assert_eq!(user_name.detail().reason.as_deref(), Some("invalid_user_name"));
}

#[test]
fn test_store_errors_hide_internals_from_the_view() {
    let error: AdminError =
        DbErr::Custom("UNIQUE constraint failed: users.secret_column".into()).into();
    assert_eq!(error.kind(), ErrorKind::Store);
    assert_eq!(error.message_id(), MessageId::StoreFailure);
    assert!(std::error::Error::source(&error).is_some());

    let view = error.localized(&DefaultResources).view();
    assert_eq!(view.kind, ErrorKind::Store);
    assert_eq!(view.message, DefaultResources.message(MessageId::StoreFailure));
    let rendered = serde_json::to_string(&view).unwrap();
    assert!(!rendered.contains("secret_column"));
    assert!(rendered.contains("\"kind\":\"store\""));
    assert!(rendered.contains("\"code\":\"store_failure\""));
}

#[test]
fn test_view_without_localization_falls_back_to_code() {
    let view = AdminError::not_found(MessageId::PersistedGrantDoesNotExist).view();
    assert_eq!(view.message, "persisted_grant_does_not_exist");
    assert_eq!(view.field, None);
    assert_eq!(view.reason, None);

    let rendered = serde_json::to_value(&view).unwrap();
    assert!(rendered.get("field").is_none());
    assert_eq!(rendered["kind"], "not_found");
}
