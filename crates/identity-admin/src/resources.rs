//! Message identifiers and the localization seam.
//!
//! Errors are raised by [`MessageId`]; the text shown to an administrator is
//! resolved by a [`ResourceProvider`] at the service boundary.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Stable identifiers for every validation and error message the core raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageId {
    UserDoesNotExist,
    UserExists,
    UserNameRequired,
    UserNameInvalid,
    EmailInvalid,
    RoleDoesNotExist,
    RoleExists,
    RoleNameRequired,
    UserClaimDoesNotExist,
    RoleClaimDoesNotExist,
    ClaimTypeRequired,
    UserRoleExists,
    UserRoleDoesNotExist,
    UserProviderDoesNotExist,
    UserProviderExists,
    UserTokenDoesNotExist,
    PasswordRejected,
    PasswordMismatch,
    PersistedGrantDoesNotExist,
    StoreFailure,
}

impl MessageId {
    pub const ALL: [MessageId; 20] = [
        MessageId::UserDoesNotExist,
        MessageId::UserExists,
        MessageId::UserNameRequired,
        MessageId::UserNameInvalid,
        MessageId::EmailInvalid,
        MessageId::RoleDoesNotExist,
        MessageId::RoleExists,
        MessageId::RoleNameRequired,
        MessageId::UserClaimDoesNotExist,
        MessageId::RoleClaimDoesNotExist,
        MessageId::ClaimTypeRequired,
        MessageId::UserRoleExists,
        MessageId::UserRoleDoesNotExist,
        MessageId::UserProviderDoesNotExist,
        MessageId::UserProviderExists,
        MessageId::UserTokenDoesNotExist,
        MessageId::PasswordRejected,
        MessageId::PasswordMismatch,
        MessageId::PersistedGrantDoesNotExist,
        MessageId::StoreFailure,
    ];

    /// Stable snake_case code, used as the override key in configuration.
    pub fn code(self) -> &'static str {
        match self {
            MessageId::UserDoesNotExist => "user_does_not_exist",
            MessageId::UserExists => "user_exists",
            MessageId::UserNameRequired => "user_name_required",
            MessageId::UserNameInvalid => "user_name_invalid",
            MessageId::EmailInvalid => "email_invalid",
            MessageId::RoleDoesNotExist => "role_does_not_exist",
            MessageId::RoleExists => "role_exists",
            MessageId::RoleNameRequired => "role_name_required",
            MessageId::UserClaimDoesNotExist => "user_claim_does_not_exist",
            MessageId::RoleClaimDoesNotExist => "role_claim_does_not_exist",
            MessageId::ClaimTypeRequired => "claim_type_required",
            MessageId::UserRoleExists => "user_role_exists",
            MessageId::UserRoleDoesNotExist => "user_role_does_not_exist",
            MessageId::UserProviderDoesNotExist => "user_provider_does_not_exist",
            MessageId::UserProviderExists => "user_provider_exists",
            MessageId::UserTokenDoesNotExist => "user_token_does_not_exist",
            MessageId::PasswordRejected => "password_rejected",
            MessageId::PasswordMismatch => "password_mismatch",
            MessageId::PersistedGrantDoesNotExist => "persisted_grant_does_not_exist",
            MessageId::StoreFailure => "store_failure",
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Supplies human-readable text for a message identifier.
pub trait ResourceProvider: Send + Sync {
    fn message(&self, id: MessageId) -> String;
}

/// Built-in English messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResources;

impl ResourceProvider for DefaultResources {
    fn message(&self, id: MessageId) -> String {
        let text = match id {
            MessageId::UserDoesNotExist => "The user does not exist.",
            MessageId::UserExists => "A user with this user name already exists.",
            MessageId::UserNameRequired => "A user name is required.",
            MessageId::UserNameInvalid => "The user name contains characters that are not allowed.",
            MessageId::EmailInvalid => "The email address is not valid.",
            MessageId::RoleDoesNotExist => "The role does not exist.",
            MessageId::RoleExists => "A role with this name already exists.",
            MessageId::RoleNameRequired => "A role name is required.",
            MessageId::UserClaimDoesNotExist => "The user claim does not exist.",
            MessageId::RoleClaimDoesNotExist => "The role claim does not exist.",
            MessageId::ClaimTypeRequired => "A claim type is required.",
            MessageId::UserRoleExists => "The user is already a member of this role.",
            MessageId::UserRoleDoesNotExist => "The user is not a member of this role.",
            MessageId::UserProviderDoesNotExist => "The external login does not exist.",
            MessageId::UserProviderExists => "The external login is already bound to a user.",
            MessageId::UserTokenDoesNotExist => "The user token does not exist.",
            MessageId::PasswordRejected => "The password does not satisfy the password policy.",
            MessageId::PasswordMismatch => "The password and its confirmation do not match.",
            MessageId::PersistedGrantDoesNotExist => "The persisted grant does not exist.",
            MessageId::StoreFailure => "The operation could not be completed. Please try again.",
        };
        text.to_string()
    }
}

/// Messages overridden from configuration, keyed by [`MessageId::code`].
/// Anything not overridden falls back to [`DefaultResources`].
#[derive(Debug, Clone, Default)]
pub struct ConfiguredResources {
    overrides: HashMap<String, String>,
}

impl ConfiguredResources {
    pub fn new(overrides: HashMap<String, String>) -> Self {
        let known: Vec<&str> = MessageId::ALL.iter().map(|id| id.code()).collect();
        for key in overrides.keys() {
            if !known.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Ignoring message override for unknown message id");
            }
        }
        Self { overrides }
    }
}

impl ResourceProvider for ConfiguredResources {
    fn message(&self, id: MessageId) -> String {
        self.overrides
            .get(id.code())
            .cloned()
            .unwrap_or_else(|| DefaultResources.message(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<&str> = MessageId::ALL.iter().map(|id| id.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), MessageId::ALL.len());
    }

    #[test]
    fn test_default_resources_cover_every_id() {
        for id in MessageId::ALL {
            assert!(!DefaultResources.message(id).is_empty(), "{id} has no text");
        }
    }

    #[test]
    fn test_configured_resources_override_and_fallback() {
        let mut overrides = HashMap::new();
        overrides.insert("user_exists".to_string(), "Benutzer existiert bereits.".to_string());
        let resources = ConfiguredResources::new(overrides);

        assert_eq!(
            resources.message(MessageId::UserExists),
            "Benutzer existiert bereits."
        );
        assert_eq!(
            resources.message(MessageId::RoleExists),
            DefaultResources.message(MessageId::RoleExists)
        );
    }

    #[test]
    fn test_message_id_serializes_as_code() {
        let json = serde_json::to_string(&MessageId::PersistedGrantDoesNotExist).unwrap();
        assert_eq!(json, "\"persisted_grant_does_not_exist\"");
    }
}
