//! The identity-provider runtime seam.
//!
//! The runtime is authoritative for user-name rules, password policy and
//! password hashing. Repositories call it and store what it returns; they
//! never hash anything themselves. [`Argon2Runtime`] is the built-in runtime,
//! hashing with Argon2id.

use std::collections::HashSet;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

use crate::config::{IdentityOptions, PasswordOptions, UserOptions};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("User name '{0}' is empty or contains disallowed characters")]
    InvalidUserName(String),
    #[error("Password must be at least {0} characters long")]
    PasswordTooShort(usize),
    #[error("Password must contain at least {0} unique characters")]
    PasswordRequiresUniqueChars(usize),
    #[error("Password must contain a digit")]
    PasswordRequiresDigit,
    #[error("Password must contain a lowercase letter")]
    PasswordRequiresLower,
    #[error("Password must contain an uppercase letter")]
    PasswordRequiresUpper,
    #[error("Password must contain a non-alphanumeric character")]
    PasswordRequiresNonAlphanumeric,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl CredentialError {
    /// Stable reason code propagated with provider errors.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CredentialError::InvalidUserName(_) => "invalid_user_name",
            CredentialError::PasswordTooShort(_) => "password_too_short",
            CredentialError::PasswordRequiresUniqueChars(_) => "password_requires_unique_chars",
            CredentialError::PasswordRequiresDigit => "password_requires_digit",
            CredentialError::PasswordRequiresLower => "password_requires_lower",
            CredentialError::PasswordRequiresUpper => "password_requires_upper",
            CredentialError::PasswordRequiresNonAlphanumeric => {
                "password_requires_non_alphanumeric"
            }
            CredentialError::Hashing(_) => "hashing_failed",
        }
    }
}

/// What the runtime hands back for a newly set password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub password_hash: String,
    /// Rotated whenever credentials change so outstanding sessions can be invalidated
    pub security_stamp: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("password_hash", &"<redacted>")
            .field("security_stamp", &self.security_stamp)
            .finish()
    }
}

/// Credential operations owned by the identity-provider runtime.
///
/// Implementations must be safe to call concurrently.
pub trait IdentityRuntime: Send + Sync {
    fn validate_user_name(&self, user_name: &str) -> Result<(), CredentialError>;

    /// Validate `password` for `user_name` and produce a credential to store.
    fn create_credential(
        &self,
        user_name: &str,
        password: &str,
    ) -> Result<Credential, CredentialError>;

    /// Replace an existing password. Same rules as [`Self::create_credential`].
    fn set_password(&self, user_name: &str, password: &str) -> Result<Credential, CredentialError> {
        self.create_credential(user_name, password)
    }

    fn verify_credential(&self, password_hash: &str, password: &str) -> bool;

    /// A fresh stamp for non-credential security changes.
    fn new_security_stamp(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string().to_uppercase()
    }
}

/// Built-in runtime enforcing [`IdentityOptions`] and hashing with Argon2id.
#[derive(Debug, Clone, Default)]
pub struct Argon2Runtime {
    user: UserOptions,
    password: PasswordOptions,
}

impl Argon2Runtime {
    pub fn new(options: IdentityOptions) -> Self {
        Self {
            user: options.user,
            password: options.password,
        }
    }

    fn validate_password(&self, password: &str) -> Result<(), CredentialError> {
        let policy = &self.password;
        if password.chars().count() < policy.required_length {
            return Err(CredentialError::PasswordTooShort(policy.required_length));
        }
        if policy.require_non_alphanumeric && password.chars().all(char::is_alphanumeric) {
            return Err(CredentialError::PasswordRequiresNonAlphanumeric);
        }
        if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(CredentialError::PasswordRequiresDigit);
        }
        if policy.require_lowercase && !password.chars().any(char::is_lowercase) {
            return Err(CredentialError::PasswordRequiresLower);
        }
        if policy.require_uppercase && !password.chars().any(char::is_uppercase) {
            return Err(CredentialError::PasswordRequiresUpper);
        }
        let unique: HashSet<char> = password.chars().collect();
        if unique.len() < policy.required_unique_chars {
            return Err(CredentialError::PasswordRequiresUniqueChars(
                policy.required_unique_chars,
            ));
        }
        Ok(())
    }
}

impl IdentityRuntime for Argon2Runtime {
    fn validate_user_name(&self, user_name: &str) -> Result<(), CredentialError> {
        let allowed = &self.user.allowed_user_name_characters;
        let valid = !user_name.trim().is_empty()
            && (allowed.is_empty() || user_name.chars().all(|c| allowed.contains(c)));
        if valid {
            Ok(())
        } else {
            Err(CredentialError::InvalidUserName(user_name.to_string()))
        }
    }

    fn create_credential(
        &self,
        _user_name: &str,
        password: &str,
    ) -> Result<Credential, CredentialError> {
        self.validate_password(password)?;
        let password_hash =
            hash_password(password).map_err(|e| CredentialError::Hashing(e.to_string()))?;
        Ok(Credential {
            password_hash,
            security_stamp: self.new_security_stamp(),
        })
    }

    fn verify_credential(&self, password_hash: &str, password: &str) -> bool {
        verify_password(password, password_hash)
    }
}

/// Hash a password using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash. Malformed hashes never match.
fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Argon2Runtime {
        Argon2Runtime::new(IdentityOptions::default())
    }

    #[test]
    fn test_create_and_verify_credential() {
        let runtime = runtime();
        let credential = runtime
            .create_credential("alice", "Pa$$w0rd")
            .expect("policy-compliant password");

        // Hash should be PHC format starting with $argon2
        assert!(credential.password_hash.starts_with("$argon2"));
        assert!(runtime.verify_credential(&credential.password_hash, "Pa$$w0rd"));
        assert!(!runtime.verify_credential(&credential.password_hash, "wrong-password"));
    }

    #[test]
    fn test_same_password_gets_different_salts_and_stamps() {
        let runtime = runtime();
        let first = runtime.create_credential("alice", "Pa$$w0rd").unwrap();
        let second = runtime.set_password("alice", "Pa$$w0rd").unwrap();

        assert_ne!(first.password_hash, second.password_hash);
        assert_ne!(first.security_stamp, second.security_stamp);
        assert!(runtime.verify_credential(&second.password_hash, "Pa$$w0rd"));
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        let runtime = runtime();
        assert!(!runtime.verify_credential("not-a-valid-hash", "password"));
        assert!(!runtime.verify_credential("", "password"));
        assert!(!runtime.verify_credential("$invalid$hash$format", "password"));
    }

    #[test]
    fn test_password_policy_violations() {
        let runtime = runtime();
        let cases = [
            ("Ab1!", CredentialError::PasswordTooShort(6)),
            ("Abcdef1", CredentialError::PasswordRequiresNonAlphanumeric),
            ("Abcdef!", CredentialError::PasswordRequiresDigit),
            ("ABCDEF1!", CredentialError::PasswordRequiresLower),
            ("abcdef1!", CredentialError::PasswordRequiresUpper),
        ];
        for (password, expected) in cases {
            assert_eq!(
                runtime.create_credential("alice", password).unwrap_err(),
                expected,
                "password {password:?}"
            );
        }
    }

    #[test]
    fn test_unique_chars_policy() {
        let runtime = Argon2Runtime::new(IdentityOptions {
            password: PasswordOptions {
                required_length: 4,
                required_unique_chars: 4,
                require_digit: false,
                require_lowercase: false,
                require_uppercase: false,
                require_non_alphanumeric: false,
            },
            ..Default::default()
        });
        assert_eq!(
            runtime.create_credential("alice", "aaaaaa").unwrap_err(),
            CredentialError::PasswordRequiresUniqueChars(4)
        );
        assert!(runtime.create_credential("alice", "abcd").is_ok());
    }

    #[test]
    fn test_user_name_rules() {
        let runtime = runtime();
        assert!(runtime.validate_user_name("alice.smith@example.com").is_ok());
        assert!(runtime.validate_user_name("").is_err());
        assert!(runtime.validate_user_name("   ").is_err());
        assert_eq!(
            runtime.validate_user_name("alice smith").unwrap_err().reason_code(),
            "invalid_user_name"
        );

        let permissive = Argon2Runtime::new(IdentityOptions {
            user: UserOptions {
                allowed_user_name_characters: String::new(),
            },
            ..Default::default()
        });
        assert!(permissive.validate_user_name("alice smith").is_ok());
    }

    #[test]
    fn test_credential_debug_redacts_hash() {
        let credential = runtime().create_credential("alice", "Pa$$w0rd").unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("$argon2"));
    }
}
