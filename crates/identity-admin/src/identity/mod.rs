//! Users, roles, claims, memberships, external logins and provider tokens.

pub mod credentials;
pub mod dto;
pub mod repository;
pub mod service;

pub use credentials::{Argon2Runtime, Credential, CredentialError, IdentityRuntime};
pub use repository::IdentityRepository;
pub use service::IdentityService;
