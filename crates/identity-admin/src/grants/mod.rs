//! Persisted grants: authorization codes, refresh and reference tokens,
//! consents and device codes recorded by the identity-provider runtime.

pub mod dto;
pub mod repository;
pub mod service;

pub use repository::PersistedGrantRepository;
pub use service::PersistedGrantService;
