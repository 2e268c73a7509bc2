//! sea-orm entities for the identity store and the persisted grant store.

pub mod audit_log;
pub mod persisted_grant;
pub mod role;
pub mod role_claim;
pub mod user;
pub mod user_claim;
pub mod user_login;
pub mod user_role;
pub mod user_token;
