//! Persisted grant entity - authorization codes, refresh tokens, consents,
//! device codes... as recorded by the identity-provider runtime.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Grant type tags written by the runtime.
pub mod grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const REFERENCE_TOKEN: &str = "reference_token";
    pub const USER_CONSENT: &str = "user_consent";
    pub const DEVICE_CODE: &str = "device_code";
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "persisted_grants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub grant_type: String,
    /// Not validated against `users.id`; the stores may be separate.
    pub subject_id: Option<String>,
    pub session_id: Option<String>,
    pub client_id: String,
    pub description: Option<String>,
    pub creation_time: OffsetDateTime,
    pub expiration: Option<OffsetDateTime>,
    pub consumed_time: Option<OffsetDateTime>,
    /// Serialized grant payload, opaque to this crate
    #[sea_orm(column_type = "Text")]
    pub data: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if the grant has expired
    pub fn is_expired(&self) -> bool {
        self.expiration
            .is_some_and(|expires_at| expires_at < OffsetDateTime::now_utc())
    }

    /// Check if the grant has already been consumed
    pub fn is_consumed(&self) -> bool {
        self.consumed_time.is_some()
    }
}
