//! User entity - an administrable account of the identity provider.
//!
//! The password hash and security stamp are produced by the identity-provider
//! runtime; nothing in this crate derives them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_name: String,
    /// Upper-cased `user_name`, unique across the store
    #[sea_orm(unique)]
    pub normalized_user_name: String,
    pub email: Option<String>,
    pub normalized_email: Option<String>,
    pub email_confirmed: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub security_stamp: Option<String>,
    pub concurrency_stamp: Option<String>,
    pub phone_number: Option<String>,
    pub phone_number_confirmed: bool,
    pub two_factor_enabled: bool,
    pub lockout_end: Option<OffsetDateTime>,
    pub lockout_enabled: bool,
    pub access_failed_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_claim::Entity")]
    Claims,
    #[sea_orm(has_many = "super::user_login::Entity")]
    Logins,
    #[sea_orm(has_many = "super::user_token::Entity")]
    Tokens,
    #[sea_orm(has_many = "super::user_role::Entity")]
    UserRoles,
}

impl Related<super::user_claim::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Claims.def()
    }
}

impl Related<super::user_login::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Logins.def()
    }
}

impl Related<super::user_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl Related<super::user_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserRoles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if the account is currently locked out
    pub fn is_locked_out(&self) -> bool {
        self.lockout_enabled
            && self
                .lockout_end
                .is_some_and(|end| end > OffsetDateTime::now_utc())
    }

    /// Check if a password credential has been set by the runtime
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}
