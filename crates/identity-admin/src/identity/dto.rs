//! Caller-facing shapes of the identity entities and their entity mapping.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::{role, role_claim, user, user_claim, user_login, user_role, user_token};
use crate::paging::PagedList;

/// A user as shown to and edited by an administrator.
///
/// `id` is empty on create; the repository generates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    #[serde(default)]
    pub id: String,
    pub user_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed: bool,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub phone_number_confirmed: bool,
    #[serde(default)]
    pub two_factor_enabled: bool,
    #[serde(default)]
    pub lockout_enabled: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub lockout_end: Option<OffsetDateTime>,
    #[serde(default)]
    pub access_failed_count: i32,
}

impl From<user::Model> for UserDto {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            user_name: model.user_name,
            email: model.email,
            email_confirmed: model.email_confirmed,
            phone_number: model.phone_number,
            phone_number_confirmed: model.phone_number_confirmed,
            two_factor_enabled: model.two_factor_enabled,
            lockout_enabled: model.lockout_enabled,
            lockout_end: model.lockout_end,
            access_failed_count: model.access_failed_count,
        }
    }
}

impl From<&UserDto> for user::Model {
    /// Normalized columns and credentials are left blank for the repository.
    fn from(dto: &UserDto) -> Self {
        Self {
            id: dto.id.clone(),
            user_name: dto.user_name.clone(),
            normalized_user_name: String::new(),
            email: dto.email.clone(),
            normalized_email: None,
            email_confirmed: dto.email_confirmed,
            password_hash: None,
            security_stamp: None,
            concurrency_stamp: None,
            phone_number: dto.phone_number.clone(),
            phone_number_confirmed: dto.phone_number_confirmed,
            two_factor_enabled: dto.two_factor_enabled,
            lockout_end: dto.lockout_end,
            lockout_enabled: dto.lockout_enabled,
            access_failed_count: dto.access_failed_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDto {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

impl From<role::Model> for RoleDto {
    fn from(model: role::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

impl From<&RoleDto> for role::Model {
    fn from(dto: &RoleDto) -> Self {
        Self {
            id: dto.id.clone(),
            name: dto.name.clone(),
            normalized_name: String::new(),
            concurrency_stamp: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaimDto {
    /// Zero until the claim is stored
    #[serde(default)]
    pub id: i32,
    pub user_id: String,
    pub claim_type: String,
    pub claim_value: String,
}

impl From<user_claim::Model> for UserClaimDto {
    fn from(model: user_claim::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            claim_type: model.claim_type,
            claim_value: model.claim_value,
        }
    }
}

impl From<&UserClaimDto> for user_claim::Model {
    fn from(dto: &UserClaimDto) -> Self {
        Self {
            id: dto.id,
            user_id: dto.user_id.clone(),
            claim_type: dto.claim_type.clone(),
            claim_value: dto.claim_value.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleClaimDto {
    #[serde(default)]
    pub id: i32,
    pub role_id: String,
    pub claim_type: String,
    pub claim_value: String,
}

impl From<role_claim::Model> for RoleClaimDto {
    fn from(model: role_claim::Model) -> Self {
        Self {
            id: model.id,
            role_id: model.role_id,
            claim_type: model.claim_type,
            claim_value: model.claim_value,
        }
    }
}

impl From<&RoleClaimDto> for role_claim::Model {
    fn from(dto: &RoleClaimDto) -> Self {
        Self {
            id: dto.id,
            role_id: dto.role_id.clone(),
            claim_type: dto.claim_type.clone(),
            claim_value: dto.claim_value.clone(),
        }
    }
}

/// A role claim a user holds through one of their roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedClaimDto {
    pub claim_id: i32,
    pub role_id: String,
    pub role_name: String,
    pub claim_type: String,
    pub claim_value: String,
}

impl From<(role_claim::Model, role::Model)> for InheritedClaimDto {
    fn from((claim, role): (role_claim::Model, role::Model)) -> Self {
        Self {
            claim_id: claim.id,
            role_id: role.id,
            role_name: role.name,
            claim_type: claim.claim_type,
            claim_value: claim.claim_value,
        }
    }
}

/// An external login bound to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProviderDto {
    pub user_id: String,
    pub login_provider: String,
    pub provider_key: String,
    #[serde(default)]
    pub provider_display_name: Option<String>,
}

impl From<user_login::Model> for UserProviderDto {
    fn from(model: user_login::Model) -> Self {
        Self {
            user_id: model.user_id,
            login_provider: model.login_provider,
            provider_key: model.provider_key,
            provider_display_name: model.provider_display_name,
        }
    }
}

impl From<&UserProviderDto> for user_login::Model {
    fn from(dto: &UserProviderDto) -> Self {
        Self {
            login_provider: dto.login_provider.clone(),
            provider_key: dto.provider_key.clone(),
            provider_display_name: dto.provider_display_name.clone(),
            user_id: dto.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleDto {
    pub user_id: String,
    pub role_id: String,
}

impl From<user_role::Model> for UserRoleDto {
    fn from(model: user_role::Model) -> Self {
        Self {
            user_id: model.user_id,
            role_id: model.role_id,
        }
    }
}

/// Provider token of a user. The value never leaves the process serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenDto {
    pub user_id: String,
    pub login_provider: String,
    pub name: String,
    #[serde(default, skip_serializing)]
    pub value: Option<String>,
}

impl From<user_token::Model> for UserTokenDto {
    fn from(model: user_token::Model) -> Self {
        Self {
            user_id: model.user_id,
            login_provider: model.login_provider,
            name: model.name,
            value: model.value,
        }
    }
}

impl From<&UserTokenDto> for user_token::Model {
    fn from(dto: &UserTokenDto) -> Self {
        Self {
            user_id: dto.user_id.clone(),
            login_provider: dto.login_provider.clone(),
            name: dto.name.clone(),
            value: dto.value.clone(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct UserChangePasswordDto {
    pub user_id: String,
    pub password: String,
    pub confirm_password: String,
}

impl std::fmt::Debug for UserChangePasswordDto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserChangePasswordDto")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// How a claim to delete is identified.
///
/// An id is resolved to its (type, value) pair first, and every claim of the
/// owner with that pair is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSelector {
    Id(i32),
    Pair {
        claim_type: String,
        claim_value: String,
    },
}

pub type UsersDto = PagedList<UserDto>;
pub type RolesDto = PagedList<RoleDto>;
pub type UserClaimsDto = PagedList<UserClaimDto>;
pub type RoleClaimsDto = PagedList<RoleClaimDto>;
