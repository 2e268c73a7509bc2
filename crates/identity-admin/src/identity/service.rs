//! Administrative operations on identities.
//!
//! Validates input before the store is touched, maps DTOs to entities,
//! localizes every error and records exactly one audit event for each
//! successful mutation. Failed mutations and reads record nothing.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditEventLogger, AuditEventType};
use crate::config::PagingConfig;
use crate::entity::{role, role_claim, user, user_claim, user_login, user_token};
use crate::error::{AdminError, AdminResult, Localize};
use crate::identity::dto::{
    ClaimSelector, InheritedClaimDto, RoleClaimDto, RoleClaimsDto, RoleDto, RolesDto,
    UserChangePasswordDto, UserClaimDto, UserClaimsDto, UserDto, UserProviderDto, UserRoleDto,
    UserTokenDto, UsersDto,
};
use crate::identity::repository::IdentityRepository;
use crate::paging::{PageRequest, PagedList};
use crate::resources::{MessageId, ResourceProvider};

pub struct IdentityService {
    repository: IdentityRepository,
    resources: Arc<dyn ResourceProvider>,
    audit: Arc<dyn AuditEventLogger>,
    paging: PagingConfig,
}

impl IdentityService {
    pub fn new(
        repository: IdentityRepository,
        resources: Arc<dyn ResourceProvider>,
        audit: Arc<dyn AuditEventLogger>,
        paging: PagingConfig,
    ) -> Self {
        Self {
            repository,
            resources,
            audit,
            paging,
        }
    }

    fn resources(&self) -> &dyn ResourceProvider {
        self.resources.as_ref()
    }

    fn fail<T>(&self, error: AdminError) -> AdminResult<T> {
        Err(error).localize(self.resources())
    }

    fn window(&self, request: PageRequest) -> PageRequest {
        PageRequest::new(request.page, request.page_size, self.paging.max_page_size)
    }

    async fn record(&self, event: AuditEvent) -> AdminResult<()> {
        self.audit
            .log_event(event)
            .await
            .map_err(AdminError::from)
            .localize(self.resources())
    }

    async fn require_user(&self, user_id: &str) -> AdminResult<user::Model> {
        match self.repository.get_user(user_id).await.localize(self.resources())? {
            Some(user) => Ok(user),
            None => self.fail(AdminError::not_found(MessageId::UserDoesNotExist)),
        }
    }

    async fn require_role(&self, role_id: &str) -> AdminResult<role::Model> {
        match self.repository.get_role(role_id).await.localize(self.resources())? {
            Some(role) => Ok(role),
            None => self.fail(AdminError::not_found(MessageId::RoleDoesNotExist)),
        }
    }

    fn check_user(&self, user: &UserDto) -> AdminResult<()> {
        if user.user_name.trim().is_empty() {
            return self.fail(AdminError::validation(
                MessageId::UserNameRequired,
                "user_name",
            ));
        }
        if let Some(email) = user.email.as_deref() {
            if !is_plausible_email(email) {
                return self.fail(AdminError::validation(MessageId::EmailInvalid, "email"));
            }
        }
        Ok(())
    }

    fn check_role(&self, role: &RoleDto) -> AdminResult<()> {
        if role.name.trim().is_empty() {
            return self.fail(AdminError::validation(MessageId::RoleNameRequired, "name"));
        }
        Ok(())
    }

    fn check_claim(&self, claim_type: &str) -> AdminResult<()> {
        if claim_type.trim().is_empty() {
            return self.fail(AdminError::validation(
                MessageId::ClaimTypeRequired,
                "claim_type",
            ));
        }
        Ok(())
    }

    // ---- users -------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_users(&self, search: Option<&str>, page: PageRequest) -> AdminResult<UsersDto> {
        let users = self
            .repository
            .get_users(search, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(users.map(UserDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, user_id: &str) -> AdminResult<UserDto> {
        Ok(self.require_user(user_id).await?.into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists_user(&self, user_id: &str) -> AdminResult<bool> {
        self.repository
            .exists_user(user_id)
            .await
            .localize(self.resources())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role_users(
        &self,
        role_id: &str,
        search: Option<&str>,
        page: PageRequest,
    ) -> AdminResult<UsersDto> {
        self.require_role(role_id).await?;
        let users = self
            .repository
            .get_role_users(role_id, search, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(users.map(UserDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_claim_users(
        &self,
        claim_type: &str,
        claim_value: Option<&str>,
        page: PageRequest,
    ) -> AdminResult<UsersDto> {
        let users = self
            .repository
            .get_claim_users(claim_type, claim_value, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(users.map(UserDto::from))
    }

    /// Create a user, optionally with an initial password, and return it as
    /// stored.
    #[tracing::instrument(skip(self, user, password), fields(user_name = %user.user_name))]
    pub async fn create_user(&self, user: &UserDto, password: Option<&str>) -> AdminResult<UserDto> {
        self.check_user(user)?;
        if self
            .repository
            .find_user_by_name(&user.user_name)
            .await
            .localize(self.resources())?
            .is_some()
        {
            return self.fail(AdminError::validation(MessageId::UserExists, "user_name"));
        }

        let id = self
            .repository
            .create_user(user::Model::from(user), password)
            .await
            .localize(self.resources())?;
        let created = UserDto::from(self.require_user(&id).await?);

        self.record(AuditEvent::new(
            AuditEventType::UserSaved,
            Some(id),
            &created,
        ))
        .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn update_user(&self, user: &UserDto) -> AdminResult<UserDto> {
        self.check_user(user)?;
        let before = UserDto::from(self.require_user(&user.id).await?);
        if let Some(holder) = self
            .repository
            .find_user_by_name(&user.user_name)
            .await
            .localize(self.resources())?
        {
            if holder.id != user.id {
                return self.fail(AdminError::validation(MessageId::UserExists, "user_name"));
            }
        }

        let after = UserDto::from(
            self.repository
                .update_user(user::Model::from(user))
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::changed(
            AuditEventType::UserUpdated,
            Some(after.id.clone()),
            &before,
            &after,
        ))
        .await?;
        Ok(after)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> AdminResult<UserDto> {
        self.require_user(user_id).await?;
        let deleted = UserDto::from(
            self.repository
                .delete_user(user_id)
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserDeleted,
            Some(deleted.id.clone()),
            &deleted,
        ))
        .await?;
        Ok(deleted)
    }

    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn user_change_password(&self, request: &UserChangePasswordDto) -> AdminResult<()> {
        if request.password != request.confirm_password {
            return self.fail(AdminError::validation(
                MessageId::PasswordMismatch,
                "confirm_password",
            ));
        }
        self.require_user(&request.user_id).await?;
        let updated = self
            .repository
            .user_change_password(&request.user_id, &request.password)
            .await
            .localize(self.resources())?;

        self.record(AuditEvent::new(
            AuditEventType::UserPasswordChanged,
            Some(updated.id.clone()),
            json!({ "user_id": updated.id, "user_name": updated.user_name }),
        ))
        .await
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn verify_user_password(&self, user_id: &str, password: &str) -> AdminResult<bool> {
        self.repository
            .verify_user_password(user_id, password)
            .await
            .localize(self.resources())
    }

    // ---- roles -------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_roles(&self, search: Option<&str>, page: PageRequest) -> AdminResult<RolesDto> {
        let roles = self
            .repository
            .get_roles(search, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(roles.map(RoleDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role(&self, role_id: &str) -> AdminResult<RoleDto> {
        Ok(self.require_role(role_id).await?.into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists_role(&self, role_id: &str) -> AdminResult<bool> {
        self.repository
            .exists_role(role_id)
            .await
            .localize(self.resources())
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_role_by_name(&self, name: &str) -> AdminResult<Option<RoleDto>> {
        Ok(self
            .repository
            .find_role_by_name(name)
            .await
            .localize(self.resources())?
            .map(RoleDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_name(&self, user_name: &str) -> AdminResult<Option<UserDto>> {
        Ok(self
            .repository
            .find_user_by_name(user_name)
            .await
            .localize(self.resources())?
            .map(UserDto::from))
    }

    #[tracing::instrument(skip(self, role), fields(name = %role.name))]
    pub async fn create_role(&self, role: &RoleDto) -> AdminResult<RoleDto> {
        self.check_role(role)?;
        if self
            .repository
            .find_role_by_name(&role.name)
            .await
            .localize(self.resources())?
            .is_some()
        {
            return self.fail(AdminError::validation(MessageId::RoleExists, "name"));
        }

        let id = self
            .repository
            .create_role(role::Model::from(role))
            .await
            .localize(self.resources())?;
        let created = RoleDto::from(self.require_role(&id).await?);

        self.record(AuditEvent::new(
            AuditEventType::RoleAdded,
            Some(id),
            &created,
        ))
        .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn update_role(&self, role: &RoleDto) -> AdminResult<RoleDto> {
        self.check_role(role)?;
        let before = RoleDto::from(self.require_role(&role.id).await?);
        if let Some(holder) = self
            .repository
            .find_role_by_name(&role.name)
            .await
            .localize(self.resources())?
        {
            if holder.id != role.id {
                return self.fail(AdminError::validation(MessageId::RoleExists, "name"));
            }
        }

        let after = RoleDto::from(
            self.repository
                .update_role(role::Model::from(role))
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::changed(
            AuditEventType::RoleUpdated,
            Some(after.id.clone()),
            &before,
            &after,
        ))
        .await?;
        Ok(after)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, role_id: &str) -> AdminResult<RoleDto> {
        self.require_role(role_id).await?;
        let deleted = RoleDto::from(
            self.repository
                .delete_role(role_id)
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::RoleDeleted,
            Some(deleted.id.clone()),
            &deleted,
        ))
        .await?;
        Ok(deleted)
    }

    // ---- memberships -------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_roles(&self, user_id: &str, page: PageRequest) -> AdminResult<RolesDto> {
        self.require_user(user_id).await?;
        let roles = self
            .repository
            .get_user_roles(user_id, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(roles.map(RoleDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_user_role(&self, user_id: &str, role_id: &str) -> AdminResult<UserRoleDto> {
        let membership = UserRoleDto::from(
            self.repository
                .create_user_role(user_id, role_id)
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserRoleSaved,
            Some(membership.user_id.clone()),
            &membership,
        ))
        .await?;
        Ok(membership)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user_role(&self, user_id: &str, role_id: &str) -> AdminResult<UserRoleDto> {
        let membership = UserRoleDto::from(
            self.repository
                .delete_user_role(user_id, role_id)
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserRoleDeleted,
            Some(membership.user_id.clone()),
            &membership,
        ))
        .await?;
        Ok(membership)
    }

    // ---- user claims -------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_claims(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> AdminResult<UserClaimsDto> {
        self.require_user(user_id).await?;
        let claims = self
            .repository
            .get_user_claims(user_id, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(claims.map(UserClaimDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_claim(&self, user_id: &str, claim_id: i32) -> AdminResult<UserClaimDto> {
        match self
            .repository
            .get_user_claim(user_id, claim_id)
            .await
            .localize(self.resources())?
        {
            Some(claim) => Ok(claim.into()),
            None => self.fail(AdminError::not_found(MessageId::UserClaimDoesNotExist)),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_role_claims(
        &self,
        user_id: &str,
        claim_search: Option<&str>,
        page: PageRequest,
    ) -> AdminResult<PagedList<InheritedClaimDto>> {
        self.require_user(user_id).await?;
        let claims = self
            .repository
            .get_user_role_claims(user_id, claim_search, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(claims.map(InheritedClaimDto::from))
    }

    #[tracing::instrument(skip(self, claim), fields(user_id = %claim.user_id))]
    pub async fn create_user_claim(&self, claim: &UserClaimDto) -> AdminResult<UserClaimDto> {
        self.check_claim(&claim.claim_type)?;
        let created = UserClaimDto::from(
            self.repository
                .create_user_claim(user_claim::Model::from(claim))
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserClaimsSaved,
            Some(created.user_id.clone()),
            &created,
        ))
        .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self, claim), fields(user_id = %claim.user_id, claim_id = claim.id))]
    pub async fn update_user_claim(&self, claim: &UserClaimDto) -> AdminResult<UserClaimDto> {
        self.check_claim(&claim.claim_type)?;
        let (before, after) = self
            .repository
            .update_user_claim(user_claim::Model::from(claim))
            .await
            .localize(self.resources())?;
        let after = UserClaimDto::from(after);

        self.record(AuditEvent::changed(
            AuditEventType::UserClaimsUpdated,
            Some(after.user_id.clone()),
            UserClaimDto::from(before),
            &after,
        ))
        .await?;
        Ok(after)
    }

    /// Remove the selected claim and every other claim of the user with the
    /// same type and value.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user_claim(
        &self,
        user_id: &str,
        selector: ClaimSelector,
    ) -> AdminResult<Vec<UserClaimDto>> {
        let removed: Vec<UserClaimDto> = self
            .repository
            .delete_user_claim(user_id, selector)
            .await
            .localize(self.resources())?
            .into_iter()
            .map(UserClaimDto::from)
            .collect();

        self.record(AuditEvent::new(
            AuditEventType::UserClaimsDeleted,
            Some(user_id.to_owned()),
            &removed,
        ))
        .await?;
        Ok(removed)
    }

    // ---- role claims -------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_role_claims(
        &self,
        role_id: &str,
        page: PageRequest,
    ) -> AdminResult<RoleClaimsDto> {
        self.require_role(role_id).await?;
        let claims = self
            .repository
            .get_role_claims(role_id, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(claims.map(RoleClaimDto::from))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role_claim(&self, role_id: &str, claim_id: i32) -> AdminResult<RoleClaimDto> {
        match self
            .repository
            .get_role_claim(role_id, claim_id)
            .await
            .localize(self.resources())?
        {
            Some(claim) => Ok(claim.into()),
            None => self.fail(AdminError::not_found(MessageId::RoleClaimDoesNotExist)),
        }
    }

    #[tracing::instrument(skip(self, claim), fields(role_id = %claim.role_id))]
    pub async fn create_role_claim(&self, claim: &RoleClaimDto) -> AdminResult<RoleClaimDto> {
        self.check_claim(&claim.claim_type)?;
        let created = RoleClaimDto::from(
            self.repository
                .create_role_claim(role_claim::Model::from(claim))
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::RoleClaimsSaved,
            Some(created.role_id.clone()),
            &created,
        ))
        .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self, claim), fields(role_id = %claim.role_id, claim_id = claim.id))]
    pub async fn update_role_claim(&self, claim: &RoleClaimDto) -> AdminResult<RoleClaimDto> {
        self.check_claim(&claim.claim_type)?;
        let (before, after) = self
            .repository
            .update_role_claim(role_claim::Model::from(claim))
            .await
            .localize(self.resources())?;
        let after = RoleClaimDto::from(after);

        self.record(AuditEvent::changed(
            AuditEventType::RoleClaimsUpdated,
            Some(after.role_id.clone()),
            RoleClaimDto::from(before),
            &after,
        ))
        .await?;
        Ok(after)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_role_claim(
        &self,
        role_id: &str,
        selector: ClaimSelector,
    ) -> AdminResult<Vec<RoleClaimDto>> {
        let removed: Vec<RoleClaimDto> = self
            .repository
            .delete_role_claim(role_id, selector)
            .await
            .localize(self.resources())?
            .into_iter()
            .map(RoleClaimDto::from)
            .collect();

        self.record(AuditEvent::new(
            AuditEventType::RoleClaimsDeleted,
            Some(role_id.to_owned()),
            &removed,
        ))
        .await?;
        Ok(removed)
    }

    // ---- external logins ---------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_providers(&self, user_id: &str) -> AdminResult<Vec<UserProviderDto>> {
        self.require_user(user_id).await?;
        Ok(self
            .repository
            .get_user_providers(user_id)
            .await
            .localize(self.resources())?
            .into_iter()
            .map(UserProviderDto::from)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_provider(
        &self,
        user_id: &str,
        login_provider: &str,
        provider_key: &str,
    ) -> AdminResult<UserProviderDto> {
        match self
            .repository
            .get_user_provider(user_id, login_provider, provider_key)
            .await
            .localize(self.resources())?
        {
            Some(login) => Ok(login.into()),
            None => self.fail(AdminError::not_found(MessageId::UserProviderDoesNotExist)),
        }
    }

    #[tracing::instrument(skip(self, login), fields(user_id = %login.user_id, provider = %login.login_provider))]
    pub async fn create_user_login(&self, login: &UserProviderDto) -> AdminResult<UserProviderDto> {
        let created = UserProviderDto::from(
            self.repository
                .create_user_login(user_login::Model::from(login))
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserProviderSaved,
            Some(created.user_id.clone()),
            &created,
        ))
        .await?;
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user_login(
        &self,
        user_id: &str,
        login_provider: &str,
        provider_key: &str,
    ) -> AdminResult<UserProviderDto> {
        let removed = UserProviderDto::from(
            self.repository
                .delete_user_login(user_id, login_provider, provider_key)
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserProvidersDeleted,
            Some(removed.user_id.clone()),
            &removed,
        ))
        .await?;
        Ok(removed)
    }

    // ---- provider tokens ---------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_tokens(&self, user_id: &str) -> AdminResult<Vec<UserTokenDto>> {
        self.require_user(user_id).await?;
        Ok(self
            .repository
            .get_user_tokens(user_id)
            .await
            .localize(self.resources())?
            .into_iter()
            .map(UserTokenDto::from)
            .collect())
    }

    #[tracing::instrument(skip(self, token), fields(user_id = %token.user_id, provider = %token.login_provider, name = %token.name))]
    pub async fn set_user_token(&self, token: &UserTokenDto) -> AdminResult<UserTokenDto> {
        let stored = UserTokenDto::from(
            self.repository
                .set_user_token(user_token::Model::from(token))
                .await
                .localize(self.resources())?,
        );

        // UserTokenDto never serializes its value.
        self.record(AuditEvent::new(
            AuditEventType::UserTokenSaved,
            Some(stored.user_id.clone()),
            &stored,
        ))
        .await?;
        Ok(stored)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user_token(
        &self,
        user_id: &str,
        login_provider: &str,
        name: &str,
    ) -> AdminResult<UserTokenDto> {
        let removed = UserTokenDto::from(
            self.repository
                .delete_user_token(user_id, login_provider, name)
                .await
                .localize(self.resources())?,
        );

        self.record(AuditEvent::new(
            AuditEventType::UserTokenDeleted,
            Some(removed.user_id.clone()),
            &removed,
        ))
        .await?;
        Ok(removed)
    }
}

/// Local part, an `@`, and a domain containing a dot.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
}
