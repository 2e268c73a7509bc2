//! Store access for users, roles, claims, memberships, logins and tokens.
//!
//! The repository enforces entity-level invariants (unique normalized names,
//! referential checks, cascades) and raises errors by [`MessageId`] only.
//! Everything that touches more than one table runs in one transaction; a
//! dropped future drops the transaction, which rolls it back.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, Condition,
    ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, SqlErr, TransactionTrait,
    sea_query::{BinOper, Expr, Func, LikeExpr, Query, SimpleExpr},
};

use crate::entity::{role, role_claim, user, user_claim, user_login, user_role, user_token};
use crate::error::{AdminError, AdminResult};
use crate::identity::credentials::IdentityRuntime;
use crate::identity::dto::ClaimSelector;
use crate::paging::{PageRequest, PagedList};
use crate::resources::MessageId;

/// Upper-case lookup key for user names, role names and emails.
///
/// Characters whose upper case expands to several (`ß`) are kept as they
/// are, so normalization never changes the character count.
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) => u,
                _ => c,
            }
        })
        .collect()
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards in the needle
/// taken literally.
fn contains_pattern(needle: &str) -> LikeExpr {
    LikeExpr::new(escaped_contains(needle)).escape(LIKE_ESCAPE)
}

fn escaped_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const LIKE_ESCAPE: char = '\\';

pub struct IdentityRepository {
    db: Arc<DatabaseConnection>,
    runtime: Arc<dyn IdentityRuntime>,
}

impl IdentityRepository {
    pub fn new(db: Arc<DatabaseConnection>, runtime: Arc<dyn IdentityRuntime>) -> Self {
        Self { db, runtime }
    }

    fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    // ---- users -------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn exists_user(&self, user_id: &str) -> AdminResult<bool> {
        let count = user::Entity::find()
            .filter(user::Column::Id.eq(user_id))
            .count(self.db())
            .await?;
        Ok(count > 0)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, user_id: &str) -> AdminResult<Option<user::Model>> {
        Ok(user::Entity::find_by_id(user_id.to_owned())
            .one(self.db())
            .await?)
    }

    /// Look a user up by name, ignoring case.
    #[tracing::instrument(skip(self))]
    pub async fn find_user_by_name(&self, user_name: &str) -> AdminResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::NormalizedUserName.eq(normalize(user_name)))
            .one(self.db())
            .await?)
    }

    /// Users whose name or email contains `search` (any case), by name.
    #[tracing::instrument(skip(self))]
    pub async fn get_users(
        &self,
        search: Option<&str>,
        window: PageRequest,
    ) -> AdminResult<PagedList<user::Model>> {
        let query = user_search(user::Entity::find(), search);
        Ok(fetch_page(self.db(), query, window).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role_users(
        &self,
        role_id: &str,
        search: Option<&str>,
        window: PageRequest,
    ) -> AdminResult<PagedList<user::Model>> {
        let members = Query::select()
            .column(user_role::Column::UserId)
            .from(user_role::Entity)
            .and_where(user_role::Column::RoleId.eq(role_id))
            .to_owned();
        let query = user_search(
            user::Entity::find().filter(user::Column::Id.in_subquery(members)),
            search,
        );
        Ok(fetch_page(self.db(), query, window).await?)
    }

    /// Users holding a claim of `claim_type` (and `claim_value`, when given).
    #[tracing::instrument(skip(self))]
    pub async fn get_claim_users(
        &self,
        claim_type: &str,
        claim_value: Option<&str>,
        window: PageRequest,
    ) -> AdminResult<PagedList<user::Model>> {
        let mut holders = Query::select();
        holders
            .column(user_claim::Column::UserId)
            .from(user_claim::Entity)
            .and_where(user_claim::Column::ClaimType.eq(claim_type));
        if let Some(value) = claim_value {
            holders.and_where(user_claim::Column::ClaimValue.eq(value));
        }
        let query = user_search(
            user::Entity::find().filter(user::Column::Id.in_subquery(holders.to_owned())),
            None,
        );
        Ok(fetch_page(self.db(), query, window).await?)
    }

    /// Insert a user and return its generated id.
    ///
    /// The runtime validates the user name and, when a password is given,
    /// produces the stored credential.
    #[tracing::instrument(skip(self, user, password), fields(user_name = %user.user_name))]
    pub async fn create_user(
        &self,
        user: user::Model,
        password: Option<&str>,
    ) -> AdminResult<String> {
        self.runtime
            .validate_user_name(&user.user_name)
            .map_err(|e| AdminError::provider(&e, "user_name"))?;
        let credential = password
            .map(|password| self.runtime.create_credential(&user.user_name, password))
            .transpose()
            .map_err(|e| AdminError::provider(&e, "password"))?;

        let normalized = normalize(&user.user_name);
        let txn = self.db().begin().await?;
        if user_name_taken(&txn, &normalized, None).await? {
            return Err(AdminError::validation(MessageId::UserExists, "user_name"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (password_hash, security_stamp) = match credential {
            Some(credential) => (Some(credential.password_hash), credential.security_stamp),
            None => (None, self.runtime.new_security_stamp()),
        };
        let row = user::ActiveModel {
            id: Set(id.clone()),
            user_name: Set(user.user_name),
            normalized_user_name: Set(normalized),
            normalized_email: Set(user.email.as_deref().map(normalize)),
            email: Set(user.email),
            email_confirmed: Set(user.email_confirmed),
            password_hash: Set(password_hash),
            security_stamp: Set(Some(security_stamp)),
            concurrency_stamp: Set(Some(uuid::Uuid::new_v4().to_string())),
            phone_number: Set(user.phone_number),
            phone_number_confirmed: Set(user.phone_number_confirmed),
            two_factor_enabled: Set(user.two_factor_enabled),
            lockout_end: Set(user.lockout_end),
            lockout_enabled: Set(user.lockout_enabled),
            access_failed_count: Set(user.access_failed_count),
        };
        row.insert(&txn)
            .await
            .map_err(|e| unique_violation(e, MessageId::UserExists, "user_name"))?;
        txn.commit().await?;

        tracing::info!(user_id = %id, "Created user");
        Ok(id)
    }

    /// Overwrite every mutable field of an existing user.
    ///
    /// Credentials are left alone; the concurrency stamp is regenerated.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn update_user(&self, user: user::Model) -> AdminResult<user::Model> {
        self.runtime
            .validate_user_name(&user.user_name)
            .map_err(|e| AdminError::provider(&e, "user_name"))?;

        let txn = self.db().begin().await?;
        let existing = user::Entity::find_by_id(user.id.clone())
            .one(&txn)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserDoesNotExist))?;

        let normalized = normalize(&user.user_name);
        if normalized != existing.normalized_user_name
            && user_name_taken(&txn, &normalized, Some(&user.id)).await?
        {
            return Err(AdminError::validation(MessageId::UserExists, "user_name"));
        }

        let mut active: user::ActiveModel = existing.into();
        active.user_name = Set(user.user_name);
        active.normalized_user_name = Set(normalized);
        active.normalized_email = Set(user.email.as_deref().map(normalize));
        active.email = Set(user.email);
        active.email_confirmed = Set(user.email_confirmed);
        active.phone_number = Set(user.phone_number);
        active.phone_number_confirmed = Set(user.phone_number_confirmed);
        active.two_factor_enabled = Set(user.two_factor_enabled);
        active.lockout_end = Set(user.lockout_end);
        active.lockout_enabled = Set(user.lockout_enabled);
        active.access_failed_count = Set(user.access_failed_count);
        active.concurrency_stamp = Set(Some(uuid::Uuid::new_v4().to_string()));

        let updated = active
            .update(&txn)
            .await
            .map_err(|e| unique_violation(e, MessageId::UserExists, "user_name"))?;
        txn.commit().await?;

        tracing::info!(user_id = %updated.id, "Updated user");
        Ok(updated)
    }

    /// Delete a user together with its claims, logins, tokens and memberships.
    /// Returns the deleted row.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> AdminResult<user::Model> {
        let txn = self.db().begin().await?;
        let existing = user::Entity::find_by_id(user_id.to_owned())
            .one(&txn)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserDoesNotExist))?;

        let claims = user_claim::Entity::delete_many()
            .filter(user_claim::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        let logins = user_login::Entity::delete_many()
            .filter(user_login::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        let tokens = user_token::Entity::delete_many()
            .filter(user_token::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        let memberships = user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        user::Entity::delete_by_id(user_id.to_owned())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(
            user_id = user_id,
            claims = claims.rows_affected,
            logins = logins.rows_affected,
            tokens = tokens.rows_affected,
            memberships = memberships.rows_affected,
            "Deleted user"
        );
        Ok(existing)
    }

    /// Replace the user's password with a fresh runtime credential.
    #[tracing::instrument(skip(self, password))]
    pub async fn user_change_password(
        &self,
        user_id: &str,
        password: &str,
    ) -> AdminResult<user::Model> {
        let existing = user::Entity::find_by_id(user_id.to_owned())
            .one(self.db())
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserDoesNotExist))?;
        let credential = self
            .runtime
            .set_password(&existing.user_name, password)
            .map_err(|e| AdminError::provider(&e, "password"))?;

        let mut active: user::ActiveModel = existing.into();
        active.password_hash = Set(Some(credential.password_hash));
        active.security_stamp = Set(Some(credential.security_stamp));
        active.concurrency_stamp = Set(Some(uuid::Uuid::new_v4().to_string()));
        let updated = active.update(self.db()).await?;

        tracing::info!(user_id = user_id, "Changed user password");
        Ok(updated)
    }

    /// `false` for users without a password.
    #[tracing::instrument(skip(self, password))]
    pub async fn verify_user_password(&self, user_id: &str, password: &str) -> AdminResult<bool> {
        let existing = user::Entity::find_by_id(user_id.to_owned())
            .one(self.db())
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserDoesNotExist))?;
        Ok(existing
            .password_hash
            .as_deref()
            .is_some_and(|hash| self.runtime.verify_credential(hash, password)))
    }

    // ---- roles -------------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn exists_role(&self, role_id: &str) -> AdminResult<bool> {
        let count = role::Entity::find()
            .filter(role::Column::Id.eq(role_id))
            .count(self.db())
            .await?;
        Ok(count > 0)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role(&self, role_id: &str) -> AdminResult<Option<role::Model>> {
        Ok(role::Entity::find_by_id(role_id.to_owned())
            .one(self.db())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_role_by_name(&self, name: &str) -> AdminResult<Option<role::Model>> {
        Ok(role::Entity::find()
            .filter(role::Column::NormalizedName.eq(normalize(name)))
            .one(self.db())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_roles(
        &self,
        search: Option<&str>,
        window: PageRequest,
    ) -> AdminResult<PagedList<role::Model>> {
        let query = role_search(role::Entity::find(), search);
        Ok(fetch_page(self.db(), query, window).await?)
    }

    /// Roles the user is a member of, by name.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_roles(
        &self,
        user_id: &str,
        window: PageRequest,
    ) -> AdminResult<PagedList<role::Model>> {
        let memberships = Query::select()
            .column(user_role::Column::RoleId)
            .from(user_role::Entity)
            .and_where(user_role::Column::UserId.eq(user_id))
            .to_owned();
        let query = role_search(
            role::Entity::find().filter(role::Column::Id.in_subquery(memberships)),
            None,
        );
        Ok(fetch_page(self.db(), query, window).await?)
    }

    #[tracing::instrument(skip(self, role), fields(name = %role.name))]
    pub async fn create_role(&self, role: role::Model) -> AdminResult<String> {
        let normalized = normalize(&role.name);
        let txn = self.db().begin().await?;
        if role_name_taken(&txn, &normalized, None).await? {
            return Err(AdminError::validation(MessageId::RoleExists, "name"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let row = role::ActiveModel {
            id: Set(id.clone()),
            name: Set(role.name),
            normalized_name: Set(normalized),
            concurrency_stamp: Set(Some(uuid::Uuid::new_v4().to_string())),
        };
        row.insert(&txn)
            .await
            .map_err(|e| unique_violation(e, MessageId::RoleExists, "name"))?;
        txn.commit().await?;

        tracing::info!(role_id = %id, "Created role");
        Ok(id)
    }

    #[tracing::instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn update_role(&self, role: role::Model) -> AdminResult<role::Model> {
        let txn = self.db().begin().await?;
        let existing = role::Entity::find_by_id(role.id.clone())
            .one(&txn)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::RoleDoesNotExist))?;

        let normalized = normalize(&role.name);
        if normalized != existing.normalized_name
            && role_name_taken(&txn, &normalized, Some(&role.id)).await?
        {
            return Err(AdminError::validation(MessageId::RoleExists, "name"));
        }

        let mut active: role::ActiveModel = existing.into();
        active.name = Set(role.name);
        active.normalized_name = Set(normalized);
        active.concurrency_stamp = Set(Some(uuid::Uuid::new_v4().to_string()));
        let updated = active
            .update(&txn)
            .await
            .map_err(|e| unique_violation(e, MessageId::RoleExists, "name"))?;
        txn.commit().await?;

        tracing::info!(role_id = %updated.id, "Updated role");
        Ok(updated)
    }

    /// Delete a role together with its claims and memberships.
    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, role_id: &str) -> AdminResult<role::Model> {
        let txn = self.db().begin().await?;
        let existing = role::Entity::find_by_id(role_id.to_owned())
            .one(&txn)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::RoleDoesNotExist))?;

        let claims = role_claim::Entity::delete_many()
            .filter(role_claim::Column::RoleId.eq(role_id))
            .exec(&txn)
            .await?;
        let memberships = user_role::Entity::delete_many()
            .filter(user_role::Column::RoleId.eq(role_id))
            .exec(&txn)
            .await?;
        role::Entity::delete_by_id(role_id.to_owned())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(
            role_id = role_id,
            claims = claims.rows_affected,
            memberships = memberships.rows_affected,
            "Deleted role"
        );
        Ok(existing)
    }

    // ---- memberships -------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn create_user_role(
        &self,
        user_id: &str,
        role_id: &str,
    ) -> AdminResult<user_role::Model> {
        let txn = self.db().begin().await?;
        ensure_user(&txn, user_id).await?;
        if role::Entity::find_by_id(role_id.to_owned())
            .one(&txn)
            .await?
            .is_none()
        {
            return Err(AdminError::not_found(MessageId::RoleDoesNotExist));
        }
        if user_role::Entity::find_by_id((user_id.to_owned(), role_id.to_owned()))
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(AdminError::conflict(MessageId::UserRoleExists));
        }

        let membership = user_role::Model {
            user_id: user_id.to_owned(),
            role_id: role_id.to_owned(),
        };
        user_role::Entity::insert(user_role::ActiveModel::from(membership.clone()))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AdminError::conflict(MessageId::UserRoleExists)
                }
                _ => e.into(),
            })?;
        txn.commit().await?;

        tracing::info!(user_id = user_id, role_id = role_id, "Added user to role");
        Ok(membership)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user_role(
        &self,
        user_id: &str,
        role_id: &str,
    ) -> AdminResult<user_role::Model> {
        let result = user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(user_id))
            .filter(user_role::Column::RoleId.eq(role_id))
            .exec(self.db())
            .await?;
        if result.rows_affected == 0 {
            return Err(AdminError::not_found(MessageId::UserRoleDoesNotExist));
        }

        tracing::info!(user_id = user_id, role_id = role_id, "Removed user from role");
        Ok(user_role::Model {
            user_id: user_id.to_owned(),
            role_id: role_id.to_owned(),
        })
    }

    // ---- user claims -------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_claims(
        &self,
        user_id: &str,
        window: PageRequest,
    ) -> AdminResult<PagedList<user_claim::Model>> {
        let query = user_claim::Entity::find()
            .filter(user_claim::Column::UserId.eq(user_id))
            .order_by_asc(user_claim::Column::Id);
        Ok(fetch_page(self.db(), query, window).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_claim(
        &self,
        user_id: &str,
        claim_id: i32,
    ) -> AdminResult<Option<user_claim::Model>> {
        Ok(user_claim::Entity::find_by_id(claim_id)
            .filter(user_claim::Column::UserId.eq(user_id))
            .one(self.db())
            .await?)
    }

    #[tracing::instrument(skip(self, claim), fields(user_id = %claim.user_id))]
    pub async fn create_user_claim(
        &self,
        claim: user_claim::Model,
    ) -> AdminResult<user_claim::Model> {
        ensure_user(self.db(), &claim.user_id).await?;
        let row = user_claim::ActiveModel {
            id: NotSet,
            user_id: Set(claim.user_id),
            claim_type: Set(claim.claim_type),
            claim_value: Set(claim.claim_value),
        };
        let created = row.insert(self.db()).await?;

        tracing::info!(user_id = %created.user_id, claim_id = created.id, "Added user claim");
        Ok(created)
    }

    /// Replace type and value of one claim. Returns `(before, after)`.
    #[tracing::instrument(skip(self, claim), fields(user_id = %claim.user_id, claim_id = claim.id))]
    pub async fn update_user_claim(
        &self,
        claim: user_claim::Model,
    ) -> AdminResult<(user_claim::Model, user_claim::Model)> {
        let existing = self
            .get_user_claim(&claim.user_id, claim.id)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserClaimDoesNotExist))?;

        let mut active: user_claim::ActiveModel = existing.clone().into();
        active.claim_type = Set(claim.claim_type);
        active.claim_value = Set(claim.claim_value);
        let updated = active.update(self.db()).await?;
        Ok((existing, updated))
    }

    /// Remove every claim of the user matching the selected (type, value).
    /// Returns the removed claims; never empty on success.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user_claim(
        &self,
        user_id: &str,
        selector: ClaimSelector,
    ) -> AdminResult<Vec<user_claim::Model>> {
        let txn = self.db().begin().await?;
        let (claim_type, claim_value) = match selector {
            ClaimSelector::Id(claim_id) => {
                let claim = user_claim::Entity::find_by_id(claim_id)
                    .filter(user_claim::Column::UserId.eq(user_id))
                    .one(&txn)
                    .await?
                    .ok_or_else(|| AdminError::not_found(MessageId::UserClaimDoesNotExist))?;
                (claim.claim_type, claim.claim_value)
            }
            ClaimSelector::Pair {
                claim_type,
                claim_value,
            } => (claim_type, claim_value),
        };

        let matching = Condition::all()
            .add(user_claim::Column::UserId.eq(user_id))
            .add(user_claim::Column::ClaimType.eq(claim_type.as_str()))
            .add(user_claim::Column::ClaimValue.eq(claim_value.as_str()));
        let removed = user_claim::Entity::find()
            .filter(matching.clone())
            .order_by_asc(user_claim::Column::Id)
            .all(&txn)
            .await?;
        if removed.is_empty() {
            return Err(AdminError::not_found(MessageId::UserClaimDoesNotExist));
        }
        user_claim::Entity::delete_many()
            .filter(matching)
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(
            user_id = user_id,
            claim_type = %claim_type,
            removed = removed.len(),
            "Deleted user claims"
        );
        Ok(removed)
    }

    // ---- role claims -------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_role_claims(
        &self,
        role_id: &str,
        window: PageRequest,
    ) -> AdminResult<PagedList<role_claim::Model>> {
        let query = role_claim::Entity::find()
            .filter(role_claim::Column::RoleId.eq(role_id))
            .order_by_asc(role_claim::Column::Id);
        Ok(fetch_page(self.db(), query, window).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role_claim(
        &self,
        role_id: &str,
        claim_id: i32,
    ) -> AdminResult<Option<role_claim::Model>> {
        Ok(role_claim::Entity::find_by_id(claim_id)
            .filter(role_claim::Column::RoleId.eq(role_id))
            .one(self.db())
            .await?)
    }

    /// Claims the user holds through role membership, with the granting role.
    /// `claim_search` matches type or value, ignoring case.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_role_claims(
        &self,
        user_id: &str,
        claim_search: Option<&str>,
        window: PageRequest,
    ) -> AdminResult<PagedList<(role_claim::Model, role::Model)>> {
        let memberships = Query::select()
            .column(user_role::Column::RoleId)
            .from(user_role::Entity)
            .and_where(user_role::Column::UserId.eq(user_id))
            .to_owned();
        let mut condition = Condition::all().add(role_claim::Column::RoleId.in_subquery(memberships));
        if let Some(search) = claim_search.filter(|s| !s.trim().is_empty()) {
            let search = search.trim();
            condition = condition.add(
                Condition::any()
                    .add(upper_contains(
                        Expr::col((role_claim::Entity, role_claim::Column::ClaimType)),
                        search,
                    ))
                    .add(upper_contains(
                        Expr::col((role_claim::Entity, role_claim::Column::ClaimValue)),
                        search,
                    )),
            );
        }

        let total_count = role_claim::Entity::find()
            .filter(condition.clone())
            .count(self.db())
            .await?;
        let items = role_claim::Entity::find()
            .find_also_related(role::Entity)
            .filter(condition)
            .order_by_asc(role_claim::Column::Id)
            .offset(window.offset())
            .limit(window.limit())
            .all(self.db())
            .await?
            .into_iter()
            .filter_map(|(claim, role)| role.map(|role| (claim, role)))
            .collect();
        Ok(PagedList::new(items, total_count, window))
    }

    #[tracing::instrument(skip(self, claim), fields(role_id = %claim.role_id))]
    pub async fn create_role_claim(
        &self,
        claim: role_claim::Model,
    ) -> AdminResult<role_claim::Model> {
        ensure_role(self.db(), &claim.role_id).await?;
        let row = role_claim::ActiveModel {
            id: NotSet,
            role_id: Set(claim.role_id),
            claim_type: Set(claim.claim_type),
            claim_value: Set(claim.claim_value),
        };
        let created = row.insert(self.db()).await?;

        tracing::info!(role_id = %created.role_id, claim_id = created.id, "Added role claim");
        Ok(created)
    }

    #[tracing::instrument(skip(self, claim), fields(role_id = %claim.role_id, claim_id = claim.id))]
    pub async fn update_role_claim(
        &self,
        claim: role_claim::Model,
    ) -> AdminResult<(role_claim::Model, role_claim::Model)> {
        let existing = self
            .get_role_claim(&claim.role_id, claim.id)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::RoleClaimDoesNotExist))?;

        let mut active: role_claim::ActiveModel = existing.clone().into();
        active.claim_type = Set(claim.claim_type);
        active.claim_value = Set(claim.claim_value);
        let updated = active.update(self.db()).await?;
        Ok((existing, updated))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_role_claim(
        &self,
        role_id: &str,
        selector: ClaimSelector,
    ) -> AdminResult<Vec<role_claim::Model>> {
        let txn = self.db().begin().await?;
        let (claim_type, claim_value) = match selector {
            ClaimSelector::Id(claim_id) => {
                let claim = role_claim::Entity::find_by_id(claim_id)
                    .filter(role_claim::Column::RoleId.eq(role_id))
                    .one(&txn)
                    .await?
                    .ok_or_else(|| AdminError::not_found(MessageId::RoleClaimDoesNotExist))?;
                (claim.claim_type, claim.claim_value)
            }
            ClaimSelector::Pair {
                claim_type,
                claim_value,
            } => (claim_type, claim_value),
        };

        let matching = Condition::all()
            .add(role_claim::Column::RoleId.eq(role_id))
            .add(role_claim::Column::ClaimType.eq(claim_type.as_str()))
            .add(role_claim::Column::ClaimValue.eq(claim_value.as_str()));
        let removed = role_claim::Entity::find()
            .filter(matching.clone())
            .order_by_asc(role_claim::Column::Id)
            .all(&txn)
            .await?;
        if removed.is_empty() {
            return Err(AdminError::not_found(MessageId::RoleClaimDoesNotExist));
        }
        role_claim::Entity::delete_many()
            .filter(matching)
            .exec(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(
            role_id = role_id,
            claim_type = %claim_type,
            removed = removed.len(),
            "Deleted role claims"
        );
        Ok(removed)
    }

    // ---- external logins ---------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_providers(&self, user_id: &str) -> AdminResult<Vec<user_login::Model>> {
        Ok(user_login::Entity::find()
            .filter(user_login::Column::UserId.eq(user_id))
            .order_by_asc(user_login::Column::LoginProvider)
            .order_by_asc(user_login::Column::ProviderKey)
            .all(self.db())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_provider(
        &self,
        user_id: &str,
        login_provider: &str,
        provider_key: &str,
    ) -> AdminResult<Option<user_login::Model>> {
        Ok(
            user_login::Entity::find_by_id((login_provider.to_owned(), provider_key.to_owned()))
                .filter(user_login::Column::UserId.eq(user_id))
                .one(self.db())
                .await?,
        )
    }

    #[tracing::instrument(skip(self, login), fields(user_id = %login.user_id, provider = %login.login_provider))]
    pub async fn create_user_login(
        &self,
        login: user_login::Model,
    ) -> AdminResult<user_login::Model> {
        let txn = self.db().begin().await?;
        ensure_user(&txn, &login.user_id).await?;
        if user_login::Entity::find_by_id((
            login.login_provider.clone(),
            login.provider_key.clone(),
        ))
        .one(&txn)
        .await?
        .is_some()
        {
            return Err(AdminError::conflict(MessageId::UserProviderExists));
        }

        user_login::Entity::insert(user_login::ActiveModel::from(login.clone()))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AdminError::conflict(MessageId::UserProviderExists)
                }
                _ => e.into(),
            })?;
        txn.commit().await?;

        tracing::info!(user_id = %login.user_id, provider = %login.login_provider, "Added external login");
        Ok(login)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user_login(
        &self,
        user_id: &str,
        login_provider: &str,
        provider_key: &str,
    ) -> AdminResult<user_login::Model> {
        let existing = self
            .get_user_provider(user_id, login_provider, provider_key)
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserProviderDoesNotExist))?;
        user_login::Entity::delete_many()
            .filter(user_login::Column::LoginProvider.eq(login_provider))
            .filter(user_login::Column::ProviderKey.eq(provider_key))
            .filter(user_login::Column::UserId.eq(user_id))
            .exec(self.db())
            .await?;

        tracing::info!(user_id = user_id, provider = login_provider, "Removed external login");
        Ok(existing)
    }

    // ---- provider tokens ---------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn get_user_tokens(&self, user_id: &str) -> AdminResult<Vec<user_token::Model>> {
        Ok(user_token::Entity::find()
            .filter(user_token::Column::UserId.eq(user_id))
            .order_by_asc(user_token::Column::LoginProvider)
            .order_by_asc(user_token::Column::Name)
            .all(self.db())
            .await?)
    }

    /// Insert the token, or replace the value of an existing one.
    #[tracing::instrument(skip(self, token), fields(user_id = %token.user_id, provider = %token.login_provider, name = %token.name))]
    pub async fn set_user_token(
        &self,
        token: user_token::Model,
    ) -> AdminResult<user_token::Model> {
        let txn = self.db().begin().await?;
        ensure_user(&txn, &token.user_id).await?;
        let key = (
            token.user_id.clone(),
            token.login_provider.clone(),
            token.name.clone(),
        );
        match user_token::Entity::find_by_id(key).one(&txn).await? {
            Some(existing) => {
                let mut active: user_token::ActiveModel = existing.into();
                active.value = Set(token.value.clone());
                active.update(&txn).await?;
            }
            None => {
                user_token::Entity::insert(user_token::ActiveModel::from(token.clone()))
                    .exec_without_returning(&txn)
                    .await?;
            }
        }
        txn.commit().await?;
        Ok(token)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_user_token(
        &self,
        user_id: &str,
        login_provider: &str,
        name: &str,
    ) -> AdminResult<user_token::Model> {
        let key = (user_id.to_owned(), login_provider.to_owned(), name.to_owned());
        let existing = user_token::Entity::find_by_id(key.clone())
            .one(self.db())
            .await?
            .ok_or_else(|| AdminError::not_found(MessageId::UserTokenDoesNotExist))?;
        user_token::Entity::delete_by_id(key).exec(self.db()).await?;
        Ok(existing)
    }

    /// User names for the given ids; unknown ids are skipped.
    #[tracing::instrument(skip(self, user_ids), fields(count = user_ids.len()))]
    pub async fn get_user_names(&self, user_ids: &[String]) -> AdminResult<Vec<(String, String)>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let users = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids.iter().map(String::as_str)))
            .all(self.db())
            .await?;
        Ok(users.into_iter().map(|u| (u.id, u.user_name)).collect())
    }
}

/// Count and load one window of `query`.
async fn fetch_page<'db, C, E>(
    db: &'db C,
    query: Select<E>,
    window: PageRequest,
) -> Result<PagedList<E::Model>, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Sync + 'db,
{
    let total_count = query.clone().count(db).await?;
    let items = query
        .offset(window.offset())
        .limit(window.limit())
        .all(db)
        .await?;
    Ok(PagedList::new(items, total_count, window))
}

fn user_search(query: Select<user::Entity>, search: Option<&str>) -> Select<user::Entity> {
    let query = match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(search) => {
            let needle = normalize(search);
            query.filter(
                Condition::any()
                    .add(user::Column::NormalizedUserName.like(contains_pattern(&needle)))
                    .add(user::Column::NormalizedEmail.like(contains_pattern(&needle))),
            )
        }
        None => query,
    };
    query
        .order_by_asc(user::Column::NormalizedUserName)
        .order_by_asc(user::Column::Id)
}

fn role_search(query: Select<role::Entity>, search: Option<&str>) -> Select<role::Entity> {
    let query = match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(search) => {
            query.filter(role::Column::NormalizedName.like(contains_pattern(&normalize(search))))
        }
        None => query,
    };
    query
        .order_by_asc(role::Column::NormalizedName)
        .order_by_asc(role::Column::Id)
}

/// `UPPER(column) LIKE UPPER(pattern)`: both sides go through the backend's
/// `UPPER`, which may fold only ASCII.
fn upper_contains(column: Expr, needle: &str) -> SimpleExpr {
    let pattern = SimpleExpr::Binary(
        Box::new(Func::upper(Expr::val(escaped_contains(needle))).into()),
        BinOper::Escape,
        Box::new(SimpleExpr::Constant(LIKE_ESCAPE.into())),
    );
    Expr::expr(Func::upper(column)).binary(BinOper::Like, pattern)
}

async fn user_name_taken<C: ConnectionTrait>(
    db: &C,
    normalized: &str,
    except_id: Option<&str>,
) -> Result<bool, DbErr> {
    let mut query = user::Entity::find().filter(user::Column::NormalizedUserName.eq(normalized));
    if let Some(id) = except_id {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

async fn role_name_taken<C: ConnectionTrait>(
    db: &C,
    normalized: &str,
    except_id: Option<&str>,
) -> Result<bool, DbErr> {
    let mut query = role::Entity::find().filter(role::Column::NormalizedName.eq(normalized));
    if let Some(id) = except_id {
        query = query.filter(role::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

async fn ensure_user<C: ConnectionTrait>(db: &C, user_id: &str) -> AdminResult<()> {
    match user::Entity::find_by_id(user_id.to_owned()).one(db).await? {
        Some(_) => Ok(()),
        None => Err(AdminError::not_found(MessageId::UserDoesNotExist)),
    }
}

async fn ensure_role<C: ConnectionTrait>(db: &C, role_id: &str) -> AdminResult<()> {
    match role::Entity::find_by_id(role_id.to_owned()).one(db).await? {
        Some(_) => Ok(()),
        None => Err(AdminError::not_found(MessageId::RoleDoesNotExist)),
    }
}

/// A unique-constraint hit means a concurrent create won the race.
fn unique_violation(err: DbErr, id: MessageId, field: &'static str) -> AdminError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AdminError::validation(id, field),
        _ => err.into(),
    }
}
