//! Read and delete access to the persisted grant store.
//!
//! Grants are written by the identity-provider runtime only; nothing here
//! creates or modifies one. The grant store may be a different database
//! than the identity store, so subject names are resolved with a separate
//! query and joined in memory.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::entity::{persisted_grant, user};
use crate::error::AdminResult;
use crate::paging::{PageRequest, PagedList};

/// Keeps `IN (...)` lists well below backend parameter limits.
const NAME_LOOKUP_CHUNK: usize = 500;

pub struct PersistedGrantRepository {
    grants: Arc<DatabaseConnection>,
    identity: Arc<DatabaseConnection>,
}

impl PersistedGrantRepository {
    pub fn new(grants: Arc<DatabaseConnection>, identity: Arc<DatabaseConnection>) -> Self {
        Self { grants, identity }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_key(&self, key: &str) -> AdminResult<Option<persisted_grant::Model>> {
        Ok(persisted_grant::Entity::find_by_id(key.to_owned())
            .one(self.grants.as_ref())
            .await?)
    }

    /// Grants of one subject, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_by_user(
        &self,
        subject_id: &str,
        window: PageRequest,
    ) -> AdminResult<PagedList<persisted_grant::Model>> {
        let query = persisted_grant::Entity::find()
            .filter(persisted_grant::Column::SubjectId.eq(subject_id))
            .order_by_desc(persisted_grant::Column::CreationTime)
            .order_by_asc(persisted_grant::Column::Key);

        let total_count = query.clone().count(self.grants.as_ref()).await?;
        let items = query
            .offset(window.offset())
            .limit(window.limit())
            .all(self.grants.as_ref())
            .await?;
        Ok(PagedList::new(items, total_count, window))
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists_by_subject(&self, subject_id: &str) -> AdminResult<bool> {
        let count = persisted_grant::Entity::find()
            .filter(persisted_grant::Column::SubjectId.eq(subject_id))
            .count(self.grants.as_ref())
            .await?;
        Ok(count > 0)
    }

    /// Distinct subjects holding grants, with their user names, ordered by
    /// subject id. `search` matches subject id or user name, ignoring case.
    #[tracing::instrument(skip(self))]
    pub async fn get_subjects(
        &self,
        search: Option<&str>,
        window: PageRequest,
    ) -> AdminResult<PagedList<(String, Option<String>)>> {
        let subject_ids: Vec<String> = persisted_grant::Entity::find()
            .select_only()
            .column(persisted_grant::Column::SubjectId)
            .distinct()
            .filter(persisted_grant::Column::SubjectId.is_not_null())
            .order_by_asc(persisted_grant::Column::SubjectId)
            .into_tuple()
            .all(self.grants.as_ref())
            .await?;

        let mut names = self.get_user_names(&subject_ids).await?;
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let subjects = subject_ids
            .into_iter()
            .map(|subject_id| {
                let name = names.remove(&subject_id);
                (subject_id, name)
            })
            .filter(|(subject_id, name)| match &needle {
                Some(needle) => {
                    subject_id.to_lowercase().contains(needle)
                        || name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase().contains(needle))
                }
                None => true,
            })
            .collect();
        Ok(PagedList::from_vec(subjects, window))
    }

    /// User names from the identity store, keyed by user id.
    #[tracing::instrument(skip(self, subject_ids), fields(count = subject_ids.len()))]
    pub async fn get_user_names(
        &self,
        subject_ids: &[String],
    ) -> AdminResult<HashMap<String, String>> {
        let mut names = HashMap::with_capacity(subject_ids.len());
        for chunk in subject_ids.chunks(NAME_LOOKUP_CHUNK) {
            let rows: Vec<(String, String)> = user::Entity::find()
                .select_only()
                .column(user::Column::Id)
                .column(user::Column::UserName)
                .filter(user::Column::Id.is_in(chunk.iter().map(String::as_str)))
                .into_tuple()
                .all(self.identity.as_ref())
                .await?;
            names.extend(rows);
        }
        Ok(names)
    }

    /// Delete one grant. Absent keys are not an error; returns rows removed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_key(&self, key: &str) -> AdminResult<u64> {
        let result = persisted_grant::Entity::delete_by_id(key.to_owned())
            .exec(self.grants.as_ref())
            .await?;
        tracing::info!(deleted = result.rows_affected, "Deleted persisted grant");
        Ok(result.rows_affected)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_all_by_user(&self, subject_id: &str) -> AdminResult<u64> {
        let result = persisted_grant::Entity::delete_many()
            .filter(persisted_grant::Column::SubjectId.eq(subject_id))
            .exec(self.grants.as_ref())
            .await?;
        tracing::info!(deleted = result.rows_affected, "Deleted persisted grants of subject");
        Ok(result.rows_affected)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_by_user_and_client(
        &self,
        subject_id: &str,
        client_id: &str,
    ) -> AdminResult<u64> {
        let result = persisted_grant::Entity::delete_many()
            .filter(persisted_grant::Column::SubjectId.eq(subject_id))
            .filter(persisted_grant::Column::ClientId.eq(client_id))
            .exec(self.grants.as_ref())
            .await?;
        tracing::info!(deleted = result.rows_affected, "Deleted persisted grants of client");
        Ok(result.rows_affected)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_by_user_client_and_type(
        &self,
        subject_id: &str,
        client_id: &str,
        grant_type: &str,
    ) -> AdminResult<u64> {
        let result = persisted_grant::Entity::delete_many()
            .filter(persisted_grant::Column::SubjectId.eq(subject_id))
            .filter(persisted_grant::Column::ClientId.eq(client_id))
            .filter(persisted_grant::Column::GrantType.eq(grant_type))
            .exec(self.grants.as_ref())
            .await?;
        tracing::info!(deleted = result.rows_affected, "Deleted persisted grants of type");
        Ok(result.rows_affected)
    }
}
