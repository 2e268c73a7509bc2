//! Administrative view over persisted grants: browse, inspect, revoke.
//!
//! Every successful delete records one audit event describing its scope,
//! never the deleted rows.

use std::sync::Arc;

use serde_json::json;

use crate::audit::{AuditEvent, AuditEventLogger, AuditEventType};
use crate::config::PagingConfig;
use crate::error::{AdminError, AdminResult, Localize};
use crate::grants::dto::{
    GrantDeletionScope, PersistedGrantDto, PersistedGrantSubjectDto, PersistedGrantSubjectsDto,
    PersistedGrantsDto,
};
use crate::grants::repository::PersistedGrantRepository;
use crate::paging::PageRequest;
use crate::resources::{MessageId, ResourceProvider};

pub struct PersistedGrantService {
    repository: PersistedGrantRepository,
    resources: Arc<dyn ResourceProvider>,
    audit: Arc<dyn AuditEventLogger>,
    paging: PagingConfig,
}

impl PersistedGrantService {
    pub fn new(
        repository: PersistedGrantRepository,
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

    async fn subject_name(&self, subject_id: Option<&str>) -> AdminResult<Option<String>> {
        let Some(subject_id) = subject_id else {
            return Ok(None);
        };
        let mut names = self
            .repository
            .get_user_names(&[subject_id.to_owned()])
            .await
            .localize(self.resources())?;
        Ok(names.remove(subject_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_persisted_grants_by_subjects(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> AdminResult<PersistedGrantSubjectsDto> {
        let subjects = self
            .repository
            .get_subjects(search, self.window(page))
            .await
            .localize(self.resources())?;
        Ok(subjects.map(|(subject_id, subject_name)| PersistedGrantSubjectDto {
            subject_id,
            subject_name,
        }))
    }

    /// Grants of one subject, most recent first. A subject without grants
    /// yields an empty page.
    #[tracing::instrument(skip(self))]
    pub async fn get_persisted_grants_by_subject(
        &self,
        subject_id: &str,
        page: PageRequest,
    ) -> AdminResult<PersistedGrantsDto> {
        let grants = self
            .repository
            .get_all_by_user(subject_id, self.window(page))
            .await
            .localize(self.resources())?;
        if grants.items.is_empty() {
            return Ok(grants.map(PersistedGrantDto::from));
        }
        let subject_name = self.subject_name(Some(subject_id)).await?;
        Ok(grants.map(|grant| PersistedGrantDto::new(grant, subject_name.clone())))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_persisted_grant(&self, key: &str) -> AdminResult<PersistedGrantDto> {
        let Some(grant) = self
            .repository
            .get_by_key(key)
            .await
            .localize(self.resources())?
        else {
            return Err(AdminError::not_found(MessageId::PersistedGrantDoesNotExist))
                .localize(self.resources());
        };
        let subject_name = self.subject_name(grant.subject_id.as_deref()).await?;
        Ok(PersistedGrantDto::new(grant, subject_name))
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists_persisted_grants(&self, subject_id: &str) -> AdminResult<bool> {
        self.repository
            .exists_by_subject(subject_id)
            .await
            .localize(self.resources())
    }

    /// Delete one grant by key. Deleting an absent key succeeds with 0.
    #[tracing::instrument(skip(self))]
    pub async fn delete_persisted_grant(&self, key: &str) -> AdminResult<u64> {
        let deleted = self
            .repository
            .delete_by_key(key)
            .await
            .localize(self.resources())?;

        self.record(AuditEvent::new(
            AuditEventType::PersistedGrantDeleted,
            None,
            json!({ "key": key, "deleted": deleted }),
        ))
        .await?;
        Ok(deleted)
    }

    /// Revoke every grant of a subject.
    #[tracing::instrument(skip(self))]
    pub async fn delete_persisted_grants(&self, subject_id: &str) -> AdminResult<u64> {
        let deleted = self
            .repository
            .delete_all_by_user(subject_id)
            .await
            .localize(self.resources())?;
        self.record_bulk(subject_id, None, None, deleted).await?;
        Ok(deleted)
    }

    /// Revoke a subject's grants for one client.
    #[tracing::instrument(skip(self))]
    pub async fn delete_persisted_grants_by_client(
        &self,
        subject_id: &str,
        client_id: &str,
    ) -> AdminResult<u64> {
        let deleted = self
            .repository
            .delete_by_user_and_client(subject_id, client_id)
            .await
            .localize(self.resources())?;
        self.record_bulk(subject_id, Some(client_id), None, deleted)
            .await?;
        Ok(deleted)
    }

    /// Revoke a subject's grants of one type for one client.
    #[tracing::instrument(skip(self))]
    pub async fn delete_persisted_grants_by_type(
        &self,
        subject_id: &str,
        client_id: &str,
        grant_type: &str,
    ) -> AdminResult<u64> {
        let deleted = self
            .repository
            .delete_by_user_client_and_type(subject_id, client_id, grant_type)
            .await
            .localize(self.resources())?;
        self.record_bulk(subject_id, Some(client_id), Some(grant_type), deleted)
            .await?;
        Ok(deleted)
    }

    async fn record_bulk(
        &self,
        subject_id: &str,
        client_id: Option<&str>,
        grant_type: Option<&str>,
        deleted: u64,
    ) -> AdminResult<()> {
        let scope = GrantDeletionScope {
            subject_id: subject_id.to_owned(),
            client_id: client_id.map(str::to_owned),
            grant_type: grant_type.map(str::to_owned),
            deleted,
        };
        self.record(AuditEvent::new(
            AuditEventType::PersistedGrantsDeleted,
            Some(scope.subject_id.clone()),
            &scope,
        ))
        .await
    }
}
