//! Audit events for administrative mutations.
//!
//! Services hand one [`AuditEvent`] per successful create/update/delete to an
//! [`AuditEventLogger`] and await it before returning, so an operation only
//! counts as successful once its audit record is written.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr};
use serde::Serialize;
use time::OffsetDateTime;

use crate::entity::audit_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuditEventType {
    UserSaved,
    UserUpdated,
    UserDeleted,
    UserPasswordChanged,
    RoleAdded,
    RoleUpdated,
    RoleDeleted,
    UserClaimsSaved,
    UserClaimsUpdated,
    UserClaimsDeleted,
    RoleClaimsSaved,
    RoleClaimsUpdated,
    RoleClaimsDeleted,
    UserRoleSaved,
    UserRoleDeleted,
    UserProviderSaved,
    UserProvidersDeleted,
    UserTokenSaved,
    UserTokenDeleted,
    PersistedGrantDeleted,
    PersistedGrantsDeleted,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::UserSaved => "UserSaved",
            AuditEventType::UserUpdated => "UserUpdated",
            AuditEventType::UserDeleted => "UserDeleted",
            AuditEventType::UserPasswordChanged => "UserPasswordChanged",
            AuditEventType::RoleAdded => "RoleAdded",
            AuditEventType::RoleUpdated => "RoleUpdated",
            AuditEventType::RoleDeleted => "RoleDeleted",
            AuditEventType::UserClaimsSaved => "UserClaimsSaved",
            AuditEventType::UserClaimsUpdated => "UserClaimsUpdated",
            AuditEventType::UserClaimsDeleted => "UserClaimsDeleted",
            AuditEventType::RoleClaimsSaved => "RoleClaimsSaved",
            AuditEventType::RoleClaimsUpdated => "RoleClaimsUpdated",
            AuditEventType::RoleClaimsDeleted => "RoleClaimsDeleted",
            AuditEventType::UserRoleSaved => "UserRoleSaved",
            AuditEventType::UserRoleDeleted => "UserRoleDeleted",
            AuditEventType::UserProviderSaved => "UserProviderSaved",
            AuditEventType::UserProvidersDeleted => "UserProvidersDeleted",
            AuditEventType::UserTokenSaved => "UserTokenSaved",
            AuditEventType::UserTokenDeleted => "UserTokenDeleted",
            AuditEventType::PersistedGrantDeleted => "PersistedGrantDeleted",
            AuditEventType::PersistedGrantsDeleted => "PersistedGrantsDeleted",
        }
    }

    pub fn category(self) -> AuditCategory {
        match self {
            AuditEventType::PersistedGrantDeleted | AuditEventType::PersistedGrantsDeleted => {
                AuditCategory::PersistedGrant
            }
            _ => AuditCategory::Identity,
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Identity,
    PersistedGrant,
}

impl AuditCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditCategory::Identity => "identity",
            AuditCategory::PersistedGrant => "persisted_grant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    /// The user, role or grant subject the mutation concerns
    pub subject_id: Option<String>,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        subject_id: Option<String>,
        payload: impl Serialize,
    ) -> Self {
        // DTOs serialize infallibly; fall back to null rather than lose the event.
        let payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        Self {
            event_type,
            subject_id,
            payload,
        }
    }

    /// Event carrying before and after snapshots of an update.
    pub fn changed(
        event_type: AuditEventType,
        subject_id: Option<String>,
        before: impl Serialize,
        after: impl Serialize,
    ) -> Self {
        Self::new(
            event_type,
            subject_id,
            serde_json::json!({
                "before": serde_json::to_value(before).unwrap_or(serde_json::Value::Null),
                "after": serde_json::to_value(after).unwrap_or(serde_json::Value::Null),
            }),
        )
    }

    pub fn category(&self) -> AuditCategory {
        self.event_type.category()
    }
}

/// Sink for audit events. Completion means the event is durable.
#[async_trait]
pub trait AuditEventLogger: Send + Sync {
    async fn log_event(&self, event: AuditEvent) -> Result<(), DbErr>;
}

/// Writes every event as a row of `audit_log` in the identity store.
pub struct DatabaseAuditLogger {
    db: Arc<DatabaseConnection>,
}

impl DatabaseAuditLogger {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditEventLogger for DatabaseAuditLogger {
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    async fn log_event(&self, event: AuditEvent) -> Result<(), DbErr> {
        let row = audit_log::ActiveModel {
            event_type: Set(event.event_type.as_str().to_string()),
            category: Set(event.category().as_str().to_string()),
            subject_id: Set(event.subject_id),
            payload: Set(event.payload.to_string()),
            created_at: Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        row.insert(self.db.as_ref()).await?;
        Ok(())
    }
}

/// Emits every event as a structured `tracing` event on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditEventLogger for TracingAuditLogger {
    async fn log_event(&self, event: AuditEvent) -> Result<(), DbErr> {
        tracing::info!(
            target: "audit",
            event_type = event.event_type.as_str(),
            category = event.category().as_str(),
            subject_id = event.subject_id.as_deref(),
            payload = %event.payload,
            "Audit event"
        );
        Ok(())
    }
}
