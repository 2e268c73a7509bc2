//! Shared fixtures: a migrated in-memory store and a recording audit sink.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use identity_admin::AdminContext;
use identity_admin::audit::{AuditEvent, AuditEventLogger, AuditEventType};
use identity_admin::config::AppConfig;
use identity_admin::entity::persisted_grant;
use identity_admin::identity::{Argon2Runtime, IdentityRepository};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, DbErr};
use time::{Duration, OffsetDateTime};

pub const PASSWORD: &str = "Pa$$w0rd";

/// Fresh SQLite in-memory store with the full schema applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    Arc::new(db)
}

#[derive(Default)]
pub struct RecordingAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditLogger {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<AuditEventType> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn last(&self) -> AuditEvent {
        self.events().pop().expect("at least one audit event")
    }
}

#[async_trait]
impl AuditEventLogger for RecordingAuditLogger {
    async fn log_event(&self, event: AuditEvent) -> Result<(), DbErr> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Audit sink whose store is down.
pub struct FailingAuditLogger;

#[async_trait]
impl AuditEventLogger for FailingAuditLogger {
    async fn log_event(&self, _event: AuditEvent) -> Result<(), DbErr> {
        Err(DbErr::Custom("audit store unavailable".into()))
    }
}

pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub audit: Arc<RecordingAuditLogger>,
    pub admin: AdminContext,
}

pub async fn context() -> TestContext {
    context_with(AppConfig::with_database("sqlite::memory:")).await
}

pub async fn context_with(config: AppConfig) -> TestContext {
    let db = setup_db().await;
    let audit = Arc::new(RecordingAuditLogger::default());
    let admin = AdminContext::new(&config, db.clone(), db.clone(), audit.clone());
    TestContext { db, audit, admin }
}

pub fn repository(db: Arc<DatabaseConnection>) -> IdentityRepository {
    IdentityRepository::new(db, Arc::new(Argon2Runtime::default()))
}

/// Insert a grant the way the runtime would, created `age_minutes` ago.
pub async fn insert_grant(
    db: &DatabaseConnection,
    key: &str,
    subject_id: Option<&str>,
    client_id: &str,
    grant_type: &str,
    age_minutes: i64,
) -> persisted_grant::Model {
    let created = OffsetDateTime::now_utc() - Duration::minutes(age_minutes);
    persisted_grant::ActiveModel {
        key: Set(key.to_string()),
        grant_type: Set(grant_type.to_string()),
        subject_id: Set(subject_id.map(str::to_string)),
        session_id: Set(None),
        client_id: Set(client_id.to_string()),
        description: Set(None),
        creation_time: Set(created),
        expiration: Set(Some(created + Duration::hours(1))),
        consumed_time: Set(None),
        data: Set(format!("{{\"key\":\"{key}\"}}")),
    }
    .insert(db)
    .await
    .expect("insert grant")
}
