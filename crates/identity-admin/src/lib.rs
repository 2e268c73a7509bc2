//! Administrative service layer for an OAuth2/OIDC identity provider.
//!
//! Manages users, roles, claims, role memberships, external logins, provider
//! tokens and persisted grants. Token issuance and password hashing belong to
//! the identity-provider runtime ([`identity::IdentityRuntime`]); this crate
//! enforces the administrative rules around them and audits every mutation.

use std::sync::Arc;

use sea_orm::{Database, DatabaseConnection, DbErr};

use crate::audit::{AuditEventLogger, DatabaseAuditLogger, TracingAuditLogger};
use crate::config::{AppConfig, AuditSink};
use crate::grants::{PersistedGrantRepository, PersistedGrantService};
use crate::identity::{Argon2Runtime, IdentityRepository, IdentityRuntime, IdentityService};
use crate::resources::{ConfiguredResources, ResourceProvider};

pub mod audit;
pub mod config;
pub mod entity;
pub mod error;
pub mod grants;
pub mod identity;
pub mod paging;
pub mod resources;

/// Both services wired to their stores.
pub struct AdminContext {
    pub identity_db: Arc<DatabaseConnection>,
    pub grants_db: Arc<DatabaseConnection>,
    pub identity: IdentityService,
    pub grants: PersistedGrantService,
}

impl AdminContext {
    /// Connect to the configured stores and wire the services.
    ///
    /// One connection is shared when both stores use the same URL.
    pub async fn connect(config: &AppConfig) -> Result<Self, DbErr> {
        let identity_db = Arc::new(Database::connect(&config.database_url).await?);
        let grants_db = if config.grants_database_url() == config.database_url {
            identity_db.clone()
        } else {
            Arc::new(Database::connect(config.grants_database_url()).await?)
        };

        let audit: Arc<dyn AuditEventLogger> = match config.audit.sink {
            AuditSink::Database => Arc::new(DatabaseAuditLogger::new(identity_db.clone())),
            AuditSink::Tracing => Arc::new(TracingAuditLogger),
        };
        tracing::info!(
            audit_sink = ?config.audit.sink,
            shared_store = Arc::ptr_eq(&identity_db, &grants_db),
            "Connected identity and grant stores"
        );
        Ok(Self::new(config, identity_db, grants_db, audit))
    }

    /// Wire the services over existing connections with the built-in runtime
    /// and configured messages.
    pub fn new(
        config: &AppConfig,
        identity_db: Arc<DatabaseConnection>,
        grants_db: Arc<DatabaseConnection>,
        audit: Arc<dyn AuditEventLogger>,
    ) -> Self {
        let runtime: Arc<dyn IdentityRuntime> =
            Arc::new(Argon2Runtime::new(config.identity.clone()));
        let resources: Arc<dyn ResourceProvider> =
            Arc::new(ConfiguredResources::new(config.messages.clone()));

        let identity = IdentityService::new(
            IdentityRepository::new(identity_db.clone(), runtime),
            resources.clone(),
            audit.clone(),
            config.paging.clone(),
        );
        let grants = PersistedGrantService::new(
            PersistedGrantRepository::new(grants_db.clone(), identity_db.clone()),
            resources,
            audit,
            config.paging.clone(),
        );

        Self {
            identity_db,
            grants_db,
            identity,
            grants,
        }
    }
}
