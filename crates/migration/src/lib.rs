pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_identity_tables;
mod m20261001_000002_create_persisted_grants;
mod m20261001_000003_create_audit_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_identity_tables::Migration),
            Box::new(m20261001_000002_create_persisted_grants::Migration),
            Box::new(m20261001_000003_create_audit_log::Migration),
        ]
    }
}
