use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

/// Applies the schema to the identity store; point `DATABASE_URL` at the grant
/// store and run again when the two live in separate databases.
#[tokio::main]
async fn main() {
    if env::var("DATABASE_URL").is_err() {
        let path = env::var("IDENTITY_ADMIN_CONFIG").unwrap_or_else(|_| "config.yaml".into());
        let settings = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .unwrap_or_else(|e| panic!("Failed to read {path}: {e}"));
        if let Ok(url) = settings.get_string("database_url") {
            env::set_var("DATABASE_URL", url);
        }
    }
    cli::run_cli(migration::Migrator).await;
}
