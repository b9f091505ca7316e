use crate::entities::temp_media;
use anyhow::Context;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Statement};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Create the `temp_media` table and its sweeper indexes if missing
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    let table = schema
        .create_table_from_entity(temp_media::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&table))
        .await
        .context("failed to create table 'temp_media'")?;
    info!("   - Table 'temp_media' checked/created");

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_temp_media_status_expires_at ON temp_media(status, expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_temp_media_status_processed_at ON temp_media(status, processed_at)",
        "CREATE INDEX IF NOT EXISTS idx_temp_media_session_id ON temp_media(session_id)",
        "CREATE INDEX IF NOT EXISTS idx_temp_media_user_id ON temp_media(user_id)",
    ];

    for query in indexes {
        match db
            .execute(Statement::from_string(builder, query.to_owned()))
            .await
        {
            Ok(_) => tracing::debug!("   - Executed schema update: {}", query),
            Err(e) => tracing::warn!("   - Schema update warning: {} -> {}", query, e),
        }
    }

    Ok(())
}
