use sqlx::PgPool;
use tracing::info;

use crate::error::Result;

/// Apply the schema DDL. Every statement is `IF NOT EXISTS`, so running it
/// against an up-to-date database is a no-op.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(include_str!("../../sql/schema.sql"))
        .execute(pool)
        .await?;
    info!("schema applied");
    Ok(())
}
