//! Database module
//!
//! Postgres connectivity and schema verification. Migrations themselves are
//! the raw SQL files under `migrations/`.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Tables the Postgres store reads and writes
const REQUIRED_TABLES: [&str; 3] = ["wallets", "ledger_entries", "reconciliations"];

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Check if required tables and the reference uniqueness constraint exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // Idempotency relies on this index as the last line of defence
    let unique_reference: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.table_constraints
            WHERE table_name = 'ledger_entries'
              AND constraint_type = 'UNIQUE'
              AND constraint_name = 'ledger_entries_external_reference_key'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !unique_reference {
        tracing::error!("ledger_entries is missing the unique external_reference constraint");
        return Ok(false);
    }

    tracing::info!("Database schema verified");
    Ok(true)
}
