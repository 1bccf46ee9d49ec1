use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use tracing::info;

use crate::db::models::NodeRow;
use crate::error::Result;
use crate::types::NodeRecord;

/// Open (creating if needed) the core database and ensure the nodes table
/// exists. One row per node_id: last-known state only, no history.
pub async fn open(path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            node_id          TEXT PRIMARY KEY,
            last_power_mw    REAL NOT NULL,
            cumulative_valor REAL NOT NULL,
            last_seen        REAL NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    info!("Database ready at {path}");
    Ok(pool)
}

/// Load every persisted node row, for registry recovery at startup.
pub async fn load_nodes(pool: &SqlitePool) -> Result<Vec<NodeRecord>> {
    let rows: Vec<NodeRow> = sqlx::query_as(
        "SELECT node_id, last_power_mw, cumulative_valor, last_seen FROM nodes",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(NodeRecord::from).collect())
}

/// Mirror one applied upsert. Whole-row replacement, matching the in-memory
/// semantics; a conflict updates every numeric field at once.
pub async fn upsert_node(pool: &SqlitePool, record: &NodeRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nodes (node_id, last_power_mw, cumulative_valor, last_seen)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(node_id) DO UPDATE SET
            last_power_mw = excluded.last_power_mw,
            cumulative_valor = excluded.cumulative_valor,
            last_seen = excluded.last_seen
        "#,
    )
    .bind(&record.node_id)
    .bind(record.last_power_mw)
    .bind(record.cumulative_valor)
    .bind(record.last_seen)
    .execute(pool)
    .await?;

    Ok(())
}
