use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::error;

use crate::api::health::HealthState;
use crate::db::store::upsert_node;
use crate::types::NodeRecord;

/// Receives applied registry records and mirrors them to sqlite.
/// Runs as a dedicated background task; it never blocks the uplink path.
pub struct RegistryWriter {
    pool: SqlitePool,
    record_rx: mpsc::Receiver<NodeRecord>,
    health: Arc<HealthState>,
}

impl RegistryWriter {
    pub fn new(
        pool: SqlitePool,
        record_rx: mpsc::Receiver<NodeRecord>,
        health: Arc<HealthState>,
    ) -> Self {
        Self { pool, record_rx, health }
    }

    pub async fn run(mut self) {
        while let Some(record) = self.record_rx.recv().await {
            if let Err(e) = upsert_node(&self.pool, &record).await {
                error!(node_id = %record.node_id, "DB write error: {e}");
            }
            self.health.dec_write_queue_pending();
        }
    }
}
