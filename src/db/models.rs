use crate::types::NodeRecord;

/// Database row shape for the nodes table. Used by sqlx for typed queries.
#[derive(Debug, sqlx::FromRow)]
pub struct NodeRow {
    pub node_id: String,
    pub last_power_mw: f64,
    pub cumulative_valor: f64,
    pub last_seen: f64,
}

impl From<NodeRow> for NodeRecord {
    fn from(row: NodeRow) -> Self {
        NodeRecord {
            node_id: row.node_id,
            last_power_mw: row.last_power_mw,
            cumulative_valor: row.cumulative_valor,
            last_seen: row.last_seen,
        }
    }
}
