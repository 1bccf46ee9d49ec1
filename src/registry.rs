use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::types::{NodeRecord, UplinkReport};

/// How an upsert landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First report from this node_id.
    Inserted,
    /// Existing record replaced wholesale.
    Replaced,
    /// Report carried a timestamp older than the stored row; dropped.
    IgnoredStale,
}

/// One registry row plus its read-time classification.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub record: NodeRecord,
    pub online: bool,
}

/// Upsert-by-identity store of the latest reported state per node.
///
/// Concurrency discipline: atomic upsert per key (a dashmap entry), different
/// keys fully in parallel, reads observe whole records (never half-old /
/// half-new fields). No transactions spanning keys, no background sweep;
/// staleness is computed at read time and eviction only happens through the
/// explicit `prune` call.
pub struct NodeRegistry {
    nodes: DashMap<String, NodeRecord>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self { nodes: DashMap::new() }
    }

    /// Preload rows recovered from storage at startup.
    pub fn load(&self, records: Vec<NodeRecord>) {
        for record in records {
            self.nodes.insert(record.node_id.clone(), record);
        }
    }

    /// Apply one report: insert if the node is unseen, else replace the
    /// record wholesale. Newest-timestamp wins: a report older than the
    /// stored `last_seen` is ignored, so out-of-order delivery cannot roll a
    /// node backwards. Applying the same report twice yields the same state.
    ///
    /// A malformed report is rejected without touching any node's state.
    pub fn upsert(&self, report: &UplinkReport) -> Result<UpsertOutcome> {
        validate(report)?;

        let record = NodeRecord {
            node_id: report.auth.uuid.clone(),
            last_power_mw: report.telemetry.avg_mw,
            cumulative_valor: report.telemetry.total_valor,
            last_seen: report.timestamp,
        };

        match self.nodes.entry(record.node_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(UpsertOutcome::Inserted)
            }
            Entry::Occupied(mut slot) => {
                if record.last_seen < slot.get().last_seen {
                    return Ok(UpsertOutcome::IgnoredStale);
                }
                slot.insert(record);
                Ok(UpsertOutcome::Replaced)
            }
        }
    }

    /// All records ordered by `last_seen` descending, classified against the
    /// staleness threshold. Online iff `now - last_seen < threshold`;
    /// strictly less-than, so a record aged exactly `threshold` is timed out.
    pub fn list_active(&self, now: f64, threshold_secs: f64) -> Vec<NodeStatus> {
        let mut rows: Vec<NodeStatus> = self
            .nodes
            .iter()
            .map(|entry| {
                let record = entry.value().clone();
                let online = now - record.last_seen < threshold_secs;
                NodeStatus { record, online }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.record
                .last_seen
                .partial_cmp(&a.record.last_seen)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }

    /// Drop records not seen for `max_age_secs`. Returns the number removed.
    /// Intended to run at a large multiple of the staleness threshold so a
    /// briefly-offline node still shows as timed out before it disappears.
    pub fn prune(&self, now: f64, max_age_secs: f64) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, record| now - record.last_seen <= max_age_secs);
        before - self.nodes.len()
    }

    pub fn get(&self, node_id: &str) -> Option<NodeRecord> {
        self.nodes.get(node_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-report validation. A rejection leaves every node's prior state
/// untouched and surfaces as a client error.
fn validate(report: &UplinkReport) -> Result<()> {
    if report.auth.uuid.trim().is_empty() {
        return Err(AppError::InvalidReport("missing node_id".to_string()));
    }
    let t = &report.telemetry;
    if !t.avg_mw.is_finite() || t.avg_mw < 0.0 {
        return Err(AppError::InvalidReport(format!(
            "avg_mw must be finite and non-negative, got {}",
            t.avg_mw
        )));
    }
    if !t.total_valor.is_finite() {
        return Err(AppError::InvalidReport(format!(
            "total_valor must be finite, got {}",
            t.total_valor
        )));
    }
    if !report.timestamp.is_finite() || report.timestamp < 0.0 {
        return Err(AppError::InvalidReport(format!(
            "timestamp must be a non-negative unix time, got {}",
            report.timestamp
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UplinkAuth, UplinkTelemetry};

    fn report(node_id: &str, avg_mw: f64, valor: f64, ts: f64) -> UplinkReport {
        UplinkReport {
            auth: UplinkAuth { uuid: node_id.to_string() },
            telemetry: UplinkTelemetry { avg_mw, total_valor: valor },
            timestamp: ts,
        }
    }

    #[test]
    fn upsert_replaces_not_accumulates() {
        let registry = NodeRegistry::new();
        registry.upsert(&report("A", 100.0, 0.5, 100.0)).unwrap();
        registry.upsert(&report("A", 200.0, 0.7, 101.0)).unwrap();

        assert_eq!(registry.len(), 1);
        let rec = registry.get("A").unwrap();
        assert!((rec.last_power_mw - 200.0).abs() < 1e-9);
        assert!((rec.cumulative_valor - 0.7).abs() < 1e-9);
        assert!((rec.last_seen - 101.0).abs() < 1e-9);
    }

    #[test]
    fn upsert_is_idempotent() {
        let registry = NodeRegistry::new();
        let r = report("A", 150.0, 0.3, 50.0);

        assert_eq!(registry.upsert(&r).unwrap(), UpsertOutcome::Inserted);
        let first = registry.get("A").unwrap();

        assert_eq!(registry.upsert(&r).unwrap(), UpsertOutcome::Replaced);
        assert_eq!(registry.get("A").unwrap(), first);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_timestamp_is_ignored() {
        let registry = NodeRegistry::new();
        registry.upsert(&report("A", 200.0, 0.7, 101.0)).unwrap();

        let outcome = registry.upsert(&report("A", 100.0, 0.5, 100.0)).unwrap();
        assert_eq!(outcome, UpsertOutcome::IgnoredStale);

        let rec = registry.get("A").unwrap();
        assert!((rec.last_power_mw - 200.0).abs() < 1e-9);
        assert!((rec.last_seen - 101.0).abs() < 1e-9);
    }

    #[test]
    fn missing_node_id_rejected_without_side_effects() {
        let registry = NodeRegistry::new();
        registry.upsert(&report("A", 100.0, 0.5, 100.0)).unwrap();

        let err = registry.upsert(&report("", 900.0, 9.9, 200.0)).unwrap_err();
        assert!(matches!(err, AppError::InvalidReport(_)));

        // prior snapshot unchanged for all ids
        assert_eq!(registry.len(), 1);
        let rec = registry.get("A").unwrap();
        assert!((rec.last_power_mw - 100.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_numbers_rejected() {
        let registry = NodeRegistry::new();
        assert!(registry.upsert(&report("A", f64::NAN, 0.5, 100.0)).is_err());
        assert!(registry.upsert(&report("A", -5.0, 0.5, 100.0)).is_err());
        assert!(registry.upsert(&report("A", 100.0, f64::INFINITY, 100.0)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn staleness_boundary_is_strict() {
        let registry = NodeRegistry::new();
        let now = 1_000.0;
        registry.upsert(&report("fresh", 100.0, 0.1, now - 29.0)).unwrap();
        registry.upsert(&report("edge", 100.0, 0.1, now - 30.0)).unwrap();
        registry.upsert(&report("old", 100.0, 0.1, now - 31.0)).unwrap();

        let rows = registry.list_active(now, 30.0);
        let online = |id: &str| rows.iter().find(|s| s.record.node_id == id).unwrap().online;

        assert!(online("fresh"), "29s old is online");
        assert!(!online("edge"), "exactly 30s old is timed out");
        assert!(!online("old"), "31s old is timed out");
    }

    #[test]
    fn list_is_ordered_by_recency() {
        let registry = NodeRegistry::new();
        registry.upsert(&report("A", 1.0, 0.0, 10.0)).unwrap();
        registry.upsert(&report("B", 1.0, 0.0, 30.0)).unwrap();
        registry.upsert(&report("C", 1.0, 0.0, 20.0)).unwrap();

        let ids: Vec<String> = registry
            .list_active(100.0, 30.0)
            .into_iter()
            .map(|s| s.record.node_id)
            .collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
    }

    #[test]
    fn prune_drops_only_over_age_records() {
        let registry = NodeRegistry::new();
        let now = 10_000.0;
        registry.upsert(&report("live", 1.0, 0.0, now - 10.0)).unwrap();
        registry.upsert(&report("stale", 1.0, 0.0, now - 200.0)).unwrap();
        registry.upsert(&report("dead", 1.0, 0.0, now - 700.0)).unwrap();

        let removed = registry.prune(now, 600.0);
        assert_eq!(removed, 1);
        assert!(registry.get("dead").is_none());
        assert!(registry.get("live").is_some());
        assert!(registry.get("stale").is_some(), "timed out but not yet prunable");
    }
}
