use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Power sampling
// ---------------------------------------------------------------------------

/// Provenance of a power reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerMode {
    /// Measured from a hardware facility (powermetrics).
    Physical,
    /// Estimated from CPU load against the idle→peak model.
    Simulated,
}

impl std::fmt::Display for PowerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerMode::Physical => write!(f, "PHYSICAL"),
            PowerMode::Simulated => write!(f, "SIMULATED"),
        }
    }
}

/// One power measurement, produced once per tick. Immutable; only the
/// numeric value is retained once folded into the window.
#[derive(Debug, Clone)]
pub struct Sample {
    pub power_mw: f64,
    pub mode: PowerMode,
    pub timestamp: SystemTime,
}

impl Sample {
    pub fn new(power_mw: f64, mode: PowerMode) -> Self {
        Self { power_mw, mode, timestamp: SystemTime::now() }
    }
}

/// Per-tick numbers derived from the window plus fixed market constants.
/// Recomputed fresh each tick, never persisted.
#[derive(Debug, Clone)]
pub struct DerivedMetrics {
    pub instantaneous_power_mw: f64,
    pub average_power_mw: f64,
    pub yield_value: f64,
    pub spread_value: f64,
    pub mode: PowerMode,
}

// ---------------------------------------------------------------------------
// Yield law selection
// ---------------------------------------------------------------------------

/// Two yield formulas exist across deployed monitor generations and are not
/// equivalent. The law is chosen at construction and fixed for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldLaw {
    /// `(avg_mw * window_size) / conversion_factor`, the default.
    WindowNormalized,
    /// `power_kw * 1000 * yield_rate` on the instantaneous reading.
    SpotRate,
}

impl std::fmt::Display for YieldLaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YieldLaw::WindowNormalized => write!(f, "window_normalized"),
            YieldLaw::SpotRate => write!(f, "spot_rate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

/// Opaque node/session identifiers, generated once at process start and
/// stable for the process lifetime. No external validation.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub session_id: String,
}

impl NodeIdentity {
    /// `VLR-XXXXXXXX` node id plus a 6-hex session tag.
    pub fn generate() -> Self {
        let node = Uuid::new_v4().simple().to_string();
        let session = Uuid::new_v4().simple().to_string();
        Self {
            node_id: format!("VLR-{}", node[..8].to_uppercase()),
            session_id: session[..6].to_uppercase(),
        }
    }

    /// Use a configured node id, generating only the session tag.
    pub fn with_node_id(node_id: String) -> Self {
        let session = Uuid::new_v4().simple().to_string();
        Self { node_id, session_id: session[..6].to_uppercase() }
    }
}

// ---------------------------------------------------------------------------
// Registry records
// ---------------------------------------------------------------------------

/// Last-known state for one reporting node. Replaced wholesale on every
/// applied report; never merged field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub last_power_mw: f64,
    pub cumulative_valor: f64,
    /// Unix seconds of the report that produced this record.
    pub last_seen: f64,
}

// ---------------------------------------------------------------------------
// Uplink wire shapes (node → core)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkAuth {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkTelemetry {
    pub avg_mw: f64,
    pub total_valor: f64,
}

/// The report payload posted to the core each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkReport {
    pub auth: UplinkAuth,
    pub telemetry: UplinkTelemetry,
    /// Unix seconds at the reporting node.
    pub timestamp: f64,
}

impl UplinkReport {
    pub fn new(node_id: &str, avg_mw: f64, total_valor: f64) -> Self {
        Self {
            auth: UplinkAuth { uuid: node_id.to_string() },
            telemetry: UplinkTelemetry { avg_mw, total_valor },
            timestamp: now_secs(),
        }
    }
}

/// Unix seconds as f64, the registry's clock domain.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identity_shape() {
        let id = NodeIdentity::generate();
        assert!(id.node_id.starts_with("VLR-"));
        assert_eq!(id.node_id.len(), 12);
        assert_eq!(id.session_id.len(), 6);
    }

    #[test]
    fn yield_law_round_trips_through_serde() {
        let law: YieldLaw = serde_json::from_str("\"spot_rate\"").unwrap();
        assert_eq!(law, YieldLaw::SpotRate);
        let law: YieldLaw = serde_json::from_str("\"window_normalized\"").unwrap();
        assert_eq!(law, YieldLaw::WindowNormalized);
    }

    #[test]
    fn uplink_report_wire_shape() {
        let report = UplinkReport::new("VLR-TEST0001", 12_000.0, 0.5);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["auth"]["uuid"], "VLR-TEST0001");
        assert!((json["telemetry"]["avg_mw"].as_f64().unwrap() - 12_000.0).abs() < 1e-9);
        assert!(json["timestamp"].as_f64().unwrap() > 0.0);
    }
}
