use std::path::Path;

use serde::Deserialize;

use crate::types::YieldLaw;

/// Bounded timeout for one physical power reading. A hung powermetrics
/// invocation must never stall the tick loop longer than this.
pub const POWERMETRICS_TIMEOUT_SECS: u64 = 5;

/// Uplink HTTP timeout (seconds). Reports are fire-and-forget; a slow core
/// delays at most one tick.
pub const UPLINK_TIMEOUT_SECS: u64 = 5;

/// Channel capacity for the registry persistence queue.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Node-side diagnostics line interval (seconds).
pub const DIAG_INTERVAL_SECS: u64 = 30;

/// Dashboard meta-refresh cadence (seconds). The view polls; nothing is pushed.
pub const DASHBOARD_REFRESH_SECS: u64 = 5;

/// Registry pruning sweep interval (seconds).
pub const PRUNE_INTERVAL_SECS: u64 = 60;

/// mW per kW.
pub const MW_PER_KW: f64 = 1_000_000.0;

#[derive(Debug, Clone)]
pub struct Config {
    /// Rolling window capacity in samples (WINDOW_SIZE).
    pub window_size: usize,
    /// Seconds between ticks.
    pub sample_interval_secs: f64,
    /// Divisor for the window-normalized yield law.
    pub conversion_factor: f64,
    /// Which yield law is authoritative for this process.
    pub yield_law: YieldLaw,
    /// Valor per kW under the spot-rate yield law.
    pub yield_rate: f64,
    /// Simulated estimator endpoints: idle → peak draw in mW.
    pub idle_power_mw: f64,
    pub peak_power_mw: f64,
    /// Market compute value per kWh ($).
    pub market_value_per_kwh: f64,
    /// Spot energy cost per kWh ($).
    pub spot_cost_per_kwh: f64,
    /// Core uplink endpoint. None = local display only.
    pub uplink_url: Option<String>,
    /// Fixed node id. None = generated at startup.
    pub node_id: Option<String>,
    /// Fail startup if NVML cannot be initialized.
    pub gpu_required: bool,
    /// Suppress the interactive console line; the log file still records.
    pub silent: bool,
    pub log_level: String,
    /// Durable node log file path.
    pub log_file: String,
    /// Core HTTP port.
    pub api_port: u16,
    /// Core sqlite path for last-known node rows.
    pub db_path: String,
    /// A node is online iff now - last_seen < this (strict).
    pub stale_after_secs: f64,
    /// Records older than this are dropped by the pruning sweep.
    pub prune_after_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 60,
            sample_interval_secs: 1.0,
            conversion_factor: 1_000_000.0,
            yield_law: YieldLaw::WindowNormalized,
            yield_rate: 0.00006,
            idle_power_mw: 5_000.0,
            peak_power_mw: 30_000.0,
            market_value_per_kwh: 0.18,
            spot_cost_per_kwh: 0.045,
            uplink_url: None,
            node_id: None,
            gpu_required: false,
            silent: false,
            log_level: "info".to_string(),
            log_file: "valor-node.log".to_string(),
            api_port: 5000,
            db_path: "valor-core.db".to_string(),
            stale_after_secs: 30.0,
            prune_after_secs: 600.0,
        }
    }
}

/// Optional overlay loaded from a JSON config file. Every field is optional;
/// absent fields keep their defaults.
#[derive(Debug, Default, Deserialize)]
pub struct FileOverlay {
    pub window_size: Option<usize>,
    pub sample_interval_secs: Option<f64>,
    pub conversion_factor: Option<f64>,
    pub yield_law: Option<YieldLaw>,
    pub yield_rate: Option<f64>,
    pub idle_power_mw: Option<f64>,
    pub peak_power_mw: Option<f64>,
    pub market_value_per_kwh: Option<f64>,
    pub spot_cost_per_kwh: Option<f64>,
    pub uplink_url: Option<String>,
    pub node_id: Option<String>,
    pub gpu_required: Option<bool>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub api_port: Option<u16>,
    pub db_path: Option<String>,
    pub stale_after_secs: Option<f64>,
    pub prune_after_secs: Option<f64>,
}

impl Config {
    /// Load configuration: hardcoded defaults, overlaid by the optional JSON
    /// file, overlaid by environment variables. A missing or unparseable file
    /// is a warning, never fatal.
    pub fn load(path: &Path) -> Self {
        let mut cfg = Self::default();

        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<FileOverlay>(&raw) {
                Ok(overlay) => cfg.apply(overlay),
                // Runs before the tracing subscriber exists, so plain stderr.
                Err(e) => eprintln!("[WARN] Failed to parse {}: {e}; using defaults", path.display()),
            },
            Err(_) => {
                // No config file is the normal case for a fresh node.
            }
        }

        cfg.apply_env();
        cfg
    }

    fn apply(&mut self, o: FileOverlay) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(v) = o.$field {
                    self.$field = v;
                }
            };
        }
        take!(window_size);
        take!(sample_interval_secs);
        take!(conversion_factor);
        take!(yield_law);
        take!(yield_rate);
        take!(idle_power_mw);
        take!(peak_power_mw);
        take!(market_value_per_kwh);
        take!(spot_cost_per_kwh);
        take!(gpu_required);
        take!(log_level);
        take!(log_file);
        take!(api_port);
        take!(db_path);
        take!(stale_after_secs);
        take!(prune_after_secs);
        if o.uplink_url.is_some() {
            self.uplink_url = o.uplink_url;
        }
        if o.node_id.is_some() {
            self.node_id = o.node_id;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VALOR_UPLINK_URL") {
            if !url.is_empty() {
                self.uplink_url = Some(url);
            }
        }
        if let Ok(level) = std::env::var("VALOR_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(port) = std::env::var("VALOR_API_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.api_port = p;
            }
        }
        if std::env::var("VALOR_SILENT").map_or(false, |v| v == "1" || v == "true") {
            self.silent = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.window_size, 60);
        assert!((cfg.conversion_factor - 1_000_000.0).abs() < 1e-6);
        assert_eq!(cfg.yield_law, YieldLaw::WindowNormalized);
        assert!(cfg.idle_power_mw < cfg.peak_power_mw);
        assert!((cfg.stale_after_secs - 30.0).abs() < 1e-9);
        assert!(cfg.prune_after_secs >= cfg.stale_after_secs);
    }

    #[test]
    fn overlay_replaces_only_present_fields() {
        let overlay: FileOverlay = serde_json::from_str(
            r#"{"window_size": 10, "yield_law": "spot_rate", "uplink_url": "http://core:5000/api/uplink"}"#,
        )
        .expect("valid overlay json");

        let mut cfg = Config::default();
        cfg.apply(overlay);

        assert_eq!(cfg.window_size, 10);
        assert_eq!(cfg.yield_law, YieldLaw::SpotRate);
        assert_eq!(cfg.uplink_url.as_deref(), Some("http://core:5000/api/uplink"));
        // untouched fields keep defaults
        assert!((cfg.sample_interval_secs - 1.0).abs() < 1e-9);
        assert_eq!(cfg.api_port, 5000);
    }

    #[test]
    fn malformed_overlay_is_rejected_by_serde() {
        let result = serde_json::from_str::<FileOverlay>(r#"{"window_size": "sixty"}"#);
        assert!(result.is_err());
    }
}
