use std::time::Duration;

use nvml_wrapper::Nvml;
use sysinfo::System;
use tracing::debug;

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Provider traits: one per sensor concern, each independently failable and
// mockable. The sampling loop never talks to a sensor directly.
// ---------------------------------------------------------------------------

/// A facility that can produce an instantaneous power reading in milliwatts.
#[allow(async_fn_in_trait)]
pub trait PowerProvider {
    async fn read_mw(&mut self) -> Result<f64>;
}

/// Host utilization sensors backing the simulated estimator and the live
/// display line. Values are percentages in [0, 100], clamped by the
/// underlying library.
pub trait HostSensors {
    fn utilization(&mut self) -> HostUtilization;
}

/// Optional GPU power sensor. A failed read yields `None`, never an error;
/// GPU trouble must not fail a tick.
pub trait GpuSource {
    fn read(&mut self) -> Option<GpuReading>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostUtilization {
    pub cpu_pct: f32,
    pub mem_pct: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct GpuReading {
    pub power_mw: f64,
    pub utilization_pct: u32,
}

// ---------------------------------------------------------------------------
// Physical provider — powermetrics subprocess with a bounded timeout
// ---------------------------------------------------------------------------

/// Reads combined package power from `powermetrics` (Apple Silicon). Each
/// invocation is bounded by `timeout`; a hung or failed read falls back to
/// simulation for that tick only.
pub struct PowermetricsProvider {
    timeout: Duration,
}

impl PowermetricsProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PowerProvider for PowermetricsProvider {
    async fn read_mw(&mut self) -> Result<f64> {
        let run = tokio::process::Command::new("sudo")
            .args(["powermetrics", "--samplers", "cpu_power", "-i", "1000", "-n", "1"])
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| AppError::Sensor("powermetrics timed out".to_string()))??;

        if !output.status.success() {
            return Err(AppError::Sensor(format!(
                "powermetrics exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_combined_power(&stdout)
            .ok_or_else(|| AppError::Sensor("no Combined Power line in powermetrics output".to_string()))
    }
}

/// Extract the milliwatt value from the `Combined Power (CPU + GPU + ANE): N mW`
/// line. Returns None when the line is absent or malformed.
pub fn parse_combined_power(stdout: &str) -> Option<f64> {
    for line in stdout.lines() {
        if !line.contains("Combined Power") {
            continue;
        }
        let value = line.split(':').nth(1)?.split("mW").next()?.trim();
        return value.parse::<f64>().ok();
    }
    None
}

// ---------------------------------------------------------------------------
// Host sensors — sysinfo
// ---------------------------------------------------------------------------

pub struct SysinfoHost {
    system: System,
}

impl SysinfoHost {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self { system }
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSensors for SysinfoHost {
    fn utilization(&mut self) -> HostUtilization {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();

        let cpus = self.system.cpus();
        let cpu_pct = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let total = self.system.total_memory();
        let mem_pct = if total == 0 {
            0.0
        } else {
            self.system.used_memory() as f32 / total as f32 * 100.0
        };

        HostUtilization { cpu_pct, mem_pct }
    }
}

/// Linear idle→peak power model over CPU utilization.
pub fn load_to_mw(cpu_pct: f64, idle_mw: f64, peak_mw: f64) -> f64 {
    idle_mw + (cpu_pct / 100.0) * (peak_mw - idle_mw)
}

// ---------------------------------------------------------------------------
// GPU source — NVML device 0
// ---------------------------------------------------------------------------

/// NVIDIA power via NVML. Initialized once at startup; the monitoring
/// session is released when this is dropped (NVML shutdown).
pub struct NvmlGpu {
    nvml: Nvml,
}

impl NvmlGpu {
    pub fn init() -> Result<Self> {
        let nvml = Nvml::init()?;
        // Probe device 0 up front so a driverless host fails here, not mid-loop.
        nvml.device_by_index(0)?;
        Ok(Self { nvml })
    }
}

impl GpuSource for NvmlGpu {
    fn read(&mut self) -> Option<GpuReading> {
        let device = match self.nvml.device_by_index(0) {
            Ok(d) => d,
            Err(e) => {
                debug!("GPU device lookup failed: {e}");
                return None;
            }
        };
        let power_mw = device.power_usage().ok()? as f64;
        let utilization_pct = device.utilization_rates().map(|u| u.gpu).unwrap_or(0);
        Some(GpuReading { power_mw, utilization_pct })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_power_line() {
        let stdout = "\
CPU Power: 812 mW\n\
GPU Power: 102 mW\n\
Combined Power (CPU + GPU + ANE): 1234 mW\n";
        assert_eq!(parse_combined_power(stdout), Some(1234.0));
    }

    #[test]
    fn missing_or_garbled_line_yields_none() {
        assert_eq!(parse_combined_power("CPU Power: 812 mW\n"), None);
        assert_eq!(parse_combined_power("Combined Power (CPU + GPU + ANE): ??? mW"), None);
        assert_eq!(parse_combined_power(""), None);
    }

    #[test]
    fn load_model_endpoints() {
        assert!((load_to_mw(0.0, 5_000.0, 30_000.0) - 5_000.0).abs() < 1e-9);
        assert!((load_to_mw(100.0, 5_000.0, 30_000.0) - 30_000.0).abs() < 1e-9);
        assert!((load_to_mw(50.0, 5_000.0, 30_000.0) - 17_500.0).abs() < 1e-9);
    }
}
