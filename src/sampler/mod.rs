pub mod providers;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{Config, POWERMETRICS_TIMEOUT_SECS};
use crate::error::Result;
use crate::types::{PowerMode, Sample};

pub use providers::{
    load_to_mw, GpuReading, GpuSource, HostSensors, HostUtilization, NvmlGpu, PowerProvider,
    PowermetricsProvider, SysinfoHost,
};

/// Everything one tick observes: the Sample itself plus the host/GPU
/// utilization read alongside it for display and logging.
#[derive(Debug, Clone)]
pub struct TickReading {
    pub sample: Sample,
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub gpu: Option<GpuReading>,
}

/// Produces one Sample per invocation, degrading gracefully when physical
/// measurement is unavailable. Strategy selection happens once at startup
/// (`detect`); per-tick failures fall back to the load model for that tick
/// only; capability is never revoked by a single failure.
pub struct Sampler<P, H, G> {
    physical: Option<P>,
    host: H,
    gpu: Option<G>,
    idle_mw: f64,
    peak_mw: f64,
}

/// The production sensor stack.
pub type HostSampler = Sampler<PowermetricsProvider, SysinfoHost, NvmlGpu>;

impl HostSampler {
    /// Select the measurement strategy for this host. Physical capability
    /// requires Apple Silicon; GPU monitoring requires a working NVML stack.
    /// Either probe failing is fine unless `gpu_required` is set.
    pub fn detect(cfg: &Config) -> Result<Self> {
        let physical = if has_physical_meter() {
            info!("Physical power meter available (Apple Silicon)");
            Some(PowermetricsProvider::new(Duration::from_secs(
                POWERMETRICS_TIMEOUT_SECS,
            )))
        } else {
            info!("No physical power meter; using load-model simulation");
            None
        };

        let gpu = match NvmlGpu::init() {
            Ok(g) => {
                info!("NVIDIA GPU monitoring initialized");
                Some(g)
            }
            Err(e) if cfg.gpu_required => return Err(e),
            Err(e) => {
                debug!("GPU monitoring unavailable: {e}");
                None
            }
        };

        Ok(Self::with_providers(physical, SysinfoHost::new(), gpu, cfg))
    }
}

impl<P, H, G> Sampler<P, H, G>
where
    P: PowerProvider,
    H: HostSensors,
    G: GpuSource,
{
    pub fn with_providers(physical: Option<P>, host: H, gpu: Option<G>, cfg: &Config) -> Self {
        Self {
            physical,
            host,
            gpu,
            idle_mw: cfg.idle_power_mw,
            peak_mw: cfg.peak_power_mw,
        }
    }

    pub fn is_physical_capable(&self) -> bool {
        self.physical.is_some()
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    /// One tick's reading. Never fails: a physical-read error of any kind
    /// (timeout, spawn, parse, exit status) degrades to the simulated
    /// estimator for this tick, and a GPU error simply drops the GPU
    /// contribution.
    pub async fn sample(&mut self) -> TickReading {
        let util = self.host.utilization();

        let (cpu_power_mw, mode) = match self.physical.as_mut() {
            Some(provider) => match provider.read_mw().await {
                Ok(mw) => (mw.max(0.0), PowerMode::Physical),
                Err(e) => {
                    warn!("Physical read failed, simulating this tick: {e}");
                    (self.simulate(util.cpu_pct), PowerMode::Simulated)
                }
            },
            None => (self.simulate(util.cpu_pct), PowerMode::Simulated),
        };

        let gpu = self.gpu.as_mut().and_then(|g| g.read());
        let total_mw = cpu_power_mw + gpu.map_or(0.0, |g| g.power_mw);

        TickReading {
            sample: Sample::new(total_mw, mode),
            cpu_pct: util.cpu_pct,
            mem_pct: util.mem_pct,
            gpu,
        }
    }

    fn simulate(&self, cpu_pct: f32) -> f64 {
        load_to_mw(f64::from(cpu_pct), self.idle_mw, self.peak_mw)
    }
}

/// One-shot capability probe: Apple Silicon exposes package power through
/// powermetrics. Any probe failure means "no meter"; detection errors are
/// never propagated.
pub fn has_physical_meter() -> bool {
    if !cfg!(target_os = "macos") {
        return false;
    }
    match std::process::Command::new("sysctl")
        .args(["-n", "machdep.cpu.brand_string"])
        .output()
    {
        Ok(out) => String::from_utf8_lossy(&out.stdout).contains("Apple"),
        Err(e) => {
            debug!("capability probe failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    struct FixedPhysical(f64);

    impl PowerProvider for FixedPhysical {
        async fn read_mw(&mut self) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct FailingPhysical;

    impl PowerProvider for FailingPhysical {
        async fn read_mw(&mut self) -> Result<f64> {
            Err(AppError::Sensor("meter unplugged".to_string()))
        }
    }

    struct FixedHost(HostUtilization);

    impl HostSensors for FixedHost {
        fn utilization(&mut self) -> HostUtilization {
            self.0
        }
    }

    struct FixedGpu(GpuReading);

    impl GpuSource for FixedGpu {
        fn read(&mut self) -> Option<GpuReading> {
            Some(self.0)
        }
    }

    /// Stand-in for the unused generic slot.
    struct NoGpu;

    impl GpuSource for NoGpu {
        fn read(&mut self) -> Option<GpuReading> {
            None
        }
    }

    fn host(cpu_pct: f32) -> FixedHost {
        FixedHost(HostUtilization { cpu_pct, mem_pct: 40.0 })
    }

    #[tokio::test]
    async fn physical_success_is_tagged_physical() {
        let cfg = Config::default();
        let mut sampler: Sampler<_, _, NoGpu> =
            Sampler::with_providers(Some(FixedPhysical(8_500.0)), host(10.0), None, &cfg);

        let reading = sampler.sample().await;
        assert_eq!(reading.sample.mode, PowerMode::Physical);
        assert!((reading.sample.power_mw - 8_500.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failing_physical_falls_back_to_simulation() {
        let cfg = Config::default();
        let mut sampler: Sampler<_, _, NoGpu> =
            Sampler::with_providers(Some(FailingPhysical), host(50.0), None, &cfg);

        let reading = sampler.sample().await;
        assert_eq!(reading.sample.mode, PowerMode::Simulated);
        assert!(reading.sample.power_mw >= 0.0);
        // 50% load against the default 5000→30000 model
        assert!((reading.sample.power_mw - 17_500.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn no_capability_always_simulates() {
        let cfg = Config::default();
        let mut sampler: Sampler<FailingPhysical, _, NoGpu> =
            Sampler::with_providers(None, host(0.0), None, &cfg);

        let reading = sampler.sample().await;
        assert_eq!(reading.sample.mode, PowerMode::Simulated);
        assert!((reading.sample.power_mw - cfg.idle_power_mw).abs() < 1e-6);
    }

    #[tokio::test]
    async fn gpu_contribution_widens_the_total() {
        let cfg = Config::default();
        let gpu = FixedGpu(GpuReading { power_mw: 2_000.0, utilization_pct: 35 });
        let mut sampler =
            Sampler::with_providers(Some(FixedPhysical(8_000.0)), host(10.0), Some(gpu), &cfg);

        let reading = sampler.sample().await;
        assert!((reading.sample.power_mw - 10_000.0).abs() < 1e-9);
        assert_eq!(reading.gpu.unwrap().utilization_pct, 35);
        // GPU contribution does not change the CPU measurement mode
        assert_eq!(reading.sample.mode, PowerMode::Physical);
    }
}
