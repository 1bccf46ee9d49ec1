use std::io::Write;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::{Config, DIAG_INTERVAL_SECS};
use crate::latency::LatencyStats;
use crate::sampler::{GpuSource, HostSensors, PowerProvider, Sampler, TickReading};
use crate::types::{DerivedMetrics, NodeIdentity, PowerMode};
use crate::uplink::UplinkClient;
use crate::valor::ValorEngine;
use crate::window::RollingWindow;

/// The single sampling stream for this process. One tick = one sample = one
/// window update = one derived-metrics computation = one optional report,
/// strictly sequential. A tick that blocks (the physical read's timeout)
/// delays the next tick by that amount.
pub struct Monitor<P, H, G> {
    sampler: Sampler<P, H, G>,
    window: RollingWindow,
    valor: ValorEngine,
    identity: NodeIdentity,
    uplink: Option<UplinkClient>,
    latency: LatencyStats,
    sample_interval: Duration,
    silent: bool,
    /// Valor accumulated across the session, reported as total_valor.
    total_valor: f64,
    ticks: u64,
    physical_ticks: u64,
    uplink_failures: u64,
    last_diag_at: Instant,
}

impl<P, H, G> Monitor<P, H, G>
where
    P: PowerProvider,
    H: HostSensors,
    G: GpuSource,
{
    pub fn new(
        cfg: &Config,
        sampler: Sampler<P, H, G>,
        identity: NodeIdentity,
        uplink: Option<UplinkClient>,
    ) -> Self {
        Self {
            sampler,
            window: RollingWindow::new(cfg.window_size),
            valor: ValorEngine::new(cfg),
            identity,
            uplink,
            latency: LatencyStats::new(),
            sample_interval: Duration::from_secs_f64(cfg.sample_interval_secs.max(0.1)),
            silent: cfg.silent,
            total_valor: 0.0,
            ticks: 0,
            physical_ticks: 0,
            uplink_failures: 0,
            last_diag_at: Instant::now(),
        }
    }

    pub fn total_valor(&self) -> f64 {
        self.total_valor
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until interrupted. Ctrl-c is observed only between ticks, so the
    /// window never records a partial sample; sensor handles are released
    /// when the sampler drops on return.
    pub async fn run(mut self) {
        let mut ticker = interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = &mut ctrl_c => {
                    break;
                }
            }
        }

        if !self.silent {
            println!();
        }
        info!(
            node_id = %self.identity.node_id,
            ticks = self.ticks,
            total_valor = self.total_valor,
            "Node disconnected cleanly"
        );
    }

    /// One full tick: sample → record → derive → display → optional report.
    pub async fn tick(&mut self) {
        let t0 = Instant::now();
        let reading = self.sampler.sample().await;
        self.latency.record(t0.elapsed());

        self.window.record(reading.sample.power_mw);
        let avg_mw = self.window.average();
        let metrics = self
            .valor
            .derive(reading.sample.power_mw, avg_mw, reading.sample.mode);

        self.total_valor += metrics.yield_value;
        self.ticks += 1;
        if reading.sample.mode == PowerMode::Physical {
            self.physical_ticks += 1;
        }

        self.render_live(&reading, &metrics);

        if let Some(uplink) = &self.uplink {
            if let Err(e) = uplink.report(&self.identity, avg_mw, self.total_valor).await {
                self.uplink_failures += 1;
                warn!("Uplink report failed (continuing locally): {e}");
            }
        }

        self.maybe_log_diagnostics();
    }

    /// Single overwritten console line, suppressed in silent mode. The
    /// durable log keeps recording either way.
    fn render_live(&self, reading: &TickReading, metrics: &DerivedMetrics) {
        if self.silent {
            return;
        }

        let mut line = format!(
            "\r [LIVE] {mode} | Power: {power:>6.0}mW | Avg: {avg:>6.0}mW | CPU: {cpu:>4.1}%",
            mode = metrics.mode,
            power = metrics.instantaneous_power_mw,
            avg = metrics.average_power_mw,
            cpu = reading.cpu_pct,
        );
        if let Some(gpu) = &reading.gpu {
            line.push_str(&format!(" | GPU: {:>3}%", gpu.utilization_pct));
        }
        line.push_str(&format!(
            " | Spread: ${spread:.6}/hr | Yield: {valor:.8} VLR",
            spread = metrics.spread_value,
            valor = self.total_valor,
        ));

        print!("{line}");
        let _ = std::io::stdout().flush();
    }

    fn maybe_log_diagnostics(&mut self) {
        if self.last_diag_at.elapsed() < Duration::from_secs(DIAG_INTERVAL_SECS) {
            return;
        }
        self.last_diag_at = Instant::now();

        let (p50, p95, p99) = self.latency.percentiles();
        info!(
            ticks = self.ticks,
            physical_ticks = self.physical_ticks,
            window_fill = self.window.len(),
            uplink_failures = self.uplink_failures,
            total_valor = self.total_valor,
            sample_p50_us = p50,
            sample_p95_us = p95,
            sample_p99_us = p99,
            "[MONITOR] 30s diag | ticks={} physical={} window={}/{} total_valor={:.8}",
            self.ticks,
            self.physical_ticks,
            self.window.len(),
            self.window.capacity(),
            self.total_valor,
        );
    }
}
