use crate::config::{Config, MW_PER_KW};
use crate::types::{DerivedMetrics, PowerMode, YieldLaw};

/// Converts measured power into the two derived numbers: a yield metric
/// (valor) and an hourly economic spread. All constants are fixed at
/// construction; there is no runtime recalibration.
///
/// Two yield laws are supported because deployed monitor generations
/// disagree (see DESIGN.md). `window_normalized` consumes the rolling
/// average; `spot_rate` consumes the instantaneous reading.
#[derive(Debug, Clone)]
pub struct ValorEngine {
    law: YieldLaw,
    window_size: usize,
    conversion_factor: f64,
    yield_rate: f64,
    market_value_per_kwh: f64,
    spot_cost_per_kwh: f64,
}

impl ValorEngine {
    pub fn new(cfg: &Config) -> Self {
        Self {
            law: cfg.yield_law,
            window_size: cfg.window_size,
            conversion_factor: cfg.conversion_factor,
            yield_rate: cfg.yield_rate,
            market_value_per_kwh: cfg.market_value_per_kwh,
            spot_cost_per_kwh: cfg.spot_cost_per_kwh,
        }
    }

    pub fn law(&self) -> YieldLaw {
        self.law
    }

    /// Per-tick yield under the configured law.
    pub fn yield_value(&self, instantaneous_mw: f64, average_mw: f64) -> f64 {
        match self.law {
            YieldLaw::WindowNormalized => {
                (average_mw * self.window_size as f64) / self.conversion_factor
            }
            YieldLaw::SpotRate => (instantaneous_mw / MW_PER_KW) * 1000.0 * self.yield_rate,
        }
    }

    /// Hourly spread ($): `power_kw * (market_value - spot_cost)`.
    /// Negative when energy costs more than the compute is worth; a valid,
    /// displayable state.
    pub fn spread(&self, power_kw: f64) -> f64 {
        power_kw * (self.market_value_per_kwh - self.spot_cost_per_kwh)
    }

    /// Fresh derived metrics for one tick: a pure function of the window
    /// state and the fixed constants.
    pub fn derive(&self, instantaneous_mw: f64, average_mw: f64, mode: PowerMode) -> DerivedMetrics {
        DerivedMetrics {
            instantaneous_power_mw: instantaneous_mw,
            average_power_mw: average_mw,
            yield_value: self.yield_value(instantaneous_mw, average_mw),
            spread_value: self.spread(instantaneous_mw / MW_PER_KW),
            mode,
        }
    }
}
