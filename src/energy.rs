//! # Energy Models
//!
//! Converts accumulated voltage samples into an energy figure.
//!
//! There is no current sensing on the bikes, so every formula here is an
//! estimate. Two models exist and the config picks one by name:
//! - `scaled_sum`: raw voltage sum divided by a constant. This is the figure
//!   historical logs were written with.
//! - `mean_power`: mean voltage x assumed current x elapsed time, in kWh.
//!
//! Neither is declared "correct"; keep both until the physics is settled.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const JOULES_PER_KWH: f64 = 3_600_000.0;

/// Running sum and count of voltage samples for one session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoltageAccumulator {
    pub sum: f64,
    pub samples: u64,
}

impl VoltageAccumulator {
    pub fn add(&mut self, voltage: f64) {
        self.sum += voltage;
        self.samples += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum / self.samples as f64)
    }
}

/// A swappable accumulator-to-energy conversion
pub trait EnergyModel: Send + Sync {
    /// Name used in config files and logs
    fn name(&self) -> &'static str;

    /// Energy in kWh for the samples collected over `elapsed`
    fn estimate(&self, voltage: &VoltageAccumulator, elapsed: Duration) -> f64;
}

/// `sum / divisor`, independent of elapsed time
#[derive(Debug, Clone, Copy)]
pub struct ScaledSum {
    pub divisor: f64,
}

impl EnergyModel for ScaledSum {
    fn name(&self) -> &'static str {
        "scaled_sum"
    }

    fn estimate(&self, voltage: &VoltageAccumulator, _elapsed: Duration) -> f64 {
        if self.divisor == 0.0 {
            return 0.0;
        }
        voltage.sum / self.divisor
    }
}

/// `mean(V) * I * t`, converted from joules to kWh
#[derive(Debug, Clone, Copy)]
pub struct MeanPower {
    pub assumed_current_amps: f64,
}

impl EnergyModel for MeanPower {
    fn name(&self) -> &'static str {
        "mean_power"
    }

    fn estimate(&self, voltage: &VoltageAccumulator, elapsed: Duration) -> f64 {
        let mean = voltage.mean().unwrap_or(0.0);
        mean * self.assumed_current_amps * elapsed.as_secs_f64() / JOULES_PER_KWH
    }
}

/// Config-file selection of the energy model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "snake_case")]
pub enum EnergyFormula {
    ScaledSum { divisor: f64 },
    MeanPower { assumed_current_amps: f64 },
}

impl Default for EnergyFormula {
    fn default() -> Self {
        EnergyFormula::ScaledSum { divisor: 1000.0 }
    }
}

impl EnergyFormula {
    pub fn build(&self) -> Box<dyn EnergyModel> {
        match *self {
            EnergyFormula::ScaledSum { divisor } => Box::new(ScaledSum { divisor }),
            EnergyFormula::MeanPower { assumed_current_amps } => {
                Box::new(MeanPower { assumed_current_amps })
            }
        }
    }
}
