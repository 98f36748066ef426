use serde::{Deserialize, Serialize};

/// Relative contribution of each normalised factor. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub pass: f64,
    pub parking: f64,
    pub weather: f64,
    pub historical: f64,
    pub reports: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            pass: 0.30,
            parking: 0.30,
            weather: 0.10,
            historical: 0.15,
            reports: 0.15,
        }
    }
}

impl FactorWeights {
    pub fn total(&self) -> f64 {
        self.pass + self.parking + self.weather + self.historical + self.reports
    }
}

/// Normalisation constants and the parking saturation override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub weights: FactorWeights,
    /// Passes per hour that count as a full spot.
    pub pass_capacity: f64,
    pub parking_critical_pct: f64,
    pub parking_floor_score: u8,
    /// Sub-score substituted for a signal whose provider did not answer.
    pub neutral_sub_score: u8,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            pass_capacity: 500.0,
            parking_critical_pct: 95.0,
            parking_floor_score: 90,
            neutral_sub_score: 50,
        }
    }
}
