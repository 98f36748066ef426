mod config;
mod rules;

pub use config::{FactorWeights, ModelConfig};
pub use rules::weather_severity;

use super::domain::{FactorBreakdown, SignalKind, SignalSnapshot, SpotId};
use serde::Serialize;
use tracing::debug;

const WEIGHT_TOLERANCE: f64 = 1e-3;

/// Fuses a snapshot of raw signals into a single 0-100 congestion score.
///
/// The model is deterministic: identical snapshots always produce identical
/// output. Missing readings fall back to the configured neutral sub-score and
/// are reported back so callers can judge how far to trust the result.
#[derive(Debug, Clone, Default)]
pub struct CongestionModel {
    config: ModelConfig,
}

impl CongestionModel {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let total = config.weights.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ModelError::InvalidWeights(total));
        }
        if !(config.pass_capacity.is_finite() && config.pass_capacity > 0.0) {
            return Err(ModelError::InvalidCapacity(config.pass_capacity));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn compute_score(
        &self,
        spot_id: &SpotId,
        snapshot: &SignalSnapshot,
    ) -> Result<FusedScore, ModelError> {
        let normalised = rules::normalise(snapshot, &self.config)?;
        let composite = rules::weighted_sum(&normalised.factors, &self.config)
            .clamp(0.0, 100.0)
            .round() as u8;

        let saturated = normalised
            .parking_pct
            .map(|pct| pct >= self.config.parking_critical_pct)
            .unwrap_or(false);
        let score = if saturated {
            composite.max(self.config.parking_floor_score)
        } else {
            composite
        };

        let unavailable = snapshot.missing_signals();
        debug!(
            spot = %spot_id,
            score,
            composite,
            saturated,
            missing = unavailable.len(),
            "congestion score fused"
        );

        Ok(FusedScore {
            score,
            factors: normalised.factors,
            unavailable,
        })
    }
}

/// Model output before trend and forecast are attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedScore {
    pub score: u8,
    pub factors: FactorBreakdown,
    pub unavailable: Vec<SignalKind>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("factor weights must sum to 1.0, got {0:.3}")]
    InvalidWeights(f64),
    #[error("pass capacity must be positive, got {0}")]
    InvalidCapacity(f64),
    #[error("{signal} reading {value} is not a finite non-negative number")]
    MalformedReading { signal: SignalKind, value: f64 },
}
