use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::domain::{Prediction, SpotId, Trend};

const CONFIDENCE_STEP: f64 = 0.1;
const CONFIDENCE_FLOOR: f64 = 0.3;
const TRANSITION_PENALTY: f64 = 0.85;

/// Hour range `[start_hour, end_hour)` sharing one crowding multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakBand {
    pub label: String,
    pub start_hour: u8,
    pub end_hour: u8,
    pub multiplier: f64,
}

impl PeakBand {
    fn contains(&self, hour: u32) -> bool {
        u32::from(self.start_hour) <= hour && hour < u32::from(self.end_hour)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayCurve {
    pub bands: Vec<PeakBand>,
    pub off_peak: f64,
}

impl Default for TimeOfDayCurve {
    fn default() -> Self {
        let band = |label: &str, start_hour, end_hour, multiplier| PeakBand {
            label: label.to_string(),
            start_hour,
            end_hour,
            multiplier,
        };
        Self {
            bands: vec![
                band("morning_peak", 10, 13, 1.2),
                band("afternoon_peak", 13, 17, 1.3),
                band("evening_shoulder", 17, 20, 0.9),
            ],
            off_peak: 0.6,
        }
    }
}

impl TimeOfDayCurve {
    pub fn multiplier_at(&self, hour: u32) -> f64 {
        let hour = hour % 24;
        self.bands
            .iter()
            .find(|band| band.contains(hour))
            .map(|band| band.multiplier)
            .unwrap_or(self.off_peak)
    }

    /// True when `hour` starts a different band than the hour before it.
    pub fn is_transition(&self, hour: u32) -> bool {
        let hour = hour % 24;
        let previous = (hour + 23) % 24;
        (self.multiplier_at(hour) - self.multiplier_at(previous)).abs() > f64::EPSILON
    }
}

/// Projects a current score forward hour by hour along a time-of-day curve.
#[derive(Debug, Clone, Default)]
pub struct ForecastModel {
    curve: TimeOfDayCurve,
}

impl ForecastModel {
    pub fn forecast(
        &self,
        spot_id: &SpotId,
        current_score: u8,
        hours_ahead: u8,
        now: DateTime<FixedOffset>,
    ) -> Vec<Prediction> {
        let start_hour = now.hour();
        let predictions: Vec<Prediction> = (1..=hours_ahead)
            .map(|hour_offset| {
                let hour = (start_hour + u32::from(hour_offset)) % 24;
                let predicted = f64::from(current_score) * self.curve.multiplier_at(hour);
                Prediction {
                    hour_offset,
                    predicted_score: predicted.clamp(0.0, 100.0).round() as u8,
                    confidence: self.confidence(hour_offset, hour),
                }
            })
            .collect();

        trace!(spot = %spot_id, current_score, hours_ahead, "forecast projected");
        predictions
    }

    fn confidence(&self, hour_offset: u8, hour: u32) -> f64 {
        let mut confidence =
            (1.0 - CONFIDENCE_STEP * f64::from(hour_offset)).max(CONFIDENCE_FLOOR);
        if self.curve.is_transition(hour) {
            confidence *= TRANSITION_PENALTY;
        }
        (confidence * 100.0).round() / 100.0
    }
}

/// Direction of the next hour relative to now.
pub fn classify_trend(current_score: u8, predictions: &[Prediction]) -> Trend {
    match predictions.first() {
        Some(next) if next.predicted_score > current_score => Trend::Rising,
        Some(next) if next.predicted_score < current_score => Trend::Falling,
        _ => Trend::Stable,
    }
}
