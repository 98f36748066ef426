use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use tracing::warn;

use super::domain::{SignalKind, SignalSnapshot, Spot, SpotId, WeatherReading};

/// Failure reported by a single signal provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{signal} unavailable for {subject}: {reason}")]
pub struct SignalError {
    pub signal: SignalKind,
    pub subject: String,
    pub reason: String,
}

impl SignalError {
    pub fn new(signal: SignalKind, subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            signal,
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

/// Uniform fetch contract over the live data sources feeding the model.
pub trait SignalProvider: Send + Sync {
    /// Visit passes issued for the spot in the current hour.
    fn pass_volume(&self, spot: &SpotId) -> Result<f64, SignalError>;
    /// Parking occupancy as a percentage.
    fn parking_occupancy(&self, spot: &SpotId) -> Result<f64, SignalError>;
    fn weather(&self, region: &str) -> Result<WeatherReading, SignalError>;
    /// Typical 0-100 crowding for this hour and day of week.
    fn historical_baseline(
        &self,
        spot: &SpotId,
        hour: u32,
        weekday: Weekday,
    ) -> Result<f64, SignalError>;
    /// Community crowding reports folded into a 0-100 reading.
    fn report_score(&self, spot: &SpotId) -> Result<f64, SignalError>;
}

/// Read access to spot reference data.
pub trait SpotDirectory: Send + Sync {
    fn all_spots(&self) -> Vec<Spot>;

    fn spot_by_id(&self, id: &SpotId) -> Option<Spot>;

    fn spots_by_category(&self, category: &str) -> Vec<Spot> {
        self.all_spots()
            .into_iter()
            .filter(|spot| spot.category.eq_ignore_ascii_case(category))
            .collect()
    }

    fn spot_by_name(&self, name: &str) -> Option<Spot> {
        let name = name.trim();
        self.all_spots()
            .into_iter()
            .find(|spot| spot.name.eq_ignore_ascii_case(name))
    }
}

/// Runs one fetch round against every provider. Failures are logged and left
/// as gaps in the snapshot for the model to fill.
pub fn collect_snapshot<P>(provider: &P, spot: &Spot, at: DateTime<FixedOffset>) -> SignalSnapshot
where
    P: SignalProvider + ?Sized,
{
    SignalSnapshot {
        pass_volume: absorb(spot, provider.pass_volume(&spot.id)),
        parking_occupancy_pct: absorb(spot, provider.parking_occupancy(&spot.id)),
        weather: absorb(spot, provider.weather(&spot.region)),
        historical_baseline: absorb(
            spot,
            provider.historical_baseline(&spot.id, at.hour(), at.weekday()),
        ),
        report_score: absorb(spot, provider.report_score(&spot.id)),
    }
}

fn absorb<T>(spot: &Spot, reading: Result<T, SignalError>) -> Option<T> {
    match reading {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(spot = %spot.id, signal = %err.signal, reason = %err.reason, "signal unavailable");
            None
        }
    }
}
