use super::super::domain::{FactorBreakdown, SignalKind, SignalSnapshot};
use super::config::ModelConfig;
use super::ModelError;

pub(crate) struct Normalised {
    pub factors: FactorBreakdown,
    pub parking_pct: Option<f64>,
}

pub(crate) fn normalise(
    snapshot: &SignalSnapshot,
    config: &ModelConfig,
) -> Result<Normalised, ModelError> {
    let neutral = config.neutral_sub_score;

    let pass_volume = checked(SignalKind::PassVolume, snapshot.pass_volume)?;
    let parking_pct = checked(SignalKind::ParkingOccupancy, snapshot.parking_occupancy_pct)?;
    let historical = checked(SignalKind::HistoricalBaseline, snapshot.historical_baseline)?;
    let reports = checked(SignalKind::ReportScore, snapshot.report_score)?;

    let factors = FactorBreakdown {
        pass_score: pass_volume
            .map(|volume| to_sub_score(volume / config.pass_capacity * 100.0))
            .unwrap_or(neutral),
        parking_score: parking_pct.map(to_sub_score).unwrap_or(neutral),
        weather_score: snapshot
            .weather
            .map(|reading| weather_severity(reading.code))
            .unwrap_or(neutral),
        historical_score: historical.map(to_sub_score).unwrap_or(neutral),
        report_score: reports.map(to_sub_score).unwrap_or(neutral),
    };

    Ok(Normalised {
        factors,
        parking_pct,
    })
}

pub(crate) fn weighted_sum(factors: &FactorBreakdown, config: &ModelConfig) -> f64 {
    let weights = &config.weights;
    f64::from(factors.pass_score) * weights.pass
        + f64::from(factors.parking_score) * weights.parking
        + f64::from(factors.weather_score) * weights.weather
        + f64::from(factors.historical_score) * weights.historical
        + f64::from(factors.report_score) * weights.reports
}

/// Maps a WMO weather code onto a 0-100 severity bucket.
pub fn weather_severity(code: u16) -> u8 {
    match code {
        0 => 0,
        1..=3 => 10,
        51..=57 | 61 | 63 | 66 => 40,
        45 | 48 => 50,
        71..=77 | 85 | 86 => 60,
        65 | 67 | 80..=82 => 70,
        95..=99 => 90,
        _ => 50,
    }
}

fn checked(signal: SignalKind, value: Option<f64>) -> Result<Option<f64>, ModelError> {
    match value {
        Some(value) if !value.is_finite() || value < 0.0 => {
            Err(ModelError::MalformedReading { signal, value })
        }
        other => Ok(other),
    }
}

fn to_sub_score(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}
