use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Stable identifier of a monitored spot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpotId(pub String);

impl SpotId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Daily opening window in local hours. `closes` is exclusive; a window that
/// closes before it opens wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub opens: u8,
    pub closes: u8,
}

impl OpeningHours {
    pub fn always() -> Self {
        Self { opens: 0, closes: 24 }
    }

    pub fn is_open_at(&self, hour: u32) -> bool {
        let hour = hour as u8;
        if self.opens <= self.closes {
            self.opens <= hour && hour < self.closes
        } else {
            hour >= self.opens || hour < self.closes
        }
    }
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self::always()
    }
}

/// Reference data for a monitored attraction and its parking facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub id: SpotId,
    pub name: String,
    pub category: String,
    /// Key used for regional signals such as weather.
    pub region: String,
    pub coordinates: Coordinates,
    pub indoor: bool,
    #[serde(default)]
    pub opening_hours: OpeningHours,
    pub parking_slots: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// WMO weather interpretation code.
    pub code: u16,
    pub temperature_c: Option<f32>,
}

/// Raw readings gathered for one spot at one instant. `None` means the
/// provider for that signal did not answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub pass_volume: Option<f64>,
    pub parking_occupancy_pct: Option<f64>,
    pub weather: Option<WeatherReading>,
    pub historical_baseline: Option<f64>,
    pub report_score: Option<f64>,
}

impl SignalSnapshot {
    pub fn missing_signals(&self) -> Vec<SignalKind> {
        let mut missing = Vec::new();
        if self.pass_volume.is_none() {
            missing.push(SignalKind::PassVolume);
        }
        if self.parking_occupancy_pct.is_none() {
            missing.push(SignalKind::ParkingOccupancy);
        }
        if self.weather.is_none() {
            missing.push(SignalKind::Weather);
        }
        if self.historical_baseline.is_none() {
            missing.push(SignalKind::HistoricalBaseline);
        }
        if self.report_score.is_none() {
            missing.push(SignalKind::ReportScore);
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    PassVolume,
    ParkingOccupancy,
    Weather,
    HistoricalBaseline,
    ReportScore,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::PassVolume,
        SignalKind::ParkingOccupancy,
        SignalKind::Weather,
        SignalKind::HistoricalBaseline,
        SignalKind::ReportScore,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::PassVolume => "pass volume",
            SignalKind::ParkingOccupancy => "parking occupancy",
            SignalKind::Weather => "weather",
            SignalKind::HistoricalBaseline => "historical baseline",
            SignalKind::ReportScore => "report score",
        }
    }

    /// Weather is read per region; every other signal is read per spot.
    pub fn is_spot_level(&self) -> bool {
        !matches!(self, SignalKind::Weather)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Discrete severity bucket derived from a congestion score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl TrafficLevel {
    pub fn label(&self) -> &'static str {
        match self {
            TrafficLevel::Green => "GREEN",
            TrafficLevel::Yellow => "YELLOW",
            TrafficLevel::Orange => "ORANGE",
            TrafficLevel::Red => "RED",
        }
    }
}

impl fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Normalised 0-100 sub-scores that fed the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub pass_score: u8,
    pub parking_score: u8,
    pub weather_score: u8,
    pub historical_score: u8,
    pub report_score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub hour_offset: u8,
    pub predicted_score: u8,
    /// 0.0 to 1.0, lower further out and around peak transitions.
    pub confidence: f64,
}

/// The live congestion record for one spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionScore {
    pub spot_id: SpotId,
    pub score: u8,
    pub level: TrafficLevel,
    pub factors: FactorBreakdown,
    pub trend: Trend,
    pub prediction: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_signals: Vec<SignalKind>,
    pub computed_at: DateTime<FixedOffset>,
}

impl CongestionScore {
    /// True when any per-spot provider failed while this score was computed.
    pub fn has_spot_signal_gaps(&self) -> bool {
        self.unavailable_signals
            .iter()
            .any(|signal| signal.is_spot_level())
    }
}
