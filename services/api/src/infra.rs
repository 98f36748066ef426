use chrono::{DateTime, FixedOffset, Weekday};
use metrics_exporter_prometheus::PrometheusHandle;
use spot_traffic::config::EngineConfig;
use spot_traffic::traffic::{
    Coordinates, ManualClock, OpeningHours, SignalError, SignalKind, SignalProvider, Spot,
    SpotDirectory, SpotId, TrafficEngine, WeatherReading,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Reference data held in memory for the lifetime of the process.
#[derive(Default, Clone)]
pub(crate) struct InMemorySpotDirectory {
    spots: Arc<Vec<Spot>>,
}

impl InMemorySpotDirectory {
    pub(crate) fn new(spots: Vec<Spot>) -> Self {
        Self {
            spots: Arc::new(spots),
        }
    }
}

impl SpotDirectory for InMemorySpotDirectory {
    fn all_spots(&self) -> Vec<Spot> {
        self.spots.as_ref().clone()
    }

    fn spot_by_id(&self, id: &SpotId) -> Option<Spot> {
        self.spots.iter().find(|spot| &spot.id == id).cloned()
    }
}

/// Typical load for a spot, used to synthesise readings until live feeds
/// are wired in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpotProfile {
    pub(crate) passes_per_hour: f64,
    pub(crate) parking_pct: f64,
    pub(crate) report_score: f64,
    pub(crate) weekend_boost: f64,
}

/// Deterministic stand-in for the pass, parking, weather and report feeds.
#[derive(Default)]
pub(crate) struct SeededSignalProvider {
    profiles: RwLock<HashMap<SpotId, SpotProfile>>,
    weather: RwLock<HashMap<String, WeatherReading>>,
}

impl SeededSignalProvider {
    pub(crate) fn set_profile(&self, id: &str, profile: SpotProfile) {
        self.profiles
            .write()
            .expect("profile lock poisoned")
            .insert(SpotId::new(id), profile);
    }

    pub(crate) fn set_weather(&self, region: &str, reading: WeatherReading) {
        self.weather
            .write()
            .expect("weather lock poisoned")
            .insert(region.to_string(), reading);
    }

    fn profile(&self, spot: &SpotId, signal: SignalKind) -> Result<SpotProfile, SignalError> {
        self.profiles
            .read()
            .expect("profile lock poisoned")
            .get(spot)
            .copied()
            .ok_or_else(|| SignalError::new(signal, spot.as_str(), "no feed registered"))
    }
}

impl SignalProvider for SeededSignalProvider {
    fn pass_volume(&self, spot: &SpotId) -> Result<f64, SignalError> {
        self.profile(spot, SignalKind::PassVolume)
            .map(|profile| profile.passes_per_hour)
    }

    fn parking_occupancy(&self, spot: &SpotId) -> Result<f64, SignalError> {
        self.profile(spot, SignalKind::ParkingOccupancy)
            .map(|profile| profile.parking_pct)
    }

    fn weather(&self, region: &str) -> Result<WeatherReading, SignalError> {
        self.weather
            .read()
            .expect("weather lock poisoned")
            .get(region)
            .copied()
            .ok_or_else(|| SignalError::new(SignalKind::Weather, region, "no feed registered"))
    }

    fn historical_baseline(
        &self,
        spot: &SpotId,
        hour: u32,
        weekday: Weekday,
    ) -> Result<f64, SignalError> {
        let profile = self.profile(spot, SignalKind::HistoricalBaseline)?;
        let hourly = match hour {
            10..=12 => 65.0,
            13..=16 => 75.0,
            17..=19 => 50.0,
            7..=9 => 35.0,
            _ => 10.0,
        };
        let boost = match weekday {
            Weekday::Sat | Weekday::Sun => profile.weekend_boost,
            _ => 1.0,
        };
        Ok((hourly * boost).min(100.0))
    }

    fn report_score(&self, spot: &SpotId) -> Result<f64, SignalError> {
        self.profile(spot, SignalKind::ReportScore)
            .map(|profile| profile.report_score)
    }
}

pub(crate) fn seed_spots() -> Vec<Spot> {
    let daytime = OpeningHours {
        opens: 9,
        closes: 18,
    };
    vec![
        Spot {
            id: SpotId::new("hyeopjae"),
            name: "Hyeopjae Beach".to_string(),
            category: "beach".to_string(),
            region: "jeju".to_string(),
            coordinates: Coordinates::new(33.3940, 126.2397),
            indoor: false,
            opening_hours: OpeningHours::always(),
            parking_slots: 320,
        },
        Spot {
            id: SpotId::new("gwakji"),
            name: "Gwakji Beach".to_string(),
            category: "beach".to_string(),
            region: "jeju".to_string(),
            coordinates: Coordinates::new(33.4506, 126.3047),
            indoor: false,
            opening_hours: OpeningHours::always(),
            parking_slots: 180,
        },
        Spot {
            id: SpotId::new("iho"),
            name: "Iho Tewoo Beach".to_string(),
            category: "beach".to_string(),
            region: "jeju".to_string(),
            coordinates: Coordinates::new(33.4977, 126.4531),
            indoor: false,
            opening_hours: OpeningHours::always(),
            parking_slots: 250,
        },
        Spot {
            id: SpotId::new("hamdeok"),
            name: "Hamdeok Beach".to_string(),
            category: "beach".to_string(),
            region: "jeju".to_string(),
            coordinates: Coordinates::new(33.5432, 126.6697),
            indoor: false,
            opening_hours: OpeningHours::always(),
            parking_slots: 400,
        },
        Spot {
            id: SpotId::new("seongsan"),
            name: "Seongsan Ilchulbong".to_string(),
            category: "nature".to_string(),
            region: "seogwipo".to_string(),
            coordinates: Coordinates::new(33.4581, 126.9425),
            indoor: false,
            opening_hours: OpeningHours {
                opens: 7,
                closes: 20,
            },
            parking_slots: 500,
        },
        Spot {
            id: SpotId::new("cheonjiyeon"),
            name: "Cheonjiyeon Waterfall".to_string(),
            category: "nature".to_string(),
            region: "seogwipo".to_string(),
            coordinates: Coordinates::new(33.2470, 126.5545),
            indoor: false,
            opening_hours: OpeningHours {
                opens: 9,
                closes: 22,
            },
            parking_slots: 220,
        },
        Spot {
            id: SpotId::new("jeongbang"),
            name: "Jeongbang Waterfall".to_string(),
            category: "nature".to_string(),
            region: "seogwipo".to_string(),
            coordinates: Coordinates::new(33.2449, 126.5718),
            indoor: false,
            opening_hours: daytime,
            parking_slots: 150,
        },
        Spot {
            id: SpotId::new("folk-village"),
            name: "Jeju Folk Village".to_string(),
            category: "museum".to_string(),
            region: "seogwipo".to_string(),
            coordinates: Coordinates::new(33.3224, 126.8426),
            indoor: true,
            opening_hours: daytime,
            parking_slots: 300,
        },
        Spot {
            id: SpotId::new("stone-park"),
            name: "Jeju Stone Park".to_string(),
            category: "museum".to_string(),
            region: "jeju".to_string(),
            coordinates: Coordinates::new(33.4500, 126.6620),
            indoor: true,
            opening_hours: daytime,
            parking_slots: 260,
        },
    ]
}

pub(crate) fn seed_signals() -> SeededSignalProvider {
    let provider = SeededSignalProvider::default();
    let profile = |passes_per_hour, parking_pct, report_score| SpotProfile {
        passes_per_hour,
        parking_pct,
        report_score,
        weekend_boost: 1.25,
    };

    provider.set_profile("hyeopjae", profile(470.0, 96.0, 85.0));
    provider.set_profile("gwakji", profile(120.0, 35.0, 20.0));
    provider.set_profile("iho", profile(210.0, 55.0, 30.0));
    provider.set_profile("hamdeok", profile(380.0, 82.0, 70.0));
    provider.set_profile("seongsan", profile(520.0, 91.0, 80.0));
    provider.set_profile("cheonjiyeon", profile(150.0, 40.0, 25.0));
    provider.set_profile("jeongbang", profile(90.0, 30.0, 15.0));
    provider.set_profile("folk-village", profile(60.0, 20.0, 10.0));
    provider.set_profile("stone-park", profile(45.0, 15.0, 5.0));

    provider.set_weather(
        "jeju",
        WeatherReading {
            code: 2,
            temperature_c: Some(23.5),
        },
    );
    provider.set_weather(
        "seogwipo",
        WeatherReading {
            code: 61,
            temperature_c: Some(21.0),
        },
    );
    provider
}

pub(crate) type SeededEngine = TrafficEngine<SeededSignalProvider, InMemorySpotDirectory>;

/// Engine over the seeded feeds. `at` pins the clock for reproducible output.
pub(crate) fn build_engine(
    config: EngineConfig,
    at: Option<DateTime<FixedOffset>>,
) -> Arc<SeededEngine> {
    let engine = TrafficEngine::new(
        Arc::new(seed_signals()),
        Arc::new(InMemorySpotDirectory::new(seed_spots())),
        config,
    );
    let engine = match at {
        Some(at) => engine.with_clock(Arc::new(ManualClock::new(at))),
        None => engine,
    };
    Arc::new(engine)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|err| format!("invalid timestamp '{value}': {err}; expected RFC 3339"))
}
