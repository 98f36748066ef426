use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, FixedOffset, TimeZone, Weekday};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::traffic::domain::{
    Coordinates, OpeningHours, SignalKind, Spot, SpotId, WeatherReading,
};
use crate::traffic::engine::TrafficEngine;
use crate::traffic::model::{CongestionModel, FactorWeights, ModelConfig};
use crate::traffic::signals::{SignalError, SignalProvider, SpotDirectory};
use crate::traffic::ManualClock;

pub(super) type TestEngine = TrafficEngine<FakeSignals, MemoryDirectory>;

/// Saturday 2025-05-03 at `hour`:00 in Korea Standard Time.
pub(super) fn at(hour: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(9 * 3600)
        .expect("valid offset")
        .with_ymd_and_hms(2025, 5, 3, hour, 0, 0)
        .single()
        .expect("unambiguous time")
}

pub(super) fn spot(id: &str, name: &str, category: &str, lat: f64, lng: f64) -> Spot {
    Spot {
        id: SpotId::new(id),
        name: name.to_string(),
        category: category.to_string(),
        region: "jeju".to_string(),
        coordinates: Coordinates::new(lat, lng),
        indoor: false,
        opening_hours: OpeningHours::always(),
        parking_slots: 200,
    }
}

pub(super) fn hyeopjae() -> Spot {
    spot("hyeopjae", "Hyeopjae Beach", "beach", 33.3940, 126.2397)
}

pub(super) fn gwakji() -> Spot {
    spot("gwakji", "Gwakji Beach", "beach", 33.4506, 126.3047)
}

pub(super) fn iho() -> Spot {
    spot("iho", "Iho Tewoo Beach", "beach", 33.4977, 126.4531)
}

pub(super) fn hamdeok() -> Spot {
    spot("hamdeok", "Hamdeok Beach", "beach", 33.5432, 126.6697)
}

pub(super) fn folk_village() -> Spot {
    spot("folk-village", "Jeju Folk Village", "museum", 33.3224, 126.8426)
}

pub(super) fn beaches() -> Vec<Spot> {
    vec![hyeopjae(), gwakji(), iho(), hamdeok(), folk_village()]
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Readings {
    pub pass: Option<f64>,
    pub parking: Option<f64>,
    pub historical: Option<f64>,
    pub reports: Option<f64>,
}

impl Readings {
    /// Inputs that the flat test model fuses into exactly `score`.
    pub(super) fn uniform(score: f64) -> Self {
        Self {
            pass: Some(score * 5.0),
            parking: Some(score),
            historical: Some(score),
            reports: Some(score),
        }
    }
}

#[derive(Default)]
pub(super) struct FakeSignals {
    readings: Mutex<HashMap<SpotId, Readings>>,
    failed_regions: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
}

impl FakeSignals {
    pub(super) fn set_score(&self, id: &str, score: f64) {
        self.set(id, Readings::uniform(score));
    }

    pub(super) fn set(&self, id: &str, readings: Readings) {
        self.readings
            .lock()
            .expect("readings mutex poisoned")
            .insert(SpotId::new(id), readings);
    }

    /// Takes every per-spot feed for `id` offline.
    pub(super) fn forget(&self, id: &str) {
        self.readings
            .lock()
            .expect("readings mutex poisoned")
            .remove(&SpotId::new(id));
    }

    pub(super) fn fail_weather(&self, region: &str) {
        self.failed_regions
            .lock()
            .expect("regions mutex poisoned")
            .insert(region.to_string());
    }

    /// Number of fetch rounds served so far.
    pub(super) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn reading(
        &self,
        spot: &SpotId,
        signal: SignalKind,
        pick: impl Fn(&Readings) -> Option<f64>,
    ) -> Result<f64, SignalError> {
        let guard = self.readings.lock().expect("readings mutex poisoned");
        guard
            .get(spot)
            .and_then(pick)
            .ok_or_else(|| SignalError::new(signal, spot.as_str(), "sensor offline"))
    }
}

impl SignalProvider for FakeSignals {
    fn pass_volume(&self, spot: &SpotId) -> Result<f64, SignalError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.reading(spot, SignalKind::PassVolume, |r| r.pass)
    }

    fn parking_occupancy(&self, spot: &SpotId) -> Result<f64, SignalError> {
        self.reading(spot, SignalKind::ParkingOccupancy, |r| r.parking)
    }

    fn weather(&self, region: &str) -> Result<WeatherReading, SignalError> {
        if self
            .failed_regions
            .lock()
            .expect("regions mutex poisoned")
            .contains(region)
        {
            return Err(SignalError::new(SignalKind::Weather, region, "feed timeout"));
        }
        Ok(WeatherReading {
            code: 0,
            temperature_c: Some(22.0),
        })
    }

    fn historical_baseline(
        &self,
        spot: &SpotId,
        _hour: u32,
        _weekday: Weekday,
    ) -> Result<f64, SignalError> {
        self.reading(spot, SignalKind::HistoricalBaseline, |r| r.historical)
    }

    fn report_score(&self, spot: &SpotId) -> Result<f64, SignalError> {
        self.reading(spot, SignalKind::ReportScore, |r| r.reports)
    }
}

pub(super) struct MemoryDirectory {
    spots: Vec<Spot>,
}

impl MemoryDirectory {
    pub(super) fn new(spots: Vec<Spot>) -> Self {
        Self { spots }
    }
}

impl SpotDirectory for MemoryDirectory {
    fn all_spots(&self) -> Vec<Spot> {
        self.spots.clone()
    }

    fn spot_by_id(&self, id: &SpotId) -> Option<Spot> {
        self.spots.iter().find(|spot| &spot.id == id).cloned()
    }
}

/// Model without a weather term, so uniform readings fuse to their own value.
pub(super) fn flat_model() -> CongestionModel {
    CongestionModel::new(ModelConfig {
        weights: FactorWeights {
            pass: 0.3,
            parking: 0.3,
            weather: 0.0,
            historical: 0.2,
            reports: 0.2,
        },
        ..ModelConfig::default()
    })
    .expect("weights sum to one")
}

pub(super) fn test_config() -> EngineConfig {
    EngineConfig::default()
}

pub(super) struct Harness {
    pub engine: Arc<TestEngine>,
    pub signals: Arc<FakeSignals>,
    pub clock: Arc<ManualClock>,
}

pub(super) fn harness(spots: Vec<Spot>) -> Harness {
    harness_with(spots, test_config(), at(9))
}

pub(super) fn harness_with(
    spots: Vec<Spot>,
    config: EngineConfig,
    now: DateTime<FixedOffset>,
) -> Harness {
    let signals = Arc::new(FakeSignals::default());
    let clock = Arc::new(ManualClock::new(now));
    let engine = TrafficEngine::new(
        Arc::clone(&signals),
        Arc::new(MemoryDirectory::new(spots)),
        config,
    )
    .with_clock(clock.clone())
    .with_model(flat_model());

    Harness {
        engine: Arc::new(engine),
        signals,
        clock,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
