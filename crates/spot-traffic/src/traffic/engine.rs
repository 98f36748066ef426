use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::{DateTime, Duration, FixedOffset};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::domain::{CongestionScore, SignalKind, Spot, SpotId, TrafficLevel};
use super::forecast::{classify_trend, ForecastModel};
use super::model::{CongestionModel, ModelError};
use super::shaping::TrafficShaper;
use super::signals::{collect_snapshot, SignalProvider, SpotDirectory};
use crate::config::EngineConfig;

/// Immutable published view of every live score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreTable {
    generation: u64,
    published_at: Option<DateTime<FixedOffset>>,
    scores: BTreeMap<SpotId, CongestionScore>,
}

impl ScoreTable {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        self.published_at
    }

    pub fn get(&self, spot_id: &SpotId) -> Option<&CongestionScore> {
        self.scores.get(spot_id)
    }

    pub fn scores(&self) -> impl Iterator<Item = &CongestionScore> {
        self.scores.values()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Keeps whichever entry was computed last.
    fn upsert(&mut self, score: CongestionScore) {
        match self.scores.get(&score.spot_id) {
            Some(existing) if existing.computed_at >= score.computed_at => {}
            _ => {
                self.scores.insert(score.spot_id.clone(), score);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub green: usize,
    pub yellow: usize,
    pub orange: usize,
    pub red: usize,
}

impl LevelCounts {
    fn record(&mut self, level: TrafficLevel) {
        match level {
            TrafficLevel::Green => self.green += 1,
            TrafficLevel::Yellow => self.yellow += 1,
            TrafficLevel::Orange => self.orange += 1,
            TrafficLevel::Red => self.red += 1,
        }
    }
}

/// Dashboard aggregate over the current table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub total_spots: usize,
    pub by_level: LevelCounts,
    pub average_score: f64,
    pub busiest_spot: Option<SpotId>,
    pub computed_at: Option<DateTime<FixedOffset>>,
}

/// Error raised by the traffic engine and the crowd router.
#[derive(Debug, thiserror::Error)]
pub enum TrafficError {
    #[error("unknown spot '{0}'")]
    InvalidSpot(String),
    #[error("malformed signal snapshot for {spot_id}: {source}")]
    MalformedSnapshot {
        spot_id: SpotId,
        #[source]
        source: ModelError,
    },
    #[error("no signal provider answered for {spot_id}")]
    SignalUnavailable { spot_id: SpotId },
}

type Callback = dyn Fn(Arc<ScoreTable>) + Send + Sync;

#[derive(Default)]
struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, Arc<Callback>>>,
}

impl SubscriberRegistry {
    fn insert(&self, callback: Arc<Callback>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).insert(id, callback);
        id
    }

    fn remove(&self, id: u64) -> bool {
        lock(&self.entries).remove(&id).is_some()
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    fn broadcast(&self, table: &Arc<ScoreTable>) {
        let callbacks: Vec<Arc<Callback>> = lock(&self.entries).values().cloned().collect();
        for callback in callbacks {
            callback(Arc::clone(table));
        }
    }
}

/// Handle returned by [`TrafficEngine::subscribe`].
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    /// Stops further deliveries. Returns false if the engine already dropped
    /// the subscriber.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.remove(self.id))
            .unwrap_or(false)
    }
}

struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owner of the live congestion table.
///
/// Reads hand out a reference to the currently published [`ScoreTable`];
/// every write builds a fresh table and swaps it in whole, so readers and
/// subscribers never see a partially refreshed view. Writers are serialised
/// and an entry is only ever replaced by one computed later.
pub struct TrafficEngine<P, D> {
    providers: Arc<P>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
    model: CongestionModel,
    forecaster: ForecastModel,
    shaper: TrafficShaper,
    config: EngineConfig,
    table: RwLock<Arc<ScoreTable>>,
    publish_gate: Mutex<()>,
    last_stamp: Mutex<Option<DateTime<FixedOffset>>>,
    subscribers: Arc<SubscriberRegistry>,
    /// Generation of the last table handed to subscribers. Held for a whole
    /// tick so deliveries never interleave.
    delivered: Mutex<u64>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl<P, D> TrafficEngine<P, D>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    pub fn new(providers: Arc<P>, directory: Arc<D>, config: EngineConfig) -> Self {
        let shaper = TrafficShaper::from_config(&config);
        Self {
            providers,
            directory,
            clock: Arc::new(SystemClock),
            model: CongestionModel::default(),
            forecaster: ForecastModel::default(),
            shaper,
            config,
            table: RwLock::new(Arc::new(ScoreTable::default())),
            publish_gate: Mutex::new(()),
            last_stamp: Mutex::new(None),
            subscribers: Arc::new(SubscriberRegistry::default()),
            delivered: Mutex::new(0),
            monitor: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_model(mut self, model: CongestionModel) -> Self {
        self.model = model;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shaper(&self) -> &TrafficShaper {
        &self.shaper
    }

    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now()
    }

    /// Currently published table. Never blocks on a refresh in progress.
    pub fn snapshot(&self) -> Arc<ScoreTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Cached score when fresh, otherwise a synchronous single-spot recompute.
    pub fn get_congestion_score(&self, spot_id: &SpotId) -> Result<CongestionScore, TrafficError> {
        if let Some(score) = self.snapshot().get(spot_id) {
            if self.is_fresh(score) {
                return Ok(score.clone());
            }
        }

        let spot = self
            .directory
            .spot_by_id(spot_id)
            .ok_or_else(|| TrafficError::InvalidSpot(spot_id.to_string()))?;

        let score = match self.score_spot(&spot) {
            Ok(score) => score,
            Err(err) => {
                self.publish(Vec::new(), &[spot.id], None);
                return Err(err);
            }
        };
        debug!(spot = %spot_id, score = score.score, "stale score recomputed");

        let table = self.publish(vec![score], &[], None);
        table
            .get(spot_id)
            .cloned()
            .ok_or_else(|| TrafficError::InvalidSpot(spot_id.to_string()))
    }

    /// Every known spot's score, recomputing stale or missing entries first.
    pub fn get_all_congestion(&self) -> Vec<CongestionScore> {
        let current = self.snapshot();
        let spots = self.directory.all_spots();

        let (refreshed, failed) = self.score_all(spots.iter().filter(|spot| {
            current
                .get(&spot.id)
                .map(|score| !self.is_fresh(score))
                .unwrap_or(true)
        }));

        let table = if refreshed.is_empty() && failed.is_empty() {
            current
        } else {
            self.publish(refreshed, &failed, None)
        };

        spots
            .iter()
            .filter_map(|spot| table.get(&spot.id).cloned())
            .collect()
    }

    /// Recomputes every spot and publishes the result as one table. Spots
    /// that cannot be scored drop out of it.
    pub fn refresh_all(&self) -> Arc<ScoreTable> {
        let spots = self.directory.all_spots();
        let (scores, failed) = self.score_all(spots.iter());
        let retain: Vec<SpotId> = spots.into_iter().map(|spot| spot.id).collect();
        self.publish(scores, &failed, Some(&retain))
    }

    pub fn region_stats(&self, region: Option<&str>) -> RegionStats {
        let table = self.snapshot();
        let in_region: Option<Vec<SpotId>> = region.map(|name| {
            self.directory
                .all_spots()
                .into_iter()
                .filter(|spot| spot.region.eq_ignore_ascii_case(name))
                .map(|spot| spot.id)
                .collect()
        });

        let scores: Vec<&CongestionScore> = table
            .scores()
            .filter(|score| {
                in_region
                    .as_ref()
                    .map(|ids| ids.contains(&score.spot_id))
                    .unwrap_or(true)
            })
            .collect();

        let mut by_level = LevelCounts::default();
        for score in &scores {
            by_level.record(score.level);
        }

        let average_score = if scores.is_empty() {
            0.0
        } else {
            let total: u32 = scores.iter().map(|score| u32::from(score.score)).sum();
            (f64::from(total) / scores.len() as f64 * 10.0).round() / 10.0
        };

        let busiest_spot = scores
            .iter()
            .max_by_key(|score| score.score)
            .map(|score| score.spot_id.clone());

        RegionStats {
            region: region.map(str::to_string),
            total_spots: scores.len(),
            by_level,
            average_score,
            busiest_spot,
            computed_at: table.published_at(),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Arc<ScoreTable>) + Send + Sync + 'static,
    {
        let id = self.subscribers.insert(Arc::new(callback));
        debug!(subscriber = id, "subscriber registered");
        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Spawns the refresh loop on the current Tokio runtime. The first tick
    /// runs immediately. Returns false when a loop is already running.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        let mut monitor = lock(&self.monitor);
        if let Some(handle) = monitor.as_ref() {
            if !handle.task.is_finished() {
                debug!("monitoring already running");
                return false;
            }
        }

        let (stop, mut stopped) = watch::channel(false);
        let weak = Arc::downgrade(self);
        let period = self.config.refresh_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                if let Err(err) = tokio::task::spawn_blocking(move || engine.run_tick()).await {
                    warn!(error = %err, "congestion tick aborted");
                }
            }
            debug!("monitoring loop exited");
        });

        *monitor = Some(MonitorHandle { stop, task });
        info!(
            interval_ms = self.config.refresh_interval_ms,
            "congestion monitoring started"
        );
        true
    }

    /// Cancels the pending timer. A tick already running finishes, but no new
    /// one starts. Returns false when nothing was running.
    pub fn stop_monitoring(&self) -> bool {
        match lock(&self.monitor).take() {
            Some(handle) => {
                let _ = handle.stop.send(true);
                info!("congestion monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.monitor)
            .as_ref()
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }

    /// Stops monitoring and drops every subscriber.
    pub fn shutdown(&self) {
        self.stop_monitoring();
        self.subscribers.clear();
    }

    fn run_tick(&self) {
        let mut delivered = lock(&self.delivered);
        let table = self.refresh_all();
        if table.generation() <= *delivered {
            debug!(
                generation = table.generation(),
                delivered = *delivered,
                "superseded tick dropped"
            );
            return;
        }
        *delivered = table.generation();
        debug!(
            generation = table.generation(),
            spots = table.len(),
            subscribers = self.subscribers.len(),
            "congestion tick published"
        );
        self.subscribers.broadcast(&table);
    }

    /// Scores each spot, returning the successes and the ids that failed.
    fn score_all<'a>(
        &self,
        spots: impl Iterator<Item = &'a Spot>,
    ) -> (Vec<CongestionScore>, Vec<SpotId>) {
        let mut scores = Vec::new();
        let mut failed = Vec::new();
        for spot in spots {
            match self.score_spot(spot) {
                Ok(score) => scores.push(score),
                Err(err) => {
                    warn!(spot = %spot.id, error = %err, "spot skipped during refresh");
                    failed.push(spot.id.clone());
                }
            }
        }
        (scores, failed)
    }

    fn score_spot(&self, spot: &Spot) -> Result<CongestionScore, TrafficError> {
        let computed_at = self.next_stamp();
        let snapshot = collect_snapshot(&*self.providers, spot, computed_at);

        let fused = self
            .model
            .compute_score(&spot.id, &snapshot)
            .map_err(|source| TrafficError::MalformedSnapshot {
                spot_id: spot.id.clone(),
                source,
            })?;

        if fused.unavailable.len() == SignalKind::ALL.len() {
            return Err(TrafficError::SignalUnavailable {
                spot_id: spot.id.clone(),
            });
        }

        let prediction =
            self.forecaster
                .forecast(&spot.id, fused.score, self.config.forecast_hours, computed_at);
        let trend = classify_trend(fused.score, &prediction);

        Ok(CongestionScore {
            spot_id: spot.id.clone(),
            score: fused.score,
            level: self.shaper.classify(fused.score),
            factors: fused.factors,
            trend,
            prediction,
            unavailable_signals: fused.unavailable,
            computed_at,
        })
    }

    fn is_fresh(&self, score: &CongestionScore) -> bool {
        // Stamps bumped past the clock read as age zero.
        match (self.clock.now() - score.computed_at).to_std() {
            Ok(age) => age < self.config.staleness(),
            Err(_) => true,
        }
    }

    /// Clock reading bumped so that no two computations share a timestamp.
    fn next_stamp(&self) -> DateTime<FixedOffset> {
        let mut last = lock(&self.last_stamp);
        let now = self.clock.now();
        let stamp = match *last {
            Some(previous) if now <= previous => previous + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Builds the next table from the current one and swaps it in. `evict`
    /// removes spots that could not be scored. With `retain`, spots missing
    /// from the list are dropped too and the publish counts as a full tick.
    fn publish(
        &self,
        scores: Vec<CongestionScore>,
        evict: &[SpotId],
        retain: Option<&[SpotId]>,
    ) -> Arc<ScoreTable> {
        let _gate = lock(&self.publish_gate);
        let current = self.snapshot();

        let mut next = ScoreTable::clone(&current);
        for spot_id in evict {
            next.scores.remove(spot_id);
        }
        if let Some(retain) = retain {
            next.scores.retain(|spot_id, _| retain.contains(spot_id));
            next.published_at = Some(self.next_stamp());
        }
        for score in scores {
            next.upsert(score);
        }
        next.generation = current.generation + 1;

        let next = Arc::new(next);
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        next
    }
}

impl<P, D> Drop for TrafficEngine<P, D> {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.monitor).take() {
            let _ = handle.stop.send(true);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
