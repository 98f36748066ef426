use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::domain::{CongestionScore, Coordinates, SpotId, TrafficLevel};
use super::engine::{RegionStats, TrafficEngine};
use super::redirect::{CrowdRouter, RerouteDecision};
use super::shaping::ShapingPolicy;
use super::signals::{SignalProvider, SpotDirectory};
use crate::error::AppError;

pub struct TrafficState<P, D> {
    pub engine: Arc<TrafficEngine<P, D>>,
    pub router: Arc<CrowdRouter<P, D>>,
}

impl<P, D> Clone for TrafficState<P, D> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            router: Arc::clone(&self.router),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CongestionTableView {
    pub scores: Vec<CongestionScore>,
    /// Poll interval hint for clients without a push channel.
    pub refresh_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RerouteQuery {
    pub destination: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ShapingView {
    pub score: u8,
    pub level: TrafficLevel,
    pub policy: ShapingPolicy,
}

/// Router builder exposing the congestion table, stats and reroute checks.
pub fn traffic_router<P, D>(engine: Arc<TrafficEngine<P, D>>) -> Router
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    let router = Arc::new(CrowdRouter::new(Arc::clone(&engine)));
    Router::new()
        .route("/api/v1/congestion", get(list_handler::<P, D>))
        .route("/api/v1/congestion/stats", get(stats_handler::<P, D>))
        .route("/api/v1/congestion/:spot_id", get(score_handler::<P, D>))
        .route("/api/v1/reroute", get(reroute_handler::<P, D>))
        .route("/api/v1/shaping/:score", get(shaping_handler::<P, D>))
        .with_state(TrafficState { engine, router })
}

/// Runs provider-backed work on the blocking pool.
async fn off_runtime<S, T, F>(target: &Arc<S>, work: F) -> Result<T, AppError>
where
    S: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> T + Send + 'static,
{
    let target = Arc::clone(target);
    tokio::task::spawn_blocking(move || work(&target))
        .await
        .map_err(|err| AppError::Server(axum::Error::new(err)))
}

pub(crate) async fn list_handler<P, D>(
    State(state): State<TrafficState<P, D>>,
) -> Result<Json<CongestionTableView>, AppError>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    let scores = off_runtime(&state.engine, |engine| engine.get_all_congestion()).await?;
    Ok(Json(CongestionTableView {
        scores,
        refresh_interval_ms: state.engine.config().refresh_interval_ms,
    }))
}

pub(crate) async fn score_handler<P, D>(
    State(state): State<TrafficState<P, D>>,
    Path(spot_id): Path<String>,
) -> Result<Json<CongestionScore>, AppError>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    let score = off_runtime(&state.engine, move |engine| {
        engine.get_congestion_score(&SpotId(spot_id))
    })
    .await??;
    Ok(Json(score))
}

pub(crate) async fn stats_handler<P, D>(
    State(state): State<TrafficState<P, D>>,
    Query(query): Query<StatsQuery>,
) -> Json<RegionStats>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    Json(state.engine.region_stats(query.region.as_deref()))
}

pub(crate) async fn reroute_handler<P, D>(
    State(state): State<TrafficState<P, D>>,
    Query(query): Query<RerouteQuery>,
) -> Result<Json<RerouteDecision>, AppError>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    let origin = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "lat and lng must be supplied together".to_string(),
            ))
        }
    };

    let decision = off_runtime(&state.router, move |router| {
        router.check_reroute_from(&query.destination, origin)
    })
    .await??;
    Ok(Json(decision))
}

pub(crate) async fn shaping_handler<P, D>(
    State(state): State<TrafficState<P, D>>,
    Path(score): Path<u8>,
) -> Result<Json<ShapingView>, AppError>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    if score > 100 {
        return Err(AppError::BadRequest(format!(
            "score must be between 0 and 100, got {score}"
        )));
    }

    let policy = state.engine.shaper().policy_for_score(score);
    Ok(Json(ShapingView {
        score,
        level: policy.level,
        policy,
    }))
}
