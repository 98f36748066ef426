use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Timelike;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{CongestionScore, Coordinates, Spot, SpotId, TrafficLevel};
use super::engine::{TrafficEngine, TrafficError};
use super::shaping::ShapingPolicy;
use super::signals::{SignalProvider, SpotDirectory};

/// A quieter spot offered in place of a crowded destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeSuggestion {
    pub original_spot_id: SpotId,
    pub suggested_spot: Spot,
    pub crowd_score: u8,
    pub level: TrafficLevel,
    /// Estimate from the crowd score, not a live booking count.
    pub parking_available: u32,
    pub reason: String,
    /// Positive when the suggestion is farther from the reference point.
    pub distance_diff_km: f64,
}

/// Outcome of a reroute check. `should_reroute` with no alternatives means
/// the visitor should be warned but has nowhere better to go.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerouteDecision {
    pub destination: Spot,
    pub destination_score: CongestionScore,
    pub should_reroute: bool,
    pub policy: ShapingPolicy,
    pub alternatives: Vec<AlternativeSuggestion>,
}

impl RerouteDecision {
    pub fn selected(&self) -> Option<&AlternativeSuggestion> {
        self.alternatives.first()
    }

    pub fn no_alternative_found(&self) -> bool {
        self.should_reroute && self.alternatives.is_empty()
    }
}

/// Candidate that survived scoring, ready for ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub spot: Spot,
    pub score: CongestionScore,
}

/// Decides per destination whether to redirect and where to.
pub struct CrowdRouter<P, D> {
    engine: Arc<TrafficEngine<P, D>>,
}

impl<P, D> CrowdRouter<P, D>
where
    P: SignalProvider + 'static,
    D: SpotDirectory + 'static,
{
    pub fn new(engine: Arc<TrafficEngine<P, D>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<TrafficEngine<P, D>> {
        &self.engine
    }

    pub fn check_reroute(&self, destination: &str) -> Result<RerouteDecision, TrafficError> {
        self.check_reroute_from(destination, None)
    }

    /// Like [`check_reroute`](Self::check_reroute), measuring distances from
    /// `origin` instead of the destination itself.
    pub fn check_reroute_from(
        &self,
        destination: &str,
        origin: Option<Coordinates>,
    ) -> Result<RerouteDecision, TrafficError> {
        let destination = self.resolve(destination)?;
        let destination_score = self.engine.get_congestion_score(&destination.id)?;
        let shaper = self.engine.shaper();
        let policy = shaper.policy_for(destination_score.level);

        if !shaper.should_reroute(destination_score.score) {
            debug!(
                spot = %destination.id,
                score = destination_score.score,
                "no reroute needed"
            );
            return Ok(RerouteDecision {
                destination,
                destination_score,
                should_reroute: false,
                policy,
                alternatives: Vec::new(),
            });
        }

        let candidates = self.scored_candidates(&destination);
        let reference = origin.unwrap_or(destination.coordinates);
        let config = self.engine.config();
        let alternatives = select_alternatives(
            &destination,
            &destination_score,
            reference,
            candidates,
            config.alternative_cutoff,
            config.max_alternatives,
        );

        info!(
            spot = %destination.id,
            score = destination_score.score,
            alternatives = alternatives.len(),
            selected = alternatives
                .first()
                .map(|alternative| alternative.suggested_spot.id.as_str())
                .unwrap_or("none"),
            "reroute evaluated"
        );

        Ok(RerouteDecision {
            destination,
            destination_score,
            should_reroute: true,
            policy,
            alternatives,
        })
    }

    fn resolve(&self, destination: &str) -> Result<Spot, TrafficError> {
        let directory = self.engine.directory();
        directory
            .spot_by_name(destination)
            .or_else(|| directory.spot_by_id(&SpotId::new(destination.trim())))
            .ok_or_else(|| TrafficError::InvalidSpot(destination.to_string()))
    }

    /// Same-category spots open right now, each with a usable score.
    fn scored_candidates(&self, destination: &Spot) -> Vec<ScoredCandidate> {
        let hour = self.engine.now().hour();

        self.engine
            .directory()
            .spots_by_category(&destination.category)
            .into_iter()
            .filter(|spot| spot.id != destination.id)
            .filter(|spot| spot.opening_hours.is_open_at(hour))
            .filter_map(|spot| match self.engine.get_congestion_score(&spot.id) {
                Ok(score) if score.has_spot_signal_gaps() => {
                    warn!(
                        spot = %spot.id,
                        missing = ?score.unavailable_signals,
                        "candidate skipped, signals unavailable"
                    );
                    None
                }
                Ok(score) => Some(ScoredCandidate { spot, score }),
                Err(err) => {
                    warn!(spot = %spot.id, error = %err, "candidate skipped");
                    None
                }
            })
            .collect()
    }
}

/// Filters candidates to those materially better than `cutoff`, ranks them
/// by score then distance from `reference`, and builds suggestions.
pub fn select_alternatives(
    destination: &Spot,
    destination_score: &CongestionScore,
    reference: Coordinates,
    candidates: Vec<ScoredCandidate>,
    cutoff: u8,
    limit: usize,
) -> Vec<AlternativeSuggestion> {
    let destination_distance = reference.distance_km(&destination.coordinates);

    let mut ranked: Vec<(ScoredCandidate, f64)> = candidates
        .into_iter()
        .filter(|candidate| candidate.spot.id != destination.id)
        .filter(|candidate| candidate.score.score < cutoff)
        .map(|candidate| {
            let distance = reference.distance_km(&candidate.spot.coordinates);
            (candidate, distance)
        })
        .collect();

    ranked.sort_by(|(left, left_km), (right, right_km)| {
        left.score
            .score
            .cmp(&right.score.score)
            .then_with(|| left_km.partial_cmp(right_km).unwrap_or(Ordering::Equal))
            .then_with(|| left.spot.id.cmp(&right.spot.id))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|(candidate, distance)| {
            let ScoredCandidate { spot, score } = candidate;
            AlternativeSuggestion {
                original_spot_id: destination.id.clone(),
                parking_available: estimate_parking(spot.parking_slots, score.score),
                reason: format!(
                    "{} is {} ({}) while {} is {} ({})",
                    spot.name,
                    score.level,
                    score.score,
                    destination.name,
                    destination_score.level,
                    destination_score.score
                ),
                distance_diff_km: round_km(distance - destination_distance),
                crowd_score: score.score,
                level: score.level,
                suggested_spot: spot,
            }
        })
        .collect()
}

/// `total_slots × (1 − score/100)`, rounded.
pub fn estimate_parking(total_slots: u32, score: u8) -> u32 {
    let free_share = 1.0 - f64::from(score.min(100)) / 100.0;
    (f64::from(total_slots) * free_share).round() as u32
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}
