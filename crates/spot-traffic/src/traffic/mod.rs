//! Congestion scoring, forecasting, traffic shaping and crowd redirection
//! for monitored spots.
//!
//! Signals flow one way: providers feed the [`CongestionModel`], the
//! [`TrafficEngine`] caches and publishes the results, and subscribers or
//! the [`CrowdRouter`] consume them.

pub mod clock;
pub mod domain;
pub mod engine;
pub mod forecast;
pub mod model;
pub mod redirect;
pub mod router;
pub mod shaping;
pub mod signals;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    CongestionScore, Coordinates, FactorBreakdown, OpeningHours, Prediction, SignalKind,
    SignalSnapshot, Spot, SpotId, TrafficLevel, Trend, WeatherReading,
};
pub use engine::{LevelCounts, RegionStats, ScoreTable, Subscription, TrafficEngine, TrafficError};
pub use forecast::{classify_trend, ForecastModel, PeakBand, TimeOfDayCurve};
pub use model::{CongestionModel, FactorWeights, FusedScore, ModelConfig, ModelError};
pub use redirect::{AlternativeSuggestion, CrowdRouter, RerouteDecision, ScoredCandidate};
pub use router::traffic_router;
pub use shaping::{policy_for, ShapingAction, ShapingPolicy, TrafficShaper};
pub use signals::{collect_snapshot, SignalError, SignalProvider, SpotDirectory};
