use serde::Serialize;

use super::domain::TrafficLevel;
use crate::config::{EngineConfig, LevelThresholds};

/// Behavioural response attached to a traffic level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapingAction {
    FreeRouting,
    SoftAdvisory,
    SuggestAlternatives,
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShapingPolicy {
    pub level: TrafficLevel,
    pub action: ShapingAction,
    pub advisory: Option<&'static str>,
    pub suggest_alternatives: bool,
    pub allow_proceed: bool,
    pub gate_parking_bookings: bool,
}

/// Policy table keyed by level.
pub fn policy_for(level: TrafficLevel) -> ShapingPolicy {
    match level {
        TrafficLevel::Green => ShapingPolicy {
            level,
            action: ShapingAction::FreeRouting,
            advisory: None,
            suggest_alternatives: false,
            allow_proceed: true,
            gate_parking_bookings: false,
        },
        TrafficLevel::Yellow => ShapingPolicy {
            level,
            action: ShapingAction::SoftAdvisory,
            advisory: Some("Getting busy. Expect some waiting at entrances and parking."),
            suggest_alternatives: false,
            allow_proceed: true,
            gate_parking_bookings: false,
        },
        TrafficLevel::Orange => ShapingPolicy {
            level,
            action: ShapingAction::SuggestAlternatives,
            advisory: Some("Crowded. Consider one of the quieter alternatives nearby."),
            suggest_alternatives: true,
            allow_proceed: true,
            gate_parking_bookings: false,
        },
        TrafficLevel::Red => ShapingPolicy {
            level,
            action: ShapingAction::Redirect,
            advisory: Some("Very crowded. Please visit an alternative; new parking bookings are paused."),
            suggest_alternatives: true,
            allow_proceed: false,
            gate_parking_bookings: true,
        },
    }
}

/// Score-to-level classification and the reroute decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficShaper {
    thresholds: LevelThresholds,
}

impl Default for TrafficShaper {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TrafficShaper {
    pub fn new(thresholds: LevelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.level_thresholds)
    }

    pub fn classify(&self, score: u8) -> TrafficLevel {
        let thresholds = &self.thresholds;
        if score >= thresholds.red {
            TrafficLevel::Red
        } else if score >= thresholds.orange {
            TrafficLevel::Orange
        } else if score >= thresholds.yellow {
            TrafficLevel::Yellow
        } else {
            TrafficLevel::Green
        }
    }

    pub fn policy_for(&self, level: TrafficLevel) -> ShapingPolicy {
        policy_for(level)
    }

    pub fn policy_for_score(&self, score: u8) -> ShapingPolicy {
        policy_for(self.classify(score))
    }

    /// The only place that decides whether a destination warrants rerouting:
    /// ORANGE and RED destinations do.
    pub fn should_reroute(&self, score: u8) -> bool {
        self.classify(score) >= TrafficLevel::Orange
    }
}
