//! The heuristic check battery.
//!
//! Checks are pure analyzers over an event plus the player's history. They
//! never block, never retain context references past one call, and report
//! failure through [`CheckError`] so a broken check costs one result, not
//! the event.

use std::collections::BTreeMap;

use thiserror::Error;
use vigil_stats::bound_confidence;

use crate::{
    config::DetectionConfig,
    context::{CombatContext, PlayerContext},
    event::{AttackEvent, MovementEvent},
    features::Features,
};

pub use aimbot::CombatAimbotCheck;
pub use autoclicker::CombatAutoclickerCheck;
pub use drift::PredictionDriftCheck;
pub use movement::MovementConsistencyCheck;
pub use reach::CombatReachCheck;
pub use timing::PacketTimingCheck;

mod aimbot;
mod autoclicker;
mod drift;
mod movement;
mod reach;
mod timing;

/// Broad family a check belongs to, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCategory {
    Movement,
    Timing,
    Combat,
}

impl CheckCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Movement => "movement",
            Self::Timing => "timing",
            Self::Combat => "combat",
        }
    }
}

/// Diagnostic key/value pairs attached to a result.
pub type Explanation = BTreeMap<&'static str, String>;

/// Outcome of one check over one event.
///
/// Confidence and severity are clamped into `[0, 1]` at construction;
/// intermediate scores may run hotter but never escape this type.
#[derive(Debug, Clone)]
pub struct CheckResult {
    check: &'static str,
    confidence: f64,
    severity: f64,
    explanation: Explanation,
}

impl CheckResult {
    /// Nothing to report.
    #[must_use]
    pub const fn clean(check: &'static str) -> Self {
        Self {
            check,
            confidence: 0.0,
            severity: 0.0,
            explanation: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn flagged(
        check: &'static str,
        confidence: f64,
        severity: f64,
        explanation: Explanation,
    ) -> Self {
        Self {
            check,
            confidence: bound_confidence(confidence),
            severity: bound_confidence(severity),
            explanation,
        }
    }

    #[must_use]
    pub const fn check(&self) -> &'static str {
        self.check
    }

    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    #[must_use]
    pub const fn severity(&self) -> f64 {
        self.severity
    }

    #[must_use]
    pub const fn explanation(&self) -> &Explanation {
        &self.explanation
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.confidence == 0.0 && self.explanation.is_empty()
    }
}

/// A check computed something it cannot stand behind. The event survives;
/// the result is dropped from aggregation.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("non-finite {quantity} while analyzing {check}")]
    NonFinite {
        check: &'static str,
        quantity: &'static str,
    },
}

/// Analyzer over movement telemetry.
pub trait MovementCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> CheckCategory;
    fn is_enabled(&self) -> bool;
    fn weight(&self) -> f64;
    fn configure(&mut self, config: &DetectionConfig);
    fn analyze(
        &self,
        event: &MovementEvent,
        features: &Features,
        ctx: &PlayerContext,
    ) -> Result<CheckResult, CheckError>;
}

/// Analyzer over attack events.
pub trait CombatCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> CheckCategory;
    fn is_enabled(&self) -> bool;
    fn weight(&self) -> f64;
    fn configure(&mut self, config: &DetectionConfig);
    fn analyze(&self, event: &AttackEvent, ctx: &CombatContext) -> Result<CheckResult, CheckError>;
}

/// Guards a computed score before it is turned into a result.
pub(crate) fn ensure_finite(
    value: f64,
    check: &'static str,
    quantity: &'static str,
) -> Result<f64, CheckError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CheckError::NonFinite { check, quantity })
    }
}
