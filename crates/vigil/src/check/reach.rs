//! Hit-distance analysis against the vanilla melee envelope.

use vigil_stats::anomaly_to_confidence;

use super::{CheckCategory, CheckError, CheckResult, CombatCheck, Explanation, ensure_finite};
use crate::{
    config::{self, DetectionConfig},
    context::CombatContext,
    event::AttackEvent,
};

const NAME: &str = "combat_reach";
const SIGMOID_SCALE: f64 = 2.0;
/// Horizontal slack on top of vanilla reach before the lateral signal
/// fires.
const HORIZONTAL_SLACK: f64 = 0.5;

pub struct CombatReachCheck {
    config: config::CombatReach,
}

impl CombatReachCheck {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.checks.combat_reach,
        }
    }
}

impl CombatCheck for CombatReachCheck {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Combat
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn weight(&self) -> f64 {
        self.config.weight
    }

    fn configure(&mut self, config: &DetectionConfig) {
        self.config = config.checks.combat_reach;
    }

    fn analyze(&self, event: &AttackEvent, ctx: &CombatContext) -> Result<CheckResult, CheckError> {
        // Misses carry no reliable distance; only landed hits matter.
        if !self.config.enabled || !event.hit {
            return Ok(CheckResult::clean(NAME));
        }

        let reach = event.reach();
        let ping_comp = 0.001 * f64::from(event.ping_ms);
        let adjusted_max = self.config.max_reach + self.config.reach_buffer + ping_comp;

        let mut score = 0.0;
        let mut explanation = Explanation::new();

        if reach > adjusted_max {
            score += 3.0 * (reach - adjusted_max) / adjusted_max;
            explanation.insert("reach", format!("{reach:.3}"));
            explanation.insert("reach_limit", format!("{adjusted_max:.3}"));
        }

        let horizontal = event.horizontal_reach();
        let horizontal_limit = self.config.max_reach + ping_comp + HORIZONTAL_SLACK;
        if horizontal > horizontal_limit {
            score += 2.0 * (horizontal - horizontal_limit) / self.config.max_reach;
            explanation.insert("horizontal_reach", format!("{horizontal:.3}"));
        }

        // Consistently landing at the very edge of the envelope is its own
        // signature even when no single hit crosses it.
        if ctx.reach_window.len() >= self.config.min_samples {
            let median = ctx.reach_window.median();
            let mad = ctx.reach_window.mad();
            if median >= 2.7 && mad < 0.3 {
                score += 0.5 * (median - 2.5) / 0.5;
                explanation.insert("reach_median", format!("{median:.3}"));
                explanation.insert("reach_mad", format!("{mad:.3}"));
            }

            let window_max = ctx.reach_window.max();
            if window_max > adjusted_max {
                score += window_max / adjusted_max;
                explanation.insert("reach_max", format!("{window_max:.3}"));
            }
        }

        let dy = (event.target_pos.y - event.attacker_pos.y).abs();
        if dy > 2.0 && reach > 3.0 {
            score += 0.3 * (dy - 2.0) * (reach - 3.0);
            explanation.insert("vertical_gap", format!("{dy:.3}"));
        }

        let score = ensure_finite(score, NAME, "anomaly score")?;
        if score <= 0.0 {
            return Ok(CheckResult::clean(NAME));
        }

        let confidence = anomaly_to_confidence(score, SIGMOID_SCALE);
        let severity = (score / 2.0).min(1.0);
        Ok(CheckResult::flagged(NAME, confidence, severity, explanation))
    }
}
