//! Click cadence and hit-rate analysis: macros, kill aura, crit automation.

use vigil_stats::anomaly_to_confidence;

use super::{CheckCategory, CheckError, CheckResult, CombatCheck, Explanation, ensure_finite};
use crate::{
    config::{self, DetectionConfig},
    context::CombatContext,
    event::AttackEvent,
};

const NAME: &str = "combat_autoclicker";
const SIGMOID_SCALE: f64 = 1.8;
/// Sustained clicks per second beyond this are not produced by a finger.
const MAX_CPS: f64 = 20.0;
/// Hits landed while looking this far away cannot be manual.
const LOOK_AWAY_DEGREES: f64 = 90.0;
const EDGE_FOV_DEGREES: f64 = 45.0;
/// Rapid target-switch scan depth.
const SWITCH_SCAN: usize = 5;

pub struct CombatAutoclickerCheck {
    config: config::CombatAutoclicker,
}

impl CombatAutoclickerCheck {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.checks.combat_autoclicker,
        }
    }
}

impl CombatCheck for CombatAutoclickerCheck {
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
        self.config = config.checks.combat_autoclicker;
    }

    fn analyze(&self, _event: &AttackEvent, ctx: &CombatContext) -> Result<CheckResult, CheckError> {
        if !self.config.enabled || ctx.attacks.len() < self.config.min_samples {
            return Ok(CheckResult::clean(NAME));
        }

        let mut score = 0.0;
        let mut explanation = Explanation::new();

        let recent_hit_rate = ctx.hit_window.mean();
        if recent_hit_rate > self.config.max_hit_rate {
            score += 2.0 * (recent_hit_rate - self.config.max_hit_rate)
                / (1.0 - self.config.max_hit_rate);
            explanation.insert("recent_hit_rate", format!("{recent_hit_rate:.3}"));
        }

        let total_hit_rate = ctx.total_hit_rate();
        if total_hit_rate > 0.9 && ctx.attacks_total >= 3 * self.config.min_samples as u64 {
            score += 2.0 * (total_hit_rate - 0.9);
            explanation.insert("total_hit_rate", format!("{total_hit_rate:.3}"));
        }

        let mean_interval = ctx.interval_window.mean();
        if mean_interval > 0.0 {
            let cps = 1000.0 / mean_interval;
            if cps > MAX_CPS {
                score += 2.5 * (cps - MAX_CPS) / MAX_CPS;
                explanation.insert("cps", format!("{cps:.1}"));
            }

            let min_interval = ctx.interval_window.min();
            if min_interval > 0.0 && min_interval < self.config.min_attack_interval_ms {
                score += (self.config.min_attack_interval_ms - min_interval)
                    / self.config.min_attack_interval_ms;
                explanation.insert("min_interval_ms", format!("{min_interval:.1}"));
            }

            // A human rhythm drifts; a timer loop does not.
            let consistency = ctx.interval_window.mad() / mean_interval;
            if consistency < self.config.max_interval_consistency {
                score += 1.5 * (1.0 - consistency / self.config.max_interval_consistency);
                explanation.insert("interval_consistency", format!("{consistency:.4}"));
            }
        }

        if let Some(sample) = ctx.attacks.newest() {
            if sample.event.hit && sample.aim_error > LOOK_AWAY_DEGREES {
                score += 3.0 * (sample.aim_error - LOOK_AWAY_DEGREES) / LOOK_AWAY_DEGREES;
                explanation.insert("look_away_error", format!("{:.1}", sample.aim_error));
            } else if sample.event.hit && sample.aim_error > EDGE_FOV_DEGREES {
                score += 0.5 * (sample.aim_error - EDGE_FOV_DEGREES) / EDGE_FOV_DEGREES;
                explanation.insert("edge_fov_error", format!("{:.1}", sample.aim_error));
            }
        }

        let rapid_switches = (0..ctx.attacks.len().min(SWITCH_SCAN))
            .filter_map(|age| ctx.attacks.get(age))
            .filter(|sample| {
                sample.switched_target
                    && sample.event.attack_delta_ms > 0.0
                    && sample.event.attack_delta_ms < 500.0
            })
            .count();
        if rapid_switches >= 3 {
            score += 0.3 * rapid_switches as f64;
            explanation.insert("rapid_target_switches", rapid_switches.to_string());
        }

        let crit_rate = ctx.critical_rate();
        if ctx.hits_total >= self.config.min_samples as u64 && crit_rate > 0.7 {
            score += (1.5 * (crit_rate - 0.5)).max(0.0);
            explanation.insert("critical_rate", format!("{crit_rate:.3}"));
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
