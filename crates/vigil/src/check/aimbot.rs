//! Aim assistance signatures: snaps onto targets, inhumanly steady error,
//! impossible rotation rates.

use vigil_stats::anomaly_to_confidence;

use super::{CheckCategory, CheckError, CheckResult, CombatCheck, Explanation, ensure_finite};
use crate::{
    config::{self, DetectionConfig},
    context::CombatContext,
    event::AttackEvent,
    features::NOMINAL_TICK_MS,
};

const NAME: &str = "combat_aimbot";
const SIGMOID_SCALE: f64 = 1.5;
/// Aim error under this many degrees counts as locked on.
const LOCKED_ON_DEGREES: f64 = 2.0;
/// Rotation faster than this many degrees per tick is beyond human input.
const MAX_ROTATION_PER_TICK: f64 = 180.0;

pub struct CombatAimbotCheck {
    config: config::CombatAimbot,
}

impl CombatAimbotCheck {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.checks.combat_aimbot,
        }
    }
}

impl CombatCheck for CombatAimbotCheck {
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
        self.config = config.checks.combat_aimbot;
    }

    fn analyze(&self, event: &AttackEvent, ctx: &CombatContext) -> Result<CheckResult, CheckError> {
        if !self.config.enabled || ctx.aim_error_window.len() < self.config.min_samples {
            return Ok(CheckResult::clean(NAME));
        }
        let Some(sample) = ctx.attacks.newest() else {
            return Ok(CheckResult::clean(NAME));
        };

        let mut score = 0.0;
        let mut explanation = Explanation::new();

        // A large rotation landing dead on the target in one frame is the
        // classic snap.
        if sample.snap_angle > self.config.max_snap_angle
            && sample.aim_error < LOCKED_ON_DEGREES
        {
            score += (sample.snap_angle / self.config.max_snap_angle)
                * (1.0 - sample.aim_error / LOCKED_ON_DEGREES);
            explanation.insert("snap_angle", format!("{:.2}", sample.snap_angle));
            explanation.insert("aim_error", format!("{:.3}", sample.aim_error));
        }

        // Humans track with visible spread; assistance holds the error
        // both small and flat.
        let spread = ctx.aim_error_window.std_dev();
        let center = ctx.aim_error_window.mean();
        if spread < self.config.min_aim_variance && center < self.config.max_aim_perfection {
            score += (1.0 - spread / self.config.min_aim_variance)
                * (1.0 - center / self.config.max_aim_perfection);
            explanation.insert("aim_spread", format!("{spread:.3}"));
            explanation.insert("aim_mean", format!("{center:.3}"));
        }

        let mad = ctx.aim_error_window.mad();
        if ctx.aim_error_window.len() >= 2 * self.config.min_samples && mad < 0.5 {
            score += 0.5 * (1.0 - mad / 0.5);
            explanation.insert("aim_mad", format!("{mad:.3}"));
        }

        if sample.switched_target
            && sample.snap_angle > 30.0
            && sample.aim_error < LOCKED_ON_DEGREES
        {
            score += (sample.snap_angle / 90.0) * 0.5;
            explanation.insert("target_switch_snap", format!("{:.2}", sample.snap_angle));
        }

        if event.attack_delta_ms > 0.0 {
            let ticks = event.attack_delta_ms / NOMINAL_TICK_MS;
            let degrees_per_tick = sample.snap_angle / ticks;
            if degrees_per_tick > MAX_ROTATION_PER_TICK {
                score += 0.3 * (degrees_per_tick - MAX_ROTATION_PER_TICK) / MAX_ROTATION_PER_TICK;
                explanation.insert("rotation_per_tick", format!("{degrees_per_tick:.1}"));
            }
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

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use more_asserts::{assert_gt, assert_lt};
    use uuid::Uuid;

    use super::*;
    use crate::context::HistoryParams;

    fn attack(pre_yaw: f32, yaw_error: f32, delta_ms: f64, target: Uuid) -> AttackEvent {
        // Target sits along +z; yaw_error degrees of yaw offset produce
        // roughly that much aim error.
        AttackEvent {
            attacker_pos: DVec3::ZERO,
            yaw: yaw_error,
            pitch: 0.0,
            pre_yaw,
            pre_pitch: 0.0,
            target_pos: DVec3::new(0.0, 0.0, 2.8),
            target_id: Some(target),
            hit: true,
            critical: false,
            damage: 6.0,
            attack_delta_ms: delta_ms,
            ping_ms: 20,
            nano_time: 0,
        }
    }

    fn run(events: Vec<AttackEvent>) -> CheckResult {
        let check = CombatAimbotCheck::new(&DetectionConfig::default());
        let mut ctx = CombatContext::new(
            Uuid::new_v4(),
            "steve".into(),
            &HistoryParams::default(),
        );
        let mut last = None;
        for mut event in events {
            ctx.ingest(&mut event);
            last = Some(event);
        }
        check.analyze(&last.unwrap(), &ctx).unwrap()
    }

    #[test]
    fn under_sampled_history_is_clean() {
        let target = Uuid::new_v4();
        let result = run((0..3).map(|_| attack(-80.0, 0.2, 400.0, target)).collect());
        assert!(result.is_clean());
    }

    #[test]
    fn snapping_with_perfect_aim_saturates() {
        let target = Uuid::new_v4();
        // Every attack arrives from an 80-degree flick onto the target.
        let errors = [0.1, 0.25, 0.15, 0.3, 0.2, 0.1, 0.25, 0.3, 0.2, 0.15, 0.1, 0.3, 0.2, 0.25, 0.15];
        let events: Vec<_> = errors
            .iter()
            .map(|e| attack(-80.0, *e, 400.0, target))
            .collect();
        let result = run(events);

        assert_gt!(result.confidence(), 0.997);
        assert!(result.explanation().contains_key("snap_angle"));
        assert!(result.explanation().contains_key("aim_spread"));
    }

    #[test]
    fn human_tracking_stays_quiet() {
        let target = Uuid::new_v4();
        // Small corrections, wobbly error up to a few degrees.
        let errors = [2.5, 4.0, 1.5, 6.0, 3.0, 5.5, 2.0, 7.0, 3.5, 4.5, 1.8, 5.0];
        let events: Vec<_> = errors
            .iter()
            .enumerate()
            .map(|(i, e)| attack(*e + if i % 2 == 0 { 3.0 } else { -3.0 }, *e, 350.0, target))
            .collect();
        let result = run(events);
        assert_lt!(result.confidence(), 0.3);
    }

    #[test]
    fn impossible_rotation_rate_scores() {
        let target = Uuid::new_v4();
        let mut events: Vec<_> = (0..8).map(|_| attack(-80.0, 0.2, 400.0, target)).collect();
        // A 170-degree flick inside 25 ms is far past one tick of input.
        events.push(attack(-170.0, 0.1, 25.0, target));
        let result = run(events);
        assert!(result.explanation().contains_key("rotation_per_tick"));
    }
}
