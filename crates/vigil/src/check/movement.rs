//! Coarse physics envelopes: speed, vertical motion, acceleration.

use vigil_stats::anomaly_to_confidence;

use super::{CheckCategory, CheckError, CheckResult, Explanation, MovementCheck, ensure_finite};
use crate::{
    config::{self, DetectionConfig},
    context::PlayerContext,
    event::MovementEvent,
    features::Features,
};

const NAME: &str = "movement_consistency";
const SIGMOID_SCALE: f64 = 1.5;

pub struct MovementConsistencyCheck {
    config: config::MovementConsistency,
}

impl MovementConsistencyCheck {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.checks.movement_consistency,
        }
    }
}

impl MovementCheck for MovementConsistencyCheck {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Movement
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn weight(&self) -> f64 {
        self.config.weight
    }

    fn configure(&mut self, config: &DetectionConfig) {
        self.config = config.checks.movement_consistency;
    }

    fn analyze(
        &self,
        event: &MovementEvent,
        features: &Features,
        ctx: &PlayerContext,
    ) -> Result<CheckResult, CheckError> {
        if !self.config.enabled || ctx.features.len() < 2 || event.special_movement() {
            return Ok(CheckResult::clean(NAME));
        }

        // High latency stretches deltas between packets; widen the
        // envelopes accordingly.
        let ping_factor = 1.0 + ctx.median_ping() / 500.0;
        let horiz_limit = self.config.max_horizontal_speed * ping_factor;
        let mut vert_limit = self.config.max_vertical_speed * ping_factor;
        if event.dy < 0.0 {
            // Falling is faster than climbing ever is.
            vert_limit *= 2.0;
        }

        let mut score = 0.0;
        let mut explanation = Explanation::new();

        if features.horiz_speed > horiz_limit {
            score += (features.horiz_speed - horiz_limit) / horiz_limit;
            explanation.insert("horiz_speed", format!("{:.3}", features.horiz_speed));
            explanation.insert("horiz_limit", format!("{horiz_limit:.3}"));
        }

        if features.vert_speed.abs() > vert_limit {
            score += (features.vert_speed.abs() - vert_limit) / vert_limit;
            explanation.insert("vert_speed", format!("{:.3}", features.vert_speed));
            explanation.insert("vert_limit", format!("{vert_limit:.3}"));
        }

        let accel_limit = self.config.max_horizontal_speed * self.config.accel_tolerance * ping_factor;
        if features.horiz_accel > accel_limit {
            score += 0.5 * (features.horiz_accel - accel_limit) / accel_limit;
            explanation.insert("horiz_accel", format!("{:.3}", features.horiz_accel));
        }

        if event.flags.on_ground && event.dy > 0.1 {
            score += 0.5;
            explanation.insert("ground_state", format!("rising {:.3} while on ground", event.dy));
        }

        // An instant reversal of real momentum has no legitimate source.
        if let Some(previous) = ctx.features.get(1) {
            if previous.horiz_speed > 0.2
                && features.horiz_speed > 0.2
                && features.horiz_accel.abs() > 2.0 * previous.horiz_speed
            {
                score += 0.3;
                explanation.insert("reversal", format!("{:.3}", features.horiz_accel));
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
    use more_asserts::{assert_gt, assert_lt};
    use uuid::Uuid;

    use super::*;
    use crate::{context::HistoryParams, event::MovementFlags, features};

    fn walk_event(dx: f64, dy: f64, on_ground: bool, nano_time: i64) -> MovementEvent {
        MovementEvent {
            dx,
            dy,
            dz: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            delta_yaw: 0.0,
            delta_pitch: 0.0,
            flags: MovementFlags {
                on_ground,
                ..Default::default()
            },
            ping_ms: 20,
            nano_time,
            tick_delta: if nano_time == 0 { 0 } else { 50_000_000 },
        }
    }

    /// Feeds events through ingest + extract the way the engine does and
    /// returns the last event's result.
    fn analyze_run(check: &MovementConsistencyCheck, events: &[MovementEvent]) -> CheckResult {
        let mut ctx = PlayerContext::new(
            Uuid::new_v4(),
            "steve".into(),
            &HistoryParams::default(),
        );
        let mut last = None;
        for event in events {
            let mut event = *event;
            ctx.ingest(&mut event);
            let extracted = features::extract(&event, &ctx);
            ctx.push_features(extracted);
            last = Some((event, extracted));
        }
        let (event, extracted) = last.expect("at least one event");
        check.analyze(&event, &extracted, &ctx).unwrap()
    }

    fn sprint_events(count: usize) -> Vec<MovementEvent> {
        (0..count)
            .map(|i| walk_event(0.28, 0.0, true, i as i64 * 50_000_000))
            .collect()
    }

    #[test]
    fn normal_sprint_is_clean() {
        let check = MovementConsistencyCheck::new(&DetectionConfig::default());
        let result = analyze_run(&check, &sprint_events(30));
        assert!(result.is_clean());
    }

    #[test]
    fn speed_burst_is_significant_but_not_actionable() {
        let check = MovementConsistencyCheck::new(&DetectionConfig::default());
        let mut events = sprint_events(30);
        events.push(walk_event(1.5, 0.0, true, 30 * 50_000_000));
        let result = analyze_run(&check, &events);

        assert_gt!(result.confidence(), 0.3);
        assert_lt!(result.confidence(), 0.997);
    }

    #[test]
    fn sustained_climb_saturates_confidence() {
        let check = MovementConsistencyCheck::new(&DetectionConfig::default());
        let events: Vec<_> = (0..20)
            .map(|i| walk_event(0.0, 0.6, false, i * 50_000_000))
            .collect();
        let result = analyze_run(&check, &events);

        assert_gt!(result.confidence(), 0.997);
        assert_gt!(result.severity(), 0.3);
    }

    #[test]
    fn jump_arc_stays_below_action_threshold() {
        let check = MovementConsistencyCheck::new(&DetectionConfig::default());
        let mut events = sprint_events(10);
        // Vanilla jump: initial impulse decaying under gravity.
        for (i, dy) in [0.42, 0.33, 0.25, 0.17, 0.09, 0.02].into_iter().enumerate() {
            events.push(walk_event(0.28, dy, false, (10 + i as i64) * 50_000_000));
        }
        let mut worst = 0.0f64;
        for end in 11..=events.len() {
            let result = analyze_run(&check, &events[..end]);
            worst = worst.max(result.confidence());
        }
        assert_lt!(worst, 0.997);
    }

    #[test]
    fn rising_while_on_ground_scores() {
        let check = MovementConsistencyCheck::new(&DetectionConfig::default());
        let mut events = sprint_events(5);
        events.push(walk_event(0.1, 0.3, true, 5 * 50_000_000));
        let result = analyze_run(&check, &events);
        assert!(result.explanation().contains_key("ground_state"));
    }

    #[test]
    fn gliding_is_exempt_from_physics() {
        let check = MovementConsistencyCheck::new(&DetectionConfig::default());
        let mut ctx = PlayerContext::new(
            Uuid::new_v4(),
            "steve".into(),
            &HistoryParams::default(),
        );
        for i in 0..5 {
            let mut event = walk_event(2.5, -0.4, false, i * 50_000_000);
            event.flags.gliding = true;
            ctx.ingest(&mut event);
            let extracted = features::extract(&event, &ctx);
            ctx.push_features(extracted);
            let result = check.analyze(&event, &extracted, &ctx).unwrap();
            assert!(result.is_clean());
        }
    }
}
