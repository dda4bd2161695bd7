//! Deviation from a linear-plus-gravity extrapolation of recent motion.
//!
//! A single drifting event is noise; the check only speaks once the drift
//! has persisted across several consecutive events.

use vigil_stats::anomaly_to_confidence;

use super::{CheckCategory, CheckError, CheckResult, Explanation, MovementCheck, ensure_finite};
use crate::{
    config::{self, DetectionConfig},
    context::PlayerContext,
    event::MovementEvent,
    features::Features,
};

const NAME: &str = "prediction_drift";
const SIGMOID_SCALE: f64 = 2.0;
/// Vertical pull per tick in world units.
const GRAVITY: f64 = 0.08;

pub struct PredictionDriftCheck {
    config: config::PredictionDrift,
}

impl PredictionDriftCheck {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.checks.prediction_drift,
        }
    }

    /// Drift of the event at `age` against the mean velocity of its
    /// `min_drift_samples` predecessors, with gravity applied. `None`
    /// when the history does not reach far enough back.
    fn drift_at(&self, ctx: &PlayerContext, age: usize) -> Option<f64> {
        let samples = self.config.min_drift_samples;
        let event = ctx.telemetry.get(age)?;
        // Make sure the full prediction window exists.
        ctx.telemetry.get(age + samples)?;

        let mut avg_dx = 0.0;
        let mut avg_dy = 0.0;
        let mut avg_dz = 0.0;
        for offset in 1..=samples {
            let prior = ctx.telemetry.get(age + offset)?;
            avg_dx += prior.dx;
            avg_dy += prior.dy;
            avg_dz += prior.dz;
        }
        let n = samples as f64;
        avg_dx /= n;
        avg_dy = avg_dy / n - GRAVITY;
        avg_dz /= n;

        let ex = event.dx - avg_dx;
        let ey = event.dy - avg_dy;
        let ez = event.dz - avg_dz;
        Some((ex * ex + ey * ey + ez * ez).sqrt())
    }
}

impl MovementCheck for PredictionDriftCheck {
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
        self.config = config.checks.prediction_drift;
    }

    fn analyze(
        &self,
        event: &MovementEvent,
        _features: &Features,
        ctx: &PlayerContext,
    ) -> Result<CheckResult, CheckError> {
        let samples = self.config.min_drift_samples;
        if !self.config.enabled
            || ctx.telemetry.len() < samples + 2
            || event.special_movement()
        {
            return Ok(CheckResult::clean(NAME));
        }

        let Some(drift) = self.drift_at(ctx, 0) else {
            return Ok(CheckResult::clean(NAME));
        };

        let threshold = self.config.max_drift_threshold * (1.0 + ctx.median_ping() / 300.0);
        if drift <= threshold {
            return Ok(CheckResult::clean(NAME));
        }

        // Sustained evidence: walk backwards while prior events kept
        // drifting past half the threshold.
        let mut consecutive = 0_usize;
        for age in 1..ctx.telemetry.len() {
            match self.drift_at(ctx, age) {
                Some(prior_drift) if prior_drift > threshold / 2.0 => consecutive += 1,
                _ => break,
            }
        }
        if consecutive < samples {
            return Ok(CheckResult::clean(NAME));
        }

        let score = ensure_finite(
            (drift - threshold) / threshold + 0.2 * (consecutive - samples) as f64,
            NAME,
            "anomaly score",
        )?;
        let confidence = anomaly_to_confidence(score, SIGMOID_SCALE);
        let severity = (score / 2.0).min(1.0);

        let mut explanation = Explanation::new();
        explanation.insert("drift", format!("{drift:.3}"));
        explanation.insert("drift_threshold", format!("{threshold:.3}"));
        explanation.insert("consecutive_drifts", consecutive.to_string());
        Ok(CheckResult::flagged(NAME, confidence, severity, explanation))
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::assert_gt;
    use uuid::Uuid;

    use super::*;
    use crate::{context::HistoryParams, event::MovementFlags, features};

    fn event(dx: f64, dy: f64, dz: f64, i: i64) -> MovementEvent {
        MovementEvent {
            dx,
            dy,
            dz,
            yaw: 0.0,
            pitch: 0.0,
            delta_yaw: 0.0,
            delta_pitch: 0.0,
            flags: MovementFlags::default(),
            ping_ms: 20,
            nano_time: i * 50_000_000,
            tick_delta: if i == 0 { 0 } else { 50_000_000 },
        }
    }

    fn run(check: &PredictionDriftCheck, events: Vec<MovementEvent>) -> CheckResult {
        let mut ctx = PlayerContext::new(
            Uuid::new_v4(),
            "steve".into(),
            &HistoryParams::default(),
        );
        let mut last = None;
        for mut e in events {
            ctx.ingest(&mut e);
            let extracted = features::extract(&e, &ctx);
            ctx.push_features(extracted);
            last = Some((e, extracted));
        }
        let (e, extracted) = last.unwrap();
        check.analyze(&e, &extracted, &ctx).unwrap()
    }

    #[test]
    fn steady_motion_does_not_drift() {
        let check = PredictionDriftCheck::new(&DetectionConfig::default());
        let events: Vec<_> = (0..20).map(|i| event(0.25, 0.0, 0.0, i)).collect();
        let result = run(&check, events);
        assert!(result.is_clean());
    }

    #[test]
    fn single_spike_is_not_sustained() {
        let check = PredictionDriftCheck::new(&DetectionConfig::default());
        let mut events: Vec<_> = (0..15).map(|i| event(0.25, 0.0, 0.0, i)).collect();
        events.push(event(3.0, 0.0, 0.0, 15));
        let result = run(&check, events);
        assert!(result.is_clean());
    }

    #[test]
    fn sustained_erratic_motion_is_flagged() {
        let check = PredictionDriftCheck::new(&DetectionConfig::default());
        // Alternating large jumps never match a linear prediction.
        let mut events = Vec::new();
        for i in 0..20 {
            let dx = if i % 2 == 0 { 2.0 } else { -2.0 };
            events.push(event(dx, 0.0, 0.0, i));
        }
        let result = run(&check, events);
        assert!(!result.is_clean());
        assert_gt!(result.confidence(), 0.3);
        assert!(result.explanation().contains_key("consecutive_drifts"));
    }

    #[test]
    fn short_history_is_clean() {
        let check = PredictionDriftCheck::new(&DetectionConfig::default());
        let events: Vec<_> = (0..4).map(|i| event(3.0, 0.0, 0.0, i)).collect();
        let result = run(&check, events);
        assert!(result.is_clean());
    }
}
