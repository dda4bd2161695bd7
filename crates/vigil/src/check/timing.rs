//! Packet cadence analysis: timer manipulation, bursts, machine-perfect
//! timing.

use vigil_stats::anomaly_to_confidence;

use super::{CheckCategory, CheckError, CheckResult, Explanation, MovementCheck, ensure_finite};
use crate::{
    config::{self, DetectionConfig},
    context::PlayerContext,
    event::MovementEvent,
    features::{Features, NOMINAL_TICK_MS},
};

const NAME: &str = "packet_timing";
const SIGMOID_SCALE: f64 = 2.0;
/// Results quieter than this are reported as clean.
const MIN_CONFIDENCE: f64 = 0.1;
const MIN_WINDOW: usize = 5;
/// Fraction of sub-threshold deltas that starts counting as a burst.
const BURST_RATIO: f64 = 0.3;

pub struct PacketTimingCheck {
    config: config::PacketTiming,
}

impl PacketTimingCheck {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.checks.packet_timing,
        }
    }
}

impl MovementCheck for PacketTimingCheck {
    fn name(&self) -> &'static str {
        NAME
    }

    fn category(&self) -> CheckCategory {
        CheckCategory::Timing
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn weight(&self) -> f64 {
        self.config.weight
    }

    fn configure(&mut self, config: &DetectionConfig) {
        self.config = config.checks.packet_timing;
    }

    fn analyze(
        &self,
        event: &MovementEvent,
        _features: &Features,
        ctx: &PlayerContext,
    ) -> Result<CheckResult, CheckError> {
        if !self.config.enabled
            || ctx.packet_delta_window.len() < MIN_WINDOW
            || event.special_movement()
        {
            return Ok(CheckResult::clean(NAME));
        }

        let deltas = ctx.packet_delta_window.to_vec();
        let mut score = 0.0;
        let mut explanation = Explanation::new();

        // Bursts: a run of near-zero gaps means packets arrived faster
        // than any client tick loop produces them.
        let burst_count = deltas
            .iter()
            .filter(|delta| **delta < self.config.min_delta_ms)
            .count();
        let burst_ratio = burst_count as f64 / deltas.len() as f64;
        if burst_ratio > BURST_RATIO {
            score += 2.0 * burst_ratio;
            explanation.insert("burst_ratio", format!("{burst_ratio:.3}"));
        }

        // Machine-smooth cadence: human connections always wobble.
        let mad = ctx.packet_delta_window.mad();
        if mad < 1.0 && deltas.len() >= 10 {
            score += 1.0 - mad;
            explanation.insert("delta_mad_ms", format!("{mad:.3}"));
        }

        let mean = ctx.packet_delta_window.mean();
        if mean > 0.0 {
            let jitter_ratio = ctx.packet_delta_window.std_dev() / mean;
            if jitter_ratio > self.config.max_jitter_coeff {
                score += (jitter_ratio - self.config.max_jitter_coeff) / self.config.max_jitter_coeff;
                explanation.insert("jitter_ratio", format!("{jitter_ratio:.3}"));
            }
        }

        // Cadence skew against the ping-adjusted nominal tick.
        let expected = 0.05f64.mul_add(ctx.ping_window.median(), NOMINAL_TICK_MS);
        let skew = (ctx.packet_delta_window.median() - expected).abs() / expected;
        if skew > 0.5 {
            score += skew;
            explanation.insert("cadence_skew", format!("{skew:.3}"));
        }

        let score = ensure_finite(score, NAME, "anomaly score")?;
        let confidence = anomaly_to_confidence(score, SIGMOID_SCALE);
        if confidence < MIN_CONFIDENCE {
            return Ok(CheckResult::clean(NAME));
        }

        let severity = (score / 3.0).min(1.0);
        Ok(CheckResult::flagged(NAME, confidence, severity, explanation))
    }
}
