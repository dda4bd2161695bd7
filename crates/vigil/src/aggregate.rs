//! Fuses per-check results into at most one violation per event.

use uuid::Uuid;

use crate::{
    check::{CheckResult, Explanation},
    config::DetectionConfig,
    event::PlayerName,
};

/// Results quieter than this never contribute to a violation.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.1;

/// One event's worth of fused evidence against a player.
#[derive(Debug, Clone)]
pub struct Violation {
    pub player: Uuid,
    pub name: PlayerName,
    /// Name of the check that carried the highest confidence.
    pub category: String,
    pub confidence: f64,
    pub severity: f64,
    pub nano_time: i64,
    pub ping_ms: u32,
    /// Every significant contributing result.
    pub results: Vec<CheckResult>,
    /// Merged diagnostics; on key collisions the first contributor wins.
    pub explanation: Explanation,
}

/// Max-confidence fusion with an action gate.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    action_confidence: f64,
    min_severity: f64,
}

impl Aggregator {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            action_confidence: config.thresholds.action_confidence,
            min_severity: config.thresholds.min_severity,
        }
    }

    pub fn configure(&mut self, config: &DetectionConfig) {
        self.action_confidence = config.thresholds.action_confidence;
        self.min_severity = config.thresholds.min_severity;
    }

    #[must_use]
    pub const fn action_confidence(&self) -> f64 {
        self.action_confidence
    }

    /// Fuses one event's results. Returns `None` unless some check is
    /// confident enough to act on and some check reports real severity.
    #[must_use]
    pub fn aggregate(
        &self,
        player: Uuid,
        name: &PlayerName,
        results: Vec<CheckResult>,
        nano_time: i64,
        ping_ms: u32,
    ) -> Option<Violation> {
        let significant: Vec<CheckResult> = results
            .into_iter()
            .filter(|result| result.confidence() > SIGNIFICANCE_THRESHOLD)
            .collect();
        if significant.is_empty() {
            return None;
        }

        let primary = significant
            .iter()
            .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))?;
        let confidence = primary.confidence();
        let category = primary.check().to_owned();
        let severity = significant
            .iter()
            .map(CheckResult::severity)
            .fold(0.0, f64::max);

        if confidence < self.action_confidence || severity < self.min_severity {
            return None;
        }

        let mut explanation = Explanation::new();
        for result in &significant {
            for (key, value) in result.explanation() {
                explanation.entry(*key).or_insert_with(|| value.clone());
            }
        }

        Some(Violation {
            player,
            name: name.clone(),
            category,
            confidence,
            severity,
            nano_time,
            ping_ms,
            results: significant,
            explanation,
        })
    }

    /// Weighted-average fusion across results, for tuning experiments.
    /// The action gate above deliberately does not use it.
    #[must_use]
    pub fn weighted_confidence(results: &[CheckResult], weights: &[f64]) -> f64 {
        let confidences: Vec<f64> = results.iter().map(CheckResult::confidence).collect();
        vigil_stats::fuse_weighted(&confidences, weights)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::check::Explanation;

    fn result(check: &'static str, confidence: f64, severity: f64) -> CheckResult {
        let mut explanation = Explanation::new();
        explanation.insert("origin", check.to_owned());
        CheckResult::flagged(check, confidence, severity, explanation)
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(&DetectionConfig::default())
    }

    #[test]
    fn quiet_results_produce_nothing() {
        let violation = aggregator().aggregate(
            Uuid::new_v4(),
            &"steve".into(),
            vec![result("a", 0.05, 0.9), CheckResult::clean("b")],
            0,
            20,
        );
        assert!(violation.is_none());
    }

    #[test]
    fn confident_but_not_actionable_produces_nothing() {
        let violation = aggregator().aggregate(
            Uuid::new_v4(),
            &"steve".into(),
            vec![result("a", 0.9, 0.8)],
            0,
            20,
        );
        assert!(violation.is_none());
    }

    #[test]
    fn low_severity_produces_nothing() {
        let violation = aggregator().aggregate(
            Uuid::new_v4(),
            &"steve".into(),
            vec![result("a", 0.999, 0.1)],
            0,
            20,
        );
        assert!(violation.is_none());
    }

    #[test]
    fn primary_category_is_the_most_confident_check() {
        let violation = aggregator()
            .aggregate(
                Uuid::new_v4(),
                &"steve".into(),
                vec![
                    result("movement_consistency", 0.9985, 0.6),
                    result("packet_timing", 0.4, 0.9),
                ],
                42,
                20,
            )
            .expect("actionable violation");

        assert_eq!(violation.category, "movement_consistency");
        assert_relative_eq!(violation.confidence, 0.9985);
        // Severity is the max across contributors, not the primary's.
        assert_relative_eq!(violation.severity, 0.9);
        assert_eq!(violation.results.len(), 2);
    }

    #[test]
    fn explanation_merge_is_first_writer_wins() {
        let mut first = Explanation::new();
        first.insert("shared", "first".to_owned());
        let mut second = Explanation::new();
        second.insert("shared", "second".to_owned());
        second.insert("extra", "kept".to_owned());

        let violation = aggregator()
            .aggregate(
                Uuid::new_v4(),
                &"steve".into(),
                vec![
                    CheckResult::flagged("a", 0.999, 0.5, first),
                    CheckResult::flagged("b", 0.5, 0.5, second),
                ],
                0,
                20,
            )
            .expect("actionable violation");

        assert_eq!(violation.explanation["shared"], "first");
        assert_eq!(violation.explanation["extra"], "kept");
    }

    #[test]
    fn weighted_fusion_helper() {
        let results = [result("a", 0.8, 0.5), result("b", 0.2, 0.5)];
        let fused = Aggregator::weighted_confidence(&results, &[3.0, 1.0]);
        assert_relative_eq!(fused, 0.65);
    }
}
