//! Engine configuration, loaded from a `toml` file.
//!
//! Unknown fields are tolerated, malformed whitelist entries are skipped,
//! and out-of-range numbers are clamped with a warning; a bad config file
//! degrades rather than refusing to start.

use std::{fmt::Debug, path::Path};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DetectionConfig {
    pub thresholds: Thresholds,
    pub windows: Windows,
    pub history: History,
    pub stats: Stats,
    pub checks: Checks,
    pub actions: Actions,
    pub exemptions: Exemptions,
    pub analytics: Analytics,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum fused confidence before a violation is acted on.
    pub action_confidence: f64,
    pub min_severity: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            action_confidence: 0.997,
            min_severity: 0.3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct Windows {
    pub exemption_ms: u64,
    pub cooldown_ms: u64,
    pub lag_grace_ms: u64,
    pub join_exemption_ms: u64,
    pub teleport_exemption_ms: u64,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            exemption_ms: 250,
            cooldown_ms: 1500,
            lag_grace_ms: 500,
            join_exemption_ms: 1000,
            teleport_exemption_ms: 500,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct History {
    pub size: usize,
}

impl Default for History {
    fn default() -> Self {
        Self { size: 64 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct Stats {
    pub median_window: usize,
    pub ewma_alpha: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            median_window: 20,
            ewma_alpha: 0.3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Checks {
    pub packet_timing: PacketTiming,
    pub movement_consistency: MovementConsistency,
    pub prediction_drift: PredictionDrift,
    pub combat_aimbot: CombatAimbot,
    pub combat_reach: CombatReach,
    pub combat_autoclicker: CombatAutoclicker,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct PacketTiming {
    pub enabled: bool,
    pub weight: f64,
    /// Deltas under this many milliseconds count toward a burst.
    pub min_delta_ms: f64,
    /// Maximum tolerated coefficient of variation of the deltas.
    pub max_jitter_coeff: f64,
}

impl Default for PacketTiming {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            min_delta_ms: 5.0,
            max_jitter_coeff: 3.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct MovementConsistency {
    pub enabled: bool,
    pub weight: f64,
    /// Horizontal envelope in world units per tick.
    pub max_horizontal_speed: f64,
    /// Sustained vertical envelope in world units per tick; doubled while
    /// falling. Jump arcs peak well below the action threshold, sustained
    /// climbs saturate it.
    pub max_vertical_speed: f64,
    /// Fraction of the horizontal envelope tolerated as per-tick
    /// acceleration.
    pub accel_tolerance: f64,
}

impl Default for MovementConsistency {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            max_horizontal_speed: 0.8,
            max_vertical_speed: 0.05,
            accel_tolerance: 0.6,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct PredictionDrift {
    pub enabled: bool,
    pub weight: f64,
    /// Base drift threshold in world units, before ping adjustment.
    pub max_drift_threshold: f64,
    /// Consecutive drifting events required before the check speaks up.
    pub min_drift_samples: usize,
}

impl Default for PredictionDrift {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            max_drift_threshold: 0.35,
            min_drift_samples: 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct CombatAimbot {
    pub enabled: bool,
    pub weight: f64,
    pub min_samples: usize,
    /// Per-frame rotation in degrees a tracking human plausibly produces.
    pub max_snap_angle: f64,
    /// Aim-error spread below this is suspiciously steady, in degrees.
    pub min_aim_variance: f64,
    /// Mean aim error below this is suspiciously perfect, in degrees.
    pub max_aim_perfection: f64,
}

impl Default for CombatAimbot {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            min_samples: 6,
            max_snap_angle: 8.0,
            min_aim_variance: 0.75,
            max_aim_perfection: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct CombatReach {
    pub enabled: bool,
    pub weight: f64,
    /// Vanilla melee reach in world units.
    pub max_reach: f64,
    /// Slack added on top of `max_reach` before anything is flagged.
    pub reach_buffer: f64,
    pub min_samples: usize,
}

impl Default for CombatReach {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            max_reach: 3.0,
            reach_buffer: 0.1,
            min_samples: 6,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct CombatAutoclicker {
    pub enabled: bool,
    pub weight: f64,
    pub min_samples: usize,
    /// Recent hit rate above this is suspicious.
    pub max_hit_rate: f64,
    /// Host-enforced attack cooldown in milliseconds.
    pub min_attack_interval_ms: f64,
    /// Interval MAD-to-mean ratio below this is machine-steady clicking.
    pub max_interval_consistency: f64,
}

impl Default for CombatAutoclicker {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 1.0,
            min_samples: 8,
            max_hit_rate: 0.85,
            min_attack_interval_ms: 50.0,
            max_interval_consistency: 0.05,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Actions {
    pub alerts: Alerts,
    pub punishment: Punishment,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Alerts {
    pub enabled: bool,
    /// Template with `{player}`, `{category}`, `{confidence}`,
    /// `{severity}` and `{explanation}` tokens.
    pub format: String,
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "{player} failed {category} (confidence {confidence}, severity {severity}) \
                     {explanation}"
                .to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Punishment {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: PunishmentKind,
    /// Confidence at or above which a violation is punished instead of
    /// only alerted.
    pub threshold: f64,
    pub delay_ms: u64,
}

impl Default for Punishment {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: PunishmentKind::Kick,
            threshold: 0.999,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PunishmentKind {
    #[default]
    Kick,
    TempMute,
    FlagOnly,
}

impl PunishmentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kick => "KICK",
            Self::TempMute => "TEMP_MUTE",
            Self::FlagOnly => "FLAG_ONLY",
        }
    }
}

impl Serialize for PunishmentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PunishmentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_uppercase().as_str() {
            "KICK" => Self::Kick,
            "TEMP_MUTE" => Self::TempMute,
            "FLAG_ONLY" => Self::FlagOnly,
            other => {
                warn!("unknown punishment type {other:?}, falling back to KICK");
                Self::Kick
            }
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Exemptions {
    /// Player uuids that are never evaluated. Malformed entries are
    /// skipped at parse time.
    pub whitelist: Vec<String>,
    pub bypass_permission: String,
    pub exempt_creative: bool,
    pub exempt_spectator: bool,
}

impl Default for Exemptions {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            bypass_permission: "vigil.bypass".to_owned(),
            exempt_creative: true,
            exempt_spectator: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Analytics {
    pub enabled: bool,
    /// `host:port` of the newline-delimited JSON collector.
    pub endpoint: String,
    pub reconnect_delay_ms: u64,
}

impl Default for Analytics {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "127.0.0.1:9099".to_owned(),
            reconnect_delay_ms: 5000,
        }
    }
}

impl DetectionConfig {
    /// Loads the configuration, writing the defaults out when the file
    /// does not exist yet.
    #[instrument]
    pub fn load<P: AsRef<Path> + Debug>(path: P) -> anyhow::Result<Self> {
        info!("loading configuration file");
        if path.as_ref().exists() {
            let contents = std::fs::read_to_string(&path)?;
            let mut config = toml::from_str::<Self>(&contents)?;
            config.sanitize();
            Ok(config)
        } else {
            info!("configuration file not found, using defaults");

            if let Some(parent) = path.as_ref().parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    // read-only filesystems still get a working engine
                    warn!(
                        "failed to create parent directories for {:?}: {e}, using defaults",
                        path.as_ref()
                    );
                    return Ok(Self::default());
                }
            }

            let default_config = Self::default();
            std::fs::write(&path, toml::to_string(&default_config)?.as_bytes())?;
            info!("wrote default configuration to {:?}", path.as_ref());

            Ok(default_config)
        }
    }

    /// Parses the configuration from a string, clamping out-of-range
    /// values.
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let mut config = toml::from_str::<Self>(contents)?;
        config.sanitize();
        Ok(config)
    }

    /// Clamps every tunable into its legal range, warning on each
    /// correction.
    pub fn sanitize(&mut self) {
        clamp_unit(&mut self.thresholds.action_confidence, "thresholds.action_confidence");
        clamp_unit(&mut self.thresholds.min_severity, "thresholds.min_severity");
        clamp_unit(&mut self.actions.punishment.threshold, "actions.punishment.threshold");

        let alpha = self.stats.ewma_alpha;
        if alpha.is_nan() || alpha <= 0.0 || alpha > 1.0 {
            warn!(
                "stats.ewma_alpha {} outside (0, 1], using 0.3",
                self.stats.ewma_alpha
            );
            self.stats.ewma_alpha = 0.3;
        }
        if self.history.size < 2 {
            warn!("history.size {} too small, using 2", self.history.size);
            self.history.size = 2;
        }
        if self.stats.median_window == 0 {
            warn!("stats.median_window must be positive, using 1");
            self.stats.median_window = 1;
        }

        for (name, weight) in [
            ("packet_timing", &mut self.checks.packet_timing.weight),
            (
                "movement_consistency",
                &mut self.checks.movement_consistency.weight,
            ),
            ("prediction_drift", &mut self.checks.prediction_drift.weight),
            ("combat_aimbot", &mut self.checks.combat_aimbot.weight),
            ("combat_reach", &mut self.checks.combat_reach.weight),
            (
                "combat_autoclicker",
                &mut self.checks.combat_autoclicker.weight,
            ),
        ] {
            if !(0.0..=10.0).contains(weight) {
                let clamped = weight.clamp(0.0, 10.0);
                warn!("checks.{name}.weight {weight} outside [0, 10], using {clamped}");
                *weight = clamped;
            }
        }
    }

    /// The whitelist as parsed uuids, skipping entries that do not parse.
    #[must_use]
    pub fn parsed_whitelist(&self) -> Vec<Uuid> {
        self.exemptions
            .whitelist
            .iter()
            .filter_map(|entry| match Uuid::parse_str(entry) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("skipping malformed whitelist entry {entry:?}: {e}");
                    None
                }
            })
            .collect()
    }
}

fn clamp_unit(value: &mut f64, name: &str) {
    if value.is_nan() {
        warn!("{name} is NaN, using 0");
        *value = 0.0;
    } else if !(0.0..=1.0).contains(value) {
        let clamped = value.clamp(0.0, 1.0);
        warn!("{name} {value} outside [0, 1], using {clamped}");
        *value = clamped;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DetectionConfig::default();
        assert_relative_eq!(config.thresholds.action_confidence, 0.997);
        assert_relative_eq!(config.thresholds.min_severity, 0.3);
        assert_relative_eq!(config.actions.punishment.threshold, 0.999);
        assert_eq!(config.windows.cooldown_ms, 1500);
        assert_eq!(config.history.size, 64);
        assert_eq!(config.stats.median_window, 20);
        assert!(config.checks.packet_timing.enabled);
        assert!(!config.actions.punishment.enabled);
        assert!(!config.analytics.enabled);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let config = DetectionConfig::from_toml(
            r#"
            [thresholds]
            action_confidence = 0.99
            some_future_knob = true

            [made_up_section]
            x = 1
            "#,
        )
        .unwrap();
        assert_relative_eq!(config.thresholds.action_confidence, 0.99);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = DetectionConfig::from_toml(
            r#"
            [thresholds]
            action_confidence = 1.7

            [stats]
            ewma_alpha = 0.0

            [checks.combat_reach]
            weight = 99.0
            "#,
        )
        .unwrap();
        assert_relative_eq!(config.thresholds.action_confidence, 1.0);
        assert_relative_eq!(config.stats.ewma_alpha, 0.3);
        assert_relative_eq!(config.checks.combat_reach.weight, 10.0);
    }

    #[test]
    fn unknown_punishment_type_falls_back_to_kick() {
        let config = DetectionConfig::from_toml(
            r#"
            [actions.punishment]
            enabled = true
            type = "BANHAMMER"
            "#,
        )
        .unwrap();
        assert_eq!(config.actions.punishment.kind, PunishmentKind::Kick);
        assert!(config.actions.punishment.enabled);

        let config = DetectionConfig::from_toml(
            r#"
            [actions.punishment]
            type = "FLAG_ONLY"
            "#,
        )
        .unwrap();
        assert_eq!(config.actions.punishment.kind, PunishmentKind::FlagOnly);
    }

    #[test]
    fn malformed_whitelist_entries_are_skipped() {
        let id = Uuid::new_v4();
        let config = DetectionConfig::from_toml(&format!(
            r#"
            [exemptions]
            whitelist = ["{id}", "not-a-uuid"]
            "#
        ))
        .unwrap();
        assert_eq!(config.parsed_whitelist(), vec![id]);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DetectionConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let reparsed = DetectionConfig::from_toml(&rendered).unwrap();
        assert_relative_eq!(
            reparsed.thresholds.action_confidence,
            config.thresholds.action_confidence
        );
        assert_eq!(reparsed.actions.punishment.kind, config.actions.punishment.kind);
        assert_eq!(reparsed.exemptions.bypass_permission, "vigil.bypass");
    }
}
