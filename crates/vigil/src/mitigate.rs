//! Exemption and cooldown gates between a violation and a decision.

use tracing::debug;
use uuid::Uuid;

use crate::{
    aggregate::Violation,
    config::{DetectionConfig, PunishmentKind},
    context::PlayerContext,
};

/// What the engine decided to do about one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing; the reason says why.
    None,
    /// Record only; punishment is configured as flag-only.
    Flag,
    /// Notify staff.
    Alert,
    /// Hand the player to the punishment executor.
    Punish,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: Action,
    pub violation: Option<Violation>,
    pub reason: String,
}

impl Decision {
    #[must_use]
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            action: Action::None,
            violation: None,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self.action, Action::None)
    }
}

/// Game mode as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// The engine's only inbound queries to the host-game layer.
pub trait HostInterface: Send + Sync {
    fn gamemode(&self, player: Uuid) -> GameMode;
    fn has_permission(&self, player: Uuid, node: &str) -> bool;
}

/// Host stub for tests and headless runs: survival mode, no permissions.
#[derive(Debug, Default)]
pub struct NullHost;

impl HostInterface for NullHost {
    fn gamemode(&self, _player: Uuid) -> GameMode {
        GameMode::Survival
    }

    fn has_permission(&self, _player: Uuid, _node: &str) -> bool {
        false
    }
}

/// Applies the exemption and cooldown policy to violations, first match
/// wins.
#[derive(Debug, Clone)]
pub struct MitigationPolicy {
    exemption_nanos: i64,
    cooldown_nanos: i64,
    lag_grace_nanos: i64,
    bypass_permission: String,
    exempt_creative: bool,
    exempt_spectator: bool,
    punishment_enabled: bool,
    punishment_threshold: f64,
    punishment_kind: PunishmentKind,
}

const fn millis_to_nanos(ms: u64) -> i64 {
    (ms as i64).saturating_mul(1_000_000)
}

impl MitigationPolicy {
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            exemption_nanos: millis_to_nanos(config.windows.exemption_ms),
            cooldown_nanos: millis_to_nanos(config.windows.cooldown_ms),
            lag_grace_nanos: millis_to_nanos(config.windows.lag_grace_ms),
            bypass_permission: config.exemptions.bypass_permission.clone(),
            exempt_creative: config.exemptions.exempt_creative,
            exempt_spectator: config.exemptions.exempt_spectator,
            punishment_enabled: config.actions.punishment.enabled,
            punishment_threshold: config.actions.punishment.threshold,
            punishment_kind: config.actions.punishment.kind,
        }
    }

    pub fn configure(&mut self, config: &DetectionConfig) {
        *self = Self::new(config);
    }

    #[must_use]
    pub const fn punishment_kind(&self) -> PunishmentKind {
        self.punishment_kind
    }

    /// Grants a short exemption to absorb transient noise (teleport
    /// landings, flag clears).
    pub fn mark_exempt(&self, ctx: &mut PlayerContext, now: i64) {
        ctx.exempt_until_nanos = ctx.exempt_until_nanos.max(now + self.exemption_nanos);
    }

    /// Longer grace for players whose connection just hiccuped.
    pub fn mark_lag_exempt(&self, ctx: &mut PlayerContext, now: i64) {
        ctx.exempt_until_nanos = ctx.exempt_until_nanos.max(now + self.lag_grace_nanos);
    }

    /// Evaluates a violation against the player's mitigation state.
    /// `whitelisted` is the engine's whitelist lookup for this player.
    pub fn evaluate(
        &self,
        violation: Violation,
        ctx: &mut PlayerContext,
        whitelisted: bool,
        host: &dyn HostInterface,
        now: i64,
    ) -> Decision {
        if whitelisted {
            return Decision::none("player is whitelisted");
        }
        if host.has_permission(violation.player, &self.bypass_permission) {
            return Decision::none("player holds the bypass permission");
        }
        match host.gamemode(violation.player) {
            GameMode::Creative if self.exempt_creative => {
                return Decision::none("creative gamemode is exempt");
            }
            GameMode::Spectator if self.exempt_spectator => {
                return Decision::none("spectator gamemode is exempt");
            }
            _ => {}
        }
        if ctx.is_exempt(now) {
            debug!(
                player = %violation.name,
                "violation absorbed by exemption window"
            );
            return Decision::none("player is inside an exemption window");
        }
        if now < ctx.cooldown_until_nanos {
            return Decision::none("player is inside the violation cooldown");
        }

        ctx.cooldown_until_nanos = now + self.cooldown_nanos;
        ctx.last_alert_nanos = now;
        ctx.total_violations += 1;
        ctx.recent_violations += 1;

        let action = if self.punishment_enabled && violation.confidence >= self.punishment_threshold
        {
            if self.punishment_kind == PunishmentKind::FlagOnly {
                Action::Flag
            } else {
                Action::Punish
            }
        } else {
            Action::Alert
        };

        let reason = format!(
            "{} at confidence {:.4}",
            violation.category, violation.confidence
        );
        Decision {
            action,
            violation: Some(violation),
            reason,
        }
    }
}
