//! The engine orchestrator: wires ingest through extraction, the check
//! battery, aggregation, mitigation and dispatch, and owns the lifecycle
//! hooks.
//!
//! Per-player mutation is serialized by the event-delivery layer (one
//! ingest owner per player); the engine itself only requires that and is
//! otherwise safe to call from any thread.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use vigil_clock::Clock;
use vigil_scheduled::DeadlineQueue;

use crate::{
    aggregate::{Aggregator, Violation},
    alert::{self, AlertSink, NullPunisher, PunishmentExecutor, TracingAlertSink},
    analytics::AnalyticsUplink,
    check::{
        CombatAimbotCheck, CombatAutoclickerCheck, CombatCheck, CombatReachCheck,
        MovementCheck, MovementConsistencyCheck, PacketTimingCheck, PredictionDriftCheck,
    },
    config::{DetectionConfig, PunishmentKind},
    context::{CombatContext, ContextMap, HistoryParams, PlayerContext},
    event::{AttackEvent, MovementEvent},
    features,
    mitigate::{Action, Decision, HostInterface, MitigationPolicy, NullHost},
};

/// Housekeeping executed from [`DetectionEngine::tick`].
enum EngineTask {
    ClearRecentJoin(Uuid),
    ClearTeleporting(Uuid),
    ClearWorldChanging(Uuid),
    ExecutePunishment(Box<Violation>, PunishmentKind),
}

/// Snapshot for the admin `status` command.
#[derive(Debug, Clone, Copy)]
pub struct EngineStatus {
    pub running: bool,
    pub tracked_players: usize,
    pub enabled_checks: usize,
    pub action_confidence: f64,
}

/// Read-only per-player snapshot for status reporting. Values may be
/// slightly stale relative to the ingest owner.
#[derive(Debug, Clone, Copy)]
pub struct PlayerStats {
    pub sample_count: usize,
    pub last_telemetry_nanos: i64,
    pub total_violations: u64,
    pub recent_violations: u64,
}

pub struct DetectionEngine {
    config: RwLock<DetectionConfig>,
    params: RwLock<HistoryParams>,
    clock: Arc<dyn Clock>,

    players: ContextMap<PlayerContext>,
    combat: ContextMap<CombatContext>,

    movement_checks: RwLock<Vec<Box<dyn MovementCheck>>>,
    combat_checks: RwLock<Vec<Box<dyn CombatCheck>>>,
    aggregator: RwLock<Aggregator>,
    policy: RwLock<MitigationPolicy>,

    whitelist: RwLock<HashSet<Uuid>>,
    scheduled: Mutex<DeadlineQueue<EngineTask>>,

    host: Arc<dyn HostInterface>,
    alert_sink: Arc<dyn AlertSink>,
    punisher: Arc<dyn PunishmentExecutor>,
    analytics: Mutex<Option<AnalyticsUplink>>,

    running: AtomicBool,
}

const fn millis_to_nanos(ms: u64) -> i64 {
    (ms as i64).saturating_mul(1_000_000)
}

fn params_from(config: &DetectionConfig) -> HistoryParams {
    HistoryParams {
        history_size: config.history.size,
        window_size: config.stats.median_window,
        ewma_alpha: config.stats.ewma_alpha,
    }
}

impl DetectionEngine {
    #[must_use]
    pub fn new(mut config: DetectionConfig, clock: Arc<dyn Clock>) -> Self {
        config.sanitize();

        let movement_checks: Vec<Box<dyn MovementCheck>> = vec![
            Box::new(PacketTimingCheck::new(&config)),
            Box::new(MovementConsistencyCheck::new(&config)),
            Box::new(PredictionDriftCheck::new(&config)),
        ];
        let combat_checks: Vec<Box<dyn CombatCheck>> = vec![
            Box::new(CombatAimbotCheck::new(&config)),
            Box::new(CombatReachCheck::new(&config)),
            Box::new(CombatAutoclickerCheck::new(&config)),
        ];

        let analytics = if config.analytics.enabled {
            match AnalyticsUplink::spawn(&config.analytics, clock.nano_time()) {
                Ok(uplink) => Some(uplink),
                Err(e) => {
                    warn!("failed to start the analytics uplink: {e}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            whitelist: RwLock::new(config.parsed_whitelist().into_iter().collect()),
            params: RwLock::new(params_from(&config)),
            aggregator: RwLock::new(Aggregator::new(&config)),
            policy: RwLock::new(MitigationPolicy::new(&config)),
            config: RwLock::new(config),
            clock,
            players: ContextMap::new(),
            combat: ContextMap::new(),
            movement_checks: RwLock::new(movement_checks),
            combat_checks: RwLock::new(combat_checks),
            scheduled: Mutex::new(DeadlineQueue::new()),
            host: Arc::new(NullHost),
            alert_sink: Arc::new(TracingAlertSink),
            punisher: Arc::new(NullPunisher),
            analytics: Mutex::new(analytics),
            running: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn HostInterface>) -> Self {
        self.host = host;
        self
    }

    #[must_use]
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = sink;
        self
    }

    #[must_use]
    pub fn with_punisher(mut self, punisher: Arc<dyn PunishmentExecutor>) -> Self {
        self.punisher = punisher;
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Feeds one movement event through the full pipeline and returns the
    /// decision. Must be called by the player's single ingest owner.
    pub fn ingest_movement(&self, player: Uuid, name: &str, mut event: MovementEvent) -> Decision {
        if !self.is_running() {
            return Decision::none("engine is stopped");
        }
        let whitelisted = self.whitelist.read().contains(&player);
        if whitelisted {
            return Decision::none("player is whitelisted");
        }

        let params = *self.params.read();
        let ctx_arc = self
            .players
            .get_or_create(player, || PlayerContext::new(player, name.into(), &params));
        let mut ctx = ctx_arc.lock();
        if ctx.name.as_str() != name && !name.is_empty() {
            ctx.name = name.into();
        }

        ctx.ingest(&mut event);
        let extracted = features::extract(&event, &ctx);
        ctx.push_features(extracted);
        let now = event.nano_time;

        if extracted.is_lagging {
            self.policy.read().mark_lag_exempt(&mut ctx, now);
            return Decision::none("lag spike grace window");
        }

        let mut results = Vec::new();
        for check in self.movement_checks.read().iter() {
            if !check.is_enabled() {
                continue;
            }
            match check.analyze(&event, &extracted, &ctx) {
                Ok(result) => results.push(result),
                Err(e) => warn!(check = check.name(), "check failed, result omitted: {e}"),
            }
        }

        let violation =
            self.aggregator
                .read()
                .aggregate(player, &ctx.name, results, now, event.ping_ms);
        let Some(violation) = violation else {
            return Decision::none("no actionable violation");
        };

        let decision =
            self.policy
                .read()
                .evaluate(violation, &mut ctx, whitelisted, self.host.as_ref(), now);
        drop(ctx);

        self.dispatch(&decision, now);
        decision
    }

    /// Feeds one attack event through the combat pipeline. Mitigation
    /// state lives on the movement context, so cooldowns and exemptions
    /// span both event kinds.
    pub fn ingest_attack(&self, player: Uuid, name: &str, mut event: AttackEvent) -> Decision {
        if !self.is_running() {
            return Decision::none("engine is stopped");
        }
        let whitelisted = self.whitelist.read().contains(&player);
        if whitelisted {
            return Decision::none("player is whitelisted");
        }

        let params = *self.params.read();
        let combat_arc = self
            .combat
            .get_or_create(player, || CombatContext::new(player, name.into(), &params));

        let mut results = Vec::new();
        let now;
        {
            let mut combat = combat_arc.lock();
            combat.ingest(&mut event);
            now = event.nano_time;

            for check in self.combat_checks.read().iter() {
                if !check.is_enabled() {
                    continue;
                }
                match check.analyze(&event, &combat) {
                    Ok(result) => results.push(result),
                    Err(e) => warn!(check = check.name(), "check failed, result omitted: {e}"),
                }
            }
        }

        let ctx_arc = self
            .players
            .get_or_create(player, || PlayerContext::new(player, name.into(), &params));
        let mut ctx = ctx_arc.lock();

        let violation =
            self.aggregator
                .read()
                .aggregate(player, &ctx.name, results, now, event.ping_ms);
        let Some(violation) = violation else {
            return Decision::none("no actionable violation");
        };

        let decision =
            self.policy
                .read()
                .evaluate(violation, &mut ctx, whitelisted, self.host.as_ref(), now);
        drop(ctx);

        self.dispatch(&decision, now);
        decision
    }

    fn dispatch(&self, decision: &Decision, now: i64) {
        let Some(violation) = &decision.violation else {
            return;
        };

        let config = self.config.read();
        if config.actions.alerts.enabled {
            let line = alert::format_alert(&config.actions.alerts.format, violation);
            if let Err(e) = self.alert_sink.send(&line) {
                warn!("alert dispatch failed: {e}");
            }
        }

        if decision.action == Action::Punish {
            let kind = config.actions.punishment.kind;
            let delay_ms = config.actions.punishment.delay_ms;
            if delay_ms > 0 {
                self.scheduled.lock().schedule(
                    now + millis_to_nanos(delay_ms),
                    EngineTask::ExecutePunishment(Box::new(violation.clone()), kind),
                );
            } else if let Err(e) = self.punisher.punish(violation, kind) {
                warn!("punishment dispatch failed: {e}");
            }
        }

        if let Some(uplink) = self.analytics.lock().as_ref() {
            if let Err(e) = uplink.offer(violation) {
                debug!("analytics record dropped: {e}");
            }
        }
    }

    /// Runs due housekeeping tasks. Call once per host tick from the main
    /// thread.
    pub fn tick(&self) {
        let now = self.clock.nano_time();
        let due: Vec<EngineTask> = self.scheduled.lock().pop_until(now).collect();
        for task in due {
            match task {
                EngineTask::ClearRecentJoin(id) => {
                    self.clear_flag(id, now, |ctx| ctx.recent_join = false);
                }
                EngineTask::ClearTeleporting(id) => {
                    self.clear_flag(id, now, |ctx| ctx.teleporting = false);
                }
                EngineTask::ClearWorldChanging(id) => {
                    self.clear_flag(id, now, |ctx| ctx.world_changing = false);
                }
                EngineTask::ExecutePunishment(violation, kind) => {
                    if let Err(e) = self.punisher.punish(&violation, kind) {
                        warn!("punishment dispatch failed: {e}");
                    }
                }
            }
        }
    }

    /// Flag clears are idempotent; a task firing after the player quit is
    /// a no-op.
    fn clear_flag(&self, id: Uuid, now: i64, clear: impl FnOnce(&mut PlayerContext)) {
        let Some(ctx_arc) = self.players.get(id) else {
            return;
        };
        let mut ctx = ctx_arc.lock();
        clear(&mut ctx);
        self.policy.read().mark_exempt(&mut ctx, now);
    }

    #[instrument(skip(self))]
    pub fn on_join(&self, player: Uuid, name: &str) {
        let now = self.clock.nano_time();
        let params = *self.params.read();
        let ctx_arc = self
            .players
            .get_or_create(player, || PlayerContext::new(player, name.into(), &params));
        ctx_arc.lock().recent_join = true;

        let grace = self.config.read().windows.join_exemption_ms;
        self.scheduled
            .lock()
            .schedule(now + millis_to_nanos(grace), EngineTask::ClearRecentJoin(player));
        info!("tracking joined player");
    }

    #[instrument(skip(self))]
    pub fn on_quit(&self, player: Uuid) {
        self.players.remove(player);
        self.combat.remove(player);
    }

    #[instrument(skip(self))]
    pub fn on_teleport(&self, player: Uuid) {
        let now = self.clock.nano_time();
        let params = *self.params.read();
        let ctx_arc = self
            .players
            .get_or_create(player, || PlayerContext::new(player, "".into(), &params));
        ctx_arc.lock().teleporting = true;

        let grace = self.config.read().windows.teleport_exemption_ms;
        self.scheduled.lock().schedule(
            now + millis_to_nanos(grace),
            EngineTask::ClearTeleporting(player),
        );
    }

    /// Sets the world-change flag and resets the player's histories
    /// immediately; the flag clears on a delay like a teleport.
    #[instrument(skip(self))]
    pub fn on_world_change(&self, player: Uuid) {
        let now = self.clock.nano_time();
        let params = *self.params.read();
        let ctx_arc = self
            .players
            .get_or_create(player, || PlayerContext::new(player, "".into(), &params));
        {
            let mut ctx = ctx_arc.lock();
            ctx.world_changing = true;
            ctx.reset();
        }
        if let Some(combat_arc) = self.combat.get(player) {
            combat_arc.lock().reset();
        }

        let grace = self.config.read().windows.teleport_exemption_ms;
        self.scheduled.lock().schedule(
            now + millis_to_nanos(grace),
            EngineTask::ClearWorldChanging(player),
        );
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let enabled_checks = self
            .movement_checks
            .read()
            .iter()
            .filter(|check| check.is_enabled())
            .count()
            + self
                .combat_checks
                .read()
                .iter()
                .filter(|check| check.is_enabled())
                .count();

        EngineStatus {
            running: self.is_running(),
            tracked_players: self.players.len(),
            enabled_checks,
            action_confidence: self.aggregator.read().action_confidence(),
        }
    }

    /// Applies a new configuration to every component without a restart.
    /// Applying the same configuration twice is a no-op.
    pub fn reload(&self, mut config: DetectionConfig) {
        config.sanitize();

        for check in self.movement_checks.write().iter_mut() {
            check.configure(&config);
        }
        for check in self.combat_checks.write().iter_mut() {
            check.configure(&config);
        }
        self.aggregator.write().configure(&config);
        self.policy.write().configure(&config);
        *self.whitelist.write() = config.parsed_whitelist().into_iter().collect();
        *self.params.write() = params_from(&config);
        *self.config.write() = config;
        info!("configuration reloaded");
    }

    pub fn exempt(&self, player: Uuid) {
        if self.whitelist.write().insert(player) {
            info!(%player, "player added to the whitelist");
        }
    }

    pub fn unexempt(&self, player: Uuid) {
        if self.whitelist.write().remove(&player) {
            info!(%player, "player removed from the whitelist");
        }
    }

    #[must_use]
    pub fn is_whitelisted(&self, player: Uuid) -> bool {
        self.whitelist.read().contains(&player)
    }

    #[must_use]
    pub fn player_stats(&self, player: Uuid) -> Option<PlayerStats> {
        let ctx_arc = self.players.get(player)?;
        let ctx = ctx_arc.lock();
        Some(PlayerStats {
            sample_count: ctx.telemetry.len(),
            last_telemetry_nanos: ctx.last_telemetry_nanos,
            total_violations: ctx.total_violations,
            recent_violations: ctx.recent_violations,
        })
    }

    /// Stops ingesting, clears all per-player state, and joins the
    /// analytics worker.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.scheduled.lock().clear();
        self.players.clear();
        self.combat.clear();
        if let Some(uplink) = self.analytics.lock().take() {
            uplink.shutdown();
        }
        info!("detection engine stopped");
    }
}
