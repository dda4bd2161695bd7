//! Per-player detection state.
//!
//! The maps are the only concurrent structures; each context is owned by a
//! single ingest task at a time and its buffers are plain data. Read-only
//! status queries may observe slightly stale values, which is acceptable.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;
use vigil_stats::{Ewma, RingBuffer, RollingWindow};

use crate::{
    event::{AttackEvent, MovementEvent, PlayerName},
    features::Features,
};

/// Sizing shared by every context, taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct HistoryParams {
    pub history_size: usize,
    pub window_size: usize,
    pub ewma_alpha: f64,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            history_size: 64,
            window_size: 20,
            ewma_alpha: 0.3,
        }
    }
}

/// Movement-side state for one live player.
#[derive(Debug)]
pub struct PlayerContext {
    pub id: Uuid,
    pub name: PlayerName,

    pub telemetry: RingBuffer<MovementEvent>,
    pub features: RingBuffer<Features>,
    pub ping_window: RollingWindow,
    /// Inter-packet gaps in milliseconds. First events carry no gap and
    /// are not recorded.
    pub packet_delta_window: RollingWindow,
    pub ping_ewma: Ewma,
    pub horiz_speed_ewma: Ewma,
    pub horiz_accel_ewma: Ewma,

    pub last_telemetry_nanos: i64,
    pub last_alert_nanos: i64,
    pub exempt_until_nanos: i64,
    pub cooldown_until_nanos: i64,

    pub teleporting: bool,
    pub world_changing: bool,
    pub recent_join: bool,

    pub total_violations: u64,
    /// Violations since the last history reset (world change).
    pub recent_violations: u64,
}

impl PlayerContext {
    #[must_use]
    pub fn new(id: Uuid, name: PlayerName, params: &HistoryParams) -> Self {
        Self {
            id,
            name,
            telemetry: RingBuffer::new(params.history_size),
            features: RingBuffer::new(params.history_size),
            ping_window: RollingWindow::new(params.window_size),
            packet_delta_window: RollingWindow::new(params.window_size),
            ping_ewma: Ewma::new(params.ewma_alpha),
            horiz_speed_ewma: Ewma::new(params.ewma_alpha),
            horiz_accel_ewma: Ewma::new(params.ewma_alpha),
            last_telemetry_nanos: 0,
            last_alert_nanos: 0,
            exempt_until_nanos: 0,
            cooldown_until_nanos: 0,
            teleporting: false,
            world_changing: false,
            recent_join: false,
            total_violations: 0,
            recent_violations: 0,
        }
    }

    /// Records a movement event into the histories. Timestamps recorded
    /// here never decrease even if the host misbehaves.
    pub fn ingest(&mut self, event: &mut MovementEvent) {
        if event.nano_time < self.last_telemetry_nanos {
            event.nano_time = self.last_telemetry_nanos;
        }
        self.last_telemetry_nanos = event.nano_time;

        self.ping_window.add(f64::from(event.ping_ms));
        self.ping_ewma.update(f64::from(event.ping_ms));
        if event.tick_delta > 0 {
            self.packet_delta_window.add(event.tick_delta_ms());
        }

        self.telemetry.push(*event);
    }

    /// Appends extracted features and feeds the smoothed movement
    /// trackers.
    pub fn push_features(&mut self, features: Features) {
        self.horiz_speed_ewma.update(features.horiz_speed);
        self.horiz_accel_ewma.update(features.horiz_accel);
        self.features.push(features);
    }

    /// Clears histories and recent counters (world change). Lifetime
    /// totals and mitigation timing survive.
    pub fn reset(&mut self) {
        self.telemetry.clear();
        self.features.clear();
        self.ping_window.clear();
        self.packet_delta_window.clear();
        self.ping_ewma.reset();
        self.horiz_speed_ewma.reset();
        self.horiz_accel_ewma.reset();
        self.recent_violations = 0;
    }

    #[must_use]
    pub fn median_ping(&self) -> f64 {
        self.ping_window.median()
    }

    /// True while any transient exemption applies.
    #[must_use]
    pub fn is_exempt(&self, now: i64) -> bool {
        self.teleporting || self.world_changing || self.recent_join || now < self.exempt_until_nanos
    }
}

/// One attack with its derived aim geometry.
#[derive(Debug, Clone, Copy)]
pub struct CombatSample {
    pub event: AttackEvent,
    pub aim_error: f64,
    pub snap_angle: f64,
    pub reach: f64,
    /// True when this attack targeted someone other than the previous
    /// attack.
    pub switched_target: bool,
}

/// Combat-side state for one live player.
#[derive(Debug)]
pub struct CombatContext {
    pub id: Uuid,
    pub name: PlayerName,

    pub attacks: RingBuffer<CombatSample>,
    pub aim_error_window: RollingWindow,
    pub snap_window: RollingWindow,
    /// Reach samples, hits only.
    pub reach_window: RollingWindow,
    /// Attack intervals in milliseconds; first attacks carry no gap.
    pub interval_window: RollingWindow,
    /// 1.0 per hit, 0.0 per miss; its mean is the recent hit rate.
    pub hit_window: RollingWindow,
    pub aim_error_ewma: Ewma,
    pub interval_ewma: Ewma,

    pub attacks_total: u64,
    pub hits_total: u64,
    pub criticals_total: u64,

    pub last_target: Option<Uuid>,
    pub consecutive_target_hits: u32,
    pub last_attack_nanos: i64,
}

impl CombatContext {
    #[must_use]
    pub fn new(id: Uuid, name: PlayerName, params: &HistoryParams) -> Self {
        Self {
            id,
            name,
            attacks: RingBuffer::new(params.history_size),
            aim_error_window: RollingWindow::new(params.window_size),
            snap_window: RollingWindow::new(params.window_size),
            reach_window: RollingWindow::new(params.window_size),
            interval_window: RollingWindow::new(params.window_size),
            hit_window: RollingWindow::new(params.window_size),
            aim_error_ewma: Ewma::new(params.ewma_alpha),
            interval_ewma: Ewma::new(params.ewma_alpha),
            attacks_total: 0,
            hits_total: 0,
            criticals_total: 0,
            last_target: None,
            consecutive_target_hits: 0,
            last_attack_nanos: 0,
        }
    }

    /// Derives the aim geometry for an attack and records it. Returns the
    /// sample the combat checks analyze.
    pub fn ingest(&mut self, event: &mut AttackEvent) -> CombatSample {
        if event.nano_time < self.last_attack_nanos {
            event.nano_time = self.last_attack_nanos;
        }
        self.last_attack_nanos = event.nano_time;

        let switched_target = match (self.last_target, event.target_id) {
            (Some(last), Some(current)) => last != current,
            _ => false,
        };

        let sample = CombatSample {
            event: *event,
            aim_error: event.aim_error_degrees(),
            snap_angle: event.snap_angle_degrees(),
            reach: event.reach(),
            switched_target,
        };

        self.aim_error_window.add(sample.aim_error);
        self.snap_window.add(sample.snap_angle);
        self.aim_error_ewma.update(sample.aim_error);
        if event.attack_delta_ms > 0.0 {
            self.interval_window.add(event.attack_delta_ms);
            self.interval_ewma.update(event.attack_delta_ms);
        }
        self.hit_window.add(if event.hit { 1.0 } else { 0.0 });
        if event.hit {
            self.reach_window.add(sample.reach);
        }

        self.attacks_total += 1;
        if event.hit {
            self.hits_total += 1;
            if event.critical {
                self.criticals_total += 1;
            }
        }

        if switched_target || self.last_target.is_none() {
            self.consecutive_target_hits = u32::from(event.hit);
        } else if event.hit {
            self.consecutive_target_hits += 1;
        }
        if event.target_id.is_some() {
            self.last_target = event.target_id;
        }

        self.attacks.push(sample);
        sample
    }

    /// Clears histories and counters (world change).
    pub fn reset(&mut self) {
        self.attacks.clear();
        self.aim_error_window.clear();
        self.snap_window.clear();
        self.reach_window.clear();
        self.interval_window.clear();
        self.hit_window.clear();
        self.aim_error_ewma.reset();
        self.interval_ewma.reset();
        self.last_target = None;
        self.consecutive_target_hits = 0;
    }

    #[must_use]
    pub fn total_hit_rate(&self) -> f64 {
        if self.attacks_total == 0 {
            return 0.0;
        }
        self.hits_total as f64 / self.attacks_total as f64
    }

    #[must_use]
    pub fn critical_rate(&self) -> f64 {
        if self.hits_total == 0 {
            return 0.0;
        }
        self.criticals_total as f64 / self.hits_total as f64
    }
}

/// Concurrent id-to-context mapping. Lookups are lock-free; each context
/// carries its own mutex claimed by the player's ingest owner.
pub struct ContextMap<C> {
    map: papaya::HashMap<Uuid, Arc<Mutex<C>>>,
}

impl<C> Default for ContextMap<C> {
    fn default() -> Self {
        Self {
            map: papaya::HashMap::new(),
        }
    }
}

impl<C> ContextMap<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: Uuid, make: impl FnOnce() -> C) -> Arc<Mutex<C>> {
        let map = self.map.pin();
        map.get_or_insert_with(id, || Arc::new(Mutex::new(make())))
            .clone()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Arc<Mutex<C>>> {
        self.map.pin().get(&id).cloned()
    }

    /// Destroys the player's state. Returns whether anything was removed.
    pub fn remove(&self, id: Uuid) -> bool {
        self.map.pin().remove(&id).is_some()
    }

    pub fn clear(&self) {
        self.map.pin().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.pin().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_each(&self, mut f: impl FnMut(Uuid, &Arc<Mutex<C>>)) {
        let map = self.map.pin();
        for (id, ctx) in map.iter() {
            f(*id, ctx);
        }
    }
}
