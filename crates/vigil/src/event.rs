//! Immutable telemetry inputs sourced from the host game.

use derive_more::{Deref, Display, From};
use glam::DVec3;
use uuid::Uuid;

/// The in-game display name of a player. Informational only; every lookup
/// keys on the [`Uuid`].
#[derive(Debug, Clone, PartialEq, Eq, Deref, From, Display)]
pub struct PlayerName(Box<str>);

impl PlayerName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerName {
    fn from(name: &str) -> Self {
        Self(name.into())
    }
}

impl From<String> for PlayerName {
    fn from(name: String) -> Self {
        Self(name.into_boxed_str())
    }
}

/// Wraps an angle in degrees into `[-180, 180]`.
#[must_use]
pub fn wrap_degrees(angle: f32) -> f32 {
    let mut wrapped = angle % 360.0;
    if wrapped >= 180.0 {
        wrapped -= 360.0;
    }
    if wrapped < -180.0 {
        wrapped += 360.0;
    }
    wrapped
}

/// Movement state reported by the host alongside each position packet.
///
/// Anything other than `on_ground` marks the event as special movement:
/// the regular physics envelopes do not apply and movement checks skip it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementFlags {
    pub on_ground: bool,
    pub in_vehicle: bool,
    pub teleporting: bool,
    pub swimming: bool,
    pub gliding: bool,
    pub climbing: bool,
}

impl MovementFlags {
    #[must_use]
    pub const fn special_movement(self) -> bool {
        self.in_vehicle || self.teleporting || self.swimming || self.gliding || self.climbing
    }
}

/// One movement packet, already reduced to deltas by the host layer.
#[derive(Debug, Clone, Copy)]
pub struct MovementEvent {
    /// Position deltas since the previous event, in world units.
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Absolute rotation at this event.
    pub yaw: f32,
    pub pitch: f32,
    /// Rotation deltas, wrapped into `[-180, 180]`.
    pub delta_yaw: f32,
    pub delta_pitch: f32,
    pub flags: MovementFlags,
    /// Round-trip latency reported by the host, in milliseconds.
    pub ping_ms: u32,
    /// Monotonic timestamp from the engine clock.
    pub nano_time: i64,
    /// Nanoseconds since this player's previous event; 0 on the first.
    pub tick_delta: i64,
}

impl MovementEvent {
    #[must_use]
    pub const fn special_movement(&self) -> bool {
        self.flags.special_movement()
    }

    /// Nanoseconds since the previous event expressed in milliseconds.
    #[must_use]
    pub fn tick_delta_ms(&self) -> f64 {
        self.tick_delta as f64 / 1_000_000.0
    }
}

/// One attack swing, with the rotation one frame before the attack so snap
/// rotations are observable.
#[derive(Debug, Clone, Copy)]
pub struct AttackEvent {
    pub attacker_pos: DVec3,
    /// Rotation at the attack frame.
    pub yaw: f32,
    pub pitch: f32,
    /// Rotation one frame before the attack.
    pub pre_yaw: f32,
    pub pre_pitch: f32,
    /// Center of the target's hitbox.
    pub target_pos: DVec3,
    pub target_id: Option<Uuid>,
    pub hit: bool,
    pub critical: bool,
    pub damage: f64,
    /// Milliseconds since this player's previous attack; 0 on the first.
    pub attack_delta_ms: f64,
    pub ping_ms: u32,
    pub nano_time: i64,
}

impl AttackEvent {
    /// Unit view vector for a yaw/pitch pair, in the host game's
    /// convention (yaw 0 faces +z, pitch positive looks down).
    #[must_use]
    pub fn view_direction(yaw: f32, pitch: f32) -> DVec3 {
        let yaw = f64::from(yaw).to_radians();
        let pitch = f64::from(pitch).to_radians();
        DVec3::new(
            -yaw.sin() * pitch.cos(),
            -pitch.sin(),
            yaw.cos() * pitch.cos(),
        )
    }

    /// Angular distance in degrees between the attack view direction and
    /// the direction that would face the target's center. Zero when the
    /// target overlaps the attacker.
    #[must_use]
    pub fn aim_error_degrees(&self) -> f64 {
        let to_target = self.target_pos - self.attacker_pos;
        if to_target.length_squared() < 1e-12 {
            return 0.0;
        }
        let view = Self::view_direction(self.yaw, self.pitch);
        let cos = view.dot(to_target.normalize()).clamp(-1.0, 1.0);
        cos.acos().to_degrees()
    }

    /// Magnitude of the rotation change between the pre-attack frame and
    /// the attack frame, in degrees.
    #[must_use]
    pub fn snap_angle_degrees(&self) -> f64 {
        let dyaw = f64::from(wrap_degrees(self.yaw - self.pre_yaw));
        let dpitch = f64::from(self.pitch - self.pre_pitch);
        dyaw.hypot(dpitch)
    }

    /// 3D distance between attacker and target at attack time.
    #[must_use]
    pub fn reach(&self) -> f64 {
        self.attacker_pos.distance(self.target_pos)
    }

    /// Horizontal-plane distance between attacker and target.
    #[must_use]
    pub fn horizontal_reach(&self) -> f64 {
        let delta = self.target_pos - self.attacker_pos;
        delta.x.hypot(delta.z)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::DVec3;

    use super::*;

    fn attack_at(yaw: f32, pitch: f32, target: DVec3) -> AttackEvent {
        AttackEvent {
            attacker_pos: DVec3::ZERO,
            yaw,
            pitch,
            pre_yaw: yaw,
            pre_pitch: pitch,
            target_pos: target,
            target_id: None,
            hit: true,
            critical: false,
            damage: 1.0,
            attack_delta_ms: 0.0,
            ping_ms: 0,
            nano_time: 0,
        }
    }

    #[test]
    fn wrap_degrees_window() {
        assert_relative_eq!(wrap_degrees(0.0), 0.0);
        assert_relative_eq!(wrap_degrees(190.0), -170.0);
        assert_relative_eq!(wrap_degrees(-190.0), 170.0);
        assert_relative_eq!(wrap_degrees(360.0), 0.0);
        assert_relative_eq!(wrap_degrees(540.0), -180.0, epsilon = 1e-3);
    }

    #[test]
    fn aim_error_is_zero_when_facing_target() {
        // yaw 0, pitch 0 faces +z.
        let attack = attack_at(0.0, 0.0, DVec3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(attack.aim_error_degrees(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn aim_error_quarter_turn() {
        let attack = attack_at(0.0, 0.0, DVec3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(attack.aim_error_degrees(), 90.0, epsilon = 1e-6);
    }

    #[test]
    fn snap_angle_wraps_across_the_seam() {
        let mut attack = attack_at(179.0, 0.0, DVec3::new(0.0, 0.0, 3.0));
        attack.pre_yaw = -179.0;
        assert_relative_eq!(attack.snap_angle_degrees(), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn reach_distances() {
        let attack = attack_at(0.0, 0.0, DVec3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(attack.reach(), 5.0);
        assert_relative_eq!(attack.horizontal_reach(), 3.0);
    }

    #[test]
    fn special_movement_excludes_on_ground() {
        let mut flags = MovementFlags {
            on_ground: true,
            ..MovementFlags::default()
        };
        assert!(!flags.special_movement());

        flags.gliding = true;
        assert!(flags.special_movement());
    }
}
