//! Derived per-event features.

use itertools::Itertools;

use crate::{context::PlayerContext, event::MovementEvent};

/// Nominal server tick interval in milliseconds; packet cadence is judged
/// against it.
pub const NOMINAL_TICK_MS: f64 = 50.0;

/// A tick gap above this marks the player as lagging.
pub const LAG_TICK_DELTA_NANOS: i64 = 200_000_000;

/// Everything the checks read per movement event, derived once.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    /// Horizontal speed in world units per event.
    pub horiz_speed: f64,
    /// Signed vertical speed (`dy`).
    pub vert_speed: f64,
    pub speed_3d: f64,
    /// Change in horizontal speed since the previous event.
    pub horiz_accel: f64,
    pub vert_accel: f64,
    /// Combined rotation speed in degrees per event.
    pub rotation_speed: f64,
    pub yaw_accel: f64,
    pub pitch_accel: f64,
    /// Dispersion of consecutive horizontal-speed differences; high for
    /// erratic motion, near zero for scripted motion.
    pub jitter_score: f64,
    /// Relative deviation of the packet cadence from the ping-adjusted
    /// nominal tick.
    pub timing_skew: f64,
    /// Smoothed ping, falling back to the raw sample until the tracker
    /// initializes.
    pub ping_normalized: f64,
    pub is_lagging: bool,
    /// Telemetry history length at extraction time.
    pub sample_count: usize,
}

/// Derives features for `event`, which must already be the newest entry in
/// the context's telemetry history. The feature history is untouched; the
/// caller appends the result afterwards.
#[must_use]
pub fn extract(event: &MovementEvent, ctx: &PlayerContext) -> Features {
    let horiz_speed = event.dx.hypot(event.dz);
    let vert_speed = event.dy;
    let speed_3d = (event.dx * event.dx + event.dy * event.dy + event.dz * event.dz).sqrt();

    let previous = ctx.features.newest();
    let horiz_accel = previous.map_or(0.0, |prev| horiz_speed - prev.horiz_speed);
    let vert_accel = previous.map_or(0.0, |prev| vert_speed - prev.vert_speed);

    let delta_yaw = f64::from(event.delta_yaw);
    let delta_pitch = f64::from(event.delta_pitch);
    let rotation_speed = delta_yaw.hypot(delta_pitch);

    // Telemetry age 1 is the event before this one.
    let prior = ctx.telemetry.get(1);
    let yaw_accel = prior.map_or(0.0, |p| delta_yaw - f64::from(p.delta_yaw));
    let pitch_accel = prior.map_or(0.0, |p| delta_pitch - f64::from(p.delta_pitch));

    let median_ping = ctx.ping_window.median();
    let ping_mad = ctx.ping_window.mad();
    let ping = f64::from(event.ping_ms);

    let timing_skew = if ctx.packet_delta_window.is_empty() {
        0.0
    } else {
        let expected = NOMINAL_TICK_MS + 0.02 * median_ping;
        (ctx.packet_delta_window.median() - expected).abs() / expected
    };

    let ping_normalized = if ctx.ping_ewma.is_initialized() {
        ctx.ping_ewma.get()
    } else {
        ping
    };

    let ping_spike = ping_mad > 0.0 && ping > 3.0f64.mul_add(ping_mad, median_ping);
    let is_lagging = ping_spike || event.tick_delta > LAG_TICK_DELTA_NANOS;

    Features {
        horiz_speed,
        vert_speed,
        speed_3d,
        horiz_accel,
        vert_accel,
        rotation_speed,
        yaw_accel,
        pitch_accel,
        jitter_score: jitter_score(ctx),
        timing_skew,
        ping_normalized,
        is_lagging,
        sample_count: ctx.telemetry.len(),
    }
}

/// Standard deviation of consecutive horizontal-speed differences over the
/// newest (up to) ten telemetry samples. Needs five samples to say
/// anything.
fn jitter_score(ctx: &PlayerContext) -> f64 {
    const JITTER_WINDOW: usize = 10;
    const MIN_JITTER_SAMPLES: usize = 5;

    let newest = ctx.telemetry.len().min(JITTER_WINDOW);
    if newest < MIN_JITTER_SAMPLES {
        return 0.0;
    }

    let speeds: Vec<f64> = (0..newest)
        .rev()
        .filter_map(|age| ctx.telemetry.get(age))
        .map(|event| event.dx.hypot(event.dz))
        .collect();

    let diffs: Vec<f64> = speeds
        .iter()
        .tuple_windows()
        .map(|(a, b)| b - a)
        .collect();

    vigil_stats::std_dev(&diffs)
}
