//! Vigil
//!
//! Streaming anti-cheat detection for a voxel game server. Telemetry and
//! attack events flow per player through feature extraction, a battery of
//! heuristic checks, max-confidence aggregation, and a mitigation policy
//! of exemption windows and cooldowns before anything is acted on.
//!
//! The pipeline is tuned for a low false-positive rate: every check feeds
//! a saturating sigmoid, the action gate sits near the top of it, and
//! transient disruptions (joins, teleports, lag spikes, world changes)
//! open grace windows during which nothing fires.
//!
//! Nothing in the pipeline is fatal. A failing check loses its result, a
//! failing dispatch loses its alert, an overflowing analytics queue loses
//! records; the event stream keeps flowing.

pub use aggregate::{Aggregator, Violation};
pub use alert::{AlertSink, DispatchError, PunishmentExecutor, TracingAlertSink, format_alert};
pub use analytics::AnalyticsUplink;
pub use check::{CheckCategory, CheckError, CheckResult, CombatCheck, MovementCheck};
pub use config::{DetectionConfig, PunishmentKind};
pub use context::{CombatContext, ContextMap, HistoryParams, PlayerContext};
pub use engine::{DetectionEngine, EngineStatus, PlayerStats};
pub use event::{AttackEvent, MovementEvent, MovementFlags, PlayerName, wrap_degrees};
pub use features::{Features, extract};
pub use mitigate::{Action, Decision, GameMode, HostInterface, MitigationPolicy, NullHost};

pub mod aggregate;
pub mod alert;
pub mod analytics;
pub mod check;
pub mod command;
pub mod config;
pub mod context;
pub mod engine;
pub mod event;
pub mod features;
pub mod mitigate;
