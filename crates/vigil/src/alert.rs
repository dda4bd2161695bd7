//! Alert formatting and the dispatch seams toward the host.
//!
//! Dispatch failure is logged and swallowed; nothing here may unwind into
//! the ingest path.

use itertools::Itertools;
use thiserror::Error;
use tracing::info;

use crate::{aggregate::Violation, config::PunishmentKind};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("alert sink unavailable: {0}")]
    AlertSink(String),
    #[error("punishment executor failed: {0}")]
    Punishment(String),
}

/// Where formatted alert lines go (staff chat, console, webhook).
pub trait AlertSink: Send + Sync {
    fn send(&self, line: &str) -> Result<(), DispatchError>;
}

/// Executes kicks and mutes on the host.
pub trait PunishmentExecutor: Send + Sync {
    fn punish(&self, violation: &Violation, kind: PunishmentKind) -> Result<(), DispatchError>;
}

/// Console sink that routes alerts through the log stream.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn send(&self, line: &str) -> Result<(), DispatchError> {
        info!(target: "vigil::alerts", "{line}");
        Ok(())
    }
}

/// Executor stub for hosts that punish elsewhere.
#[derive(Debug, Default)]
pub struct NullPunisher;

impl PunishmentExecutor for NullPunisher {
    fn punish(&self, _violation: &Violation, _kind: PunishmentKind) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Renders the configured alert template for a violation.
///
/// Recognized tokens: `{player}`, `{category}`, `{confidence}`,
/// `{severity}`, `{explanation}`. Unknown tokens pass through untouched.
#[must_use]
pub fn format_alert(template: &str, violation: &Violation) -> String {
    let explanation = violation
        .explanation
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .join(", ");

    template
        .replace("{player}", &violation.name)
        .replace("{category}", &violation.category)
        .replace("{confidence}", &format!("{:.3}", violation.confidence))
        .replace("{severity}", &format!("{:.3}", violation.severity))
        .replace("{explanation}", &explanation)
}
