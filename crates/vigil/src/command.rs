//! Admin command surface.
//!
//! The host wires its own command handler (console, in-game command, RCON)
//! to [`run`]; parsing goes through `clap` so help and error text come for
//! free.

use std::path::Path;

use clap::Parser;
use uuid::Uuid;

use crate::{config::DetectionConfig, engine::DetectionEngine};

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "vigil", about = "anti-cheat admin commands", no_binary_name = true)]
pub enum AdminCommand {
    /// Report engine health and configuration summary.
    Status,
    /// Re-read the configuration file and reconfigure every component.
    Reload,
    /// Add a player to the detection whitelist.
    Exempt { player: Uuid },
    /// Remove a player from the detection whitelist.
    Unexempt { player: Uuid },
}

impl AdminCommand {
    /// Parses a whitespace-separated command line, e.g. `"exempt <uuid>"`.
    pub fn parse_line(line: &str) -> Result<Self, clap::Error> {
        Self::try_parse_from(line.split_whitespace())
    }
}

/// Executes a command against the engine and returns the operator-facing
/// response.
pub fn run(engine: &DetectionEngine, command: AdminCommand, config_path: &Path) -> String {
    match command {
        AdminCommand::Status => {
            let status = engine.status();
            format!(
                "running={} tracked_players={} enabled_checks={} action_confidence={:.3}",
                status.running,
                status.tracked_players,
                status.enabled_checks,
                status.action_confidence,
            )
        }
        AdminCommand::Reload => match DetectionConfig::load(config_path) {
            Ok(config) => {
                engine.reload(config);
                "configuration reloaded".to_owned()
            }
            Err(e) => format!("reload failed: {e}"),
        },
        AdminCommand::Exempt { player } => {
            engine.exempt(player);
            format!("{player} exempted")
        }
        AdminCommand::Unexempt { player } => {
            engine.unexempt(player);
            format!("{player} no longer exempt")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_command() {
        assert_eq!(AdminCommand::parse_line("status").unwrap(), AdminCommand::Status);
        assert_eq!(AdminCommand::parse_line("reload").unwrap(), AdminCommand::Reload);

        let id = Uuid::new_v4();
        assert_eq!(
            AdminCommand::parse_line(&format!("exempt {id}")).unwrap(),
            AdminCommand::Exempt { player: id }
        );
        assert_eq!(
            AdminCommand::parse_line(&format!("unexempt {id}")).unwrap(),
            AdminCommand::Unexempt { player: id }
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(AdminCommand::parse_line("exempt not-a-uuid").is_err());
        assert!(AdminCommand::parse_line("selfdestruct").is_err());
    }
}
