use serde::{Deserialize, Serialize};
use std::fmt;

/// A capability a runner owner has granted to a registered runner.
///
/// Capabilities gate what the Command Validator will allow a
/// `runner_exec` job to run on that runner — see
/// `foreman_dispatcher::validator`. Capabilities are additive: a runner
/// with no capabilities can still run read-only allowlisted commands,
/// `ExecFull` lifts all restrictions, `Docker` additionally allows the
/// read-only docker subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Bypasses the command validator entirely. Dangerous — granted
    /// per-runner by the owner, never by default.
    ExecFull,
    /// Read-only allowlisted commands (see `READONLY_ALLOWLIST`). This
    /// is the implicit baseline capability every runner has.
    ExecReadonly,
    /// Permits `docker ps|logs|stats|inspect|images|info|version`.
    Docker,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::ExecFull => "exec.full",
            Capability::ExecReadonly => "exec.readonly",
            Capability::Docker => "docker",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(Capability::ExecFull.to_string(), "exec.full");
        assert_eq!(Capability::ExecReadonly.to_string(), "exec.readonly");
        assert_eq!(Capability::Docker.to_string(), "docker");
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&Capability::ExecFull).unwrap();
        assert_eq!(json, "\"exec_full\"");
    }
}
