//! Command Validator — the capability gate a command must clear before
//! the Worker Dispatcher will ever push it to a runner.
//!
//! Table contents (forbidden characters, the destructive blocklist, the
//! read-only allowlist, the docker subcommand set) are taken verbatim
//! from the original command validator this engine replaces; the exact
//! membership matters more than readability here, so the sets are kept
//! as flat arrays rather than re-derived from some smaller rule.

use foreman_domain::capability::Capability;

const FORBIDDEN_CHARS: &[char] = &[';', '|', '&', '>', '<', '$', '(', ')', '`', '\n', '\\'];

const READONLY_ALLOWLIST: &[&str] = &[
    "uname", "uptime", "date", "whoami", "id", "df", "du", "free", "ps", "top", "hostname", "cat",
    "head", "tail", "ls", "pwd", "env", "printenv", "echo", "false", "true", "systemctl",
    "journalctl", "docker",
];

const DESTRUCTIVE_COMMANDS: &[&str] = &[
    "rm", "rmdir", "mkfs", "dd", "shutdown", "reboot", "halt", "poweroff", "useradd", "userdel",
    "usermod", "groupadd", "passwd", "chmod", "chown", "chgrp", "iptables", "ip6tables", "ufw",
    "firewall-cmd", "mount", "umount", "fdisk", "parted", "kill", "killall", "pkill",
];

const DOCKER_READONLY_SUBCOMMANDS: &[&str] =
    &["ps", "logs", "stats", "inspect", "images", "info", "version"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("command contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
    #[error("empty command")]
    EmptyCommand,
    #[error("{0} is explicitly blocked as destructive")]
    DestructiveCommand(String),
    #[error("{0} is not in the read-only allowlist")]
    NotAllowlisted(String),
    #[error("systemctl only allows the status subcommand")]
    SystemctlSubcommandNotStatus,
    #[error("journalctl requires --no-pager")]
    JournalctlMissingNoPager,
    #[error("docker requires the docker capability")]
    DockerCapabilityMissing,
    #[error("docker subcommand {0:?} is not read-only")]
    DockerSubcommandNotReadonly(String),
}

/// The program name as the shell would resolve it: the last path
/// segment of `argv[0]`, so `/usr/bin/cat` and `cat` validate
/// identically.
fn program_name(argv0: &str) -> &str {
    argv0.rsplit('/').next().unwrap_or(argv0)
}

/// Validate a command string against a runner's granted capabilities.
///
/// `Capability::ExecFull` bypasses every check below — it is granted
/// per-runner by the owner and is meant to. Absent that, every runner
/// has the implicit `exec.readonly` baseline: the strict allowlist
/// applies, and the destructive blocklist is checked *before* the
/// allowlist membership check so a blocked command gets the specific
/// "explicitly blocked" reason instead of the generic "not allowlisted"
/// one.
pub fn validate_command(command: &str, capabilities: &[Capability]) -> Result<(), ValidationError> {
    if capabilities.contains(&Capability::ExecFull) {
        return Ok(());
    }

    if let Some(c) = command.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(ValidationError::ForbiddenCharacter(c));
    }

    let argv: Vec<&str> = command.split_whitespace().collect();
    let argv0 = argv.first().ok_or(ValidationError::EmptyCommand)?;
    let program = program_name(argv0);

    if DESTRUCTIVE_COMMANDS.contains(&program) {
        return Err(ValidationError::DestructiveCommand(program.to_string()));
    }
    if !READONLY_ALLOWLIST.contains(&program) {
        return Err(ValidationError::NotAllowlisted(program.to_string()));
    }

    match program {
        "systemctl" => {
            if argv.get(1) != Some(&"status") {
                return Err(ValidationError::SystemctlSubcommandNotStatus);
            }
        }
        "journalctl" => {
            if !command.contains("--no-pager") {
                return Err(ValidationError::JournalctlMissingNoPager);
            }
        }
        "docker" => {
            if !capabilities.contains(&Capability::Docker) {
                return Err(ValidationError::DockerCapabilityMissing);
            }
            match argv.get(1) {
                Some(sub) if DOCKER_READONLY_SUBCOMMANDS.contains(sub) => {}
                other => {
                    return Err(ValidationError::DockerSubcommandNotReadonly(
                        other.copied().unwrap_or("").to_string(),
                    ))
                }
            }
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const READONLY: &[Capability] = &[Capability::ExecReadonly];

    #[test]
    fn exec_full_bypasses_everything() {
        assert!(validate_command("rm -rf /", &[Capability::ExecFull]).is_ok());
    }

    #[test]
    fn readonly_allowlisted_command_passes() {
        assert!(validate_command("ls -la /tmp", READONLY).is_ok());
    }

    #[test]
    fn forbidden_character_is_rejected() {
        let err = validate_command("ls; rm -rf /", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::ForbiddenCharacter(';'));
    }

    #[test]
    fn destructive_command_rejected_even_if_never_allowlisted() {
        let err = validate_command("rm -rf /tmp/x", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::DestructiveCommand("rm".into()));
    }

    #[test]
    fn destructive_check_wins_over_allowlist_check() {
        // `kill` is both destructive and not allowlisted; the specific
        // destructive reason must win.
        let err = validate_command("kill -9 123", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::DestructiveCommand("kill".into()));
    }

    #[test]
    fn unknown_command_rejected_as_not_allowlisted() {
        let err = validate_command("curl http://example.com", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::NotAllowlisted("curl".into()));
    }

    #[test]
    fn absolute_path_resolves_to_program_name() {
        assert!(validate_command("/bin/cat /etc/hostname", READONLY).is_ok());
    }

    #[test]
    fn systemctl_status_allowed() {
        assert!(validate_command("systemctl status nginx", READONLY).is_ok());
    }

    #[test]
    fn systemctl_restart_rejected() {
        let err = validate_command("systemctl restart nginx", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::SystemctlSubcommandNotStatus);
    }

    #[test]
    fn journalctl_without_no_pager_rejected() {
        let err = validate_command("journalctl -u nginx", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::JournalctlMissingNoPager);
    }

    #[test]
    fn journalctl_with_no_pager_allowed() {
        assert!(validate_command("journalctl -u nginx --no-pager", READONLY).is_ok());
    }

    #[test]
    fn docker_without_capability_rejected() {
        let err = validate_command("docker ps", READONLY).unwrap_err();
        assert_eq!(err, ValidationError::DockerCapabilityMissing);
    }

    #[test]
    fn docker_ps_with_capability_allowed() {
        let caps = [Capability::ExecReadonly, Capability::Docker];
        assert!(validate_command("docker ps", &caps).is_ok());
    }

    #[test]
    fn docker_exec_subcommand_rejected_even_with_capability() {
        let caps = [Capability::ExecReadonly, Capability::Docker];
        let err = validate_command("docker exec -it foo sh", &caps).unwrap_err();
        assert_eq!(err, ValidationError::DockerSubcommandNotReadonly("exec".into()));
    }
}
