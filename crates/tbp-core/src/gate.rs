use regex::Regex;
use tracing::debug;

use crate::{errors::Error, Result};

pub const REASON_DANGEROUS: &str = "dangerous pattern";
pub const REASON_NOT_ALLOWED: &str = "not in allow list";

/// Built-in deny table, checked before anything else. Overlapping entries
/// are deliberate; the list reads as a catalogue, not a minimal cover.
const BLOCKED_PATTERNS: &[&str] = &[
    // Destructive filesystem and disk operations.
    r"rm\s+(-[a-z]+\s+)*[/~.]",
    r"rm\s+-[a-z]*[rf]",
    r"\bmkfs",
    r"\bdd\s+if=",
    r">\s*/dev/",
    r"\bshred\b",
    r":\(\)\s*\{",
    // Privilege escalation.
    r"\bsudo\b",
    r"^su\b",
    r"\bchown\b",
    r"\bchmod\b",
    // Network exfiltration primitives.
    r"\bnc\b",
    r"\bncat\b",
    r"\bcurl\b",
    r"\bwget\b",
    r"\bssh\b",
    r"\bscp\b",
    // Shell chaining, subshells, redirection, background jobs.
    r";",
    r"&",
    r"\|",
    r"`",
    r"\$\(",
    r">",
    r"<",
];

/// Built-in allow catalogue: read-only/informational commands plus the
/// in-app pseudo-commands. Anchored; input is trimmed and lowercased
/// before matching.
const ALLOWED_PATTERNS: &[&str] = &[
    // Bare informational commands.
    r"^(ls|pwd|whoami|date|uptime|hostname|id|uname|df|free|env|ps)$",
    r"^(ls|df|du|free|uname|ps)\s+-[a-z]+$",
    r"^ls\s+(-[a-z]+\s+)?[\w./-]+$",
    r"^ps\s+aux?$",
    r"^echo\s+[\w .,:!?'-]*$",
    r"^which\s+[\w.-]+$",
    // Version probes.
    r"^(node|npm|npx|python3?|pip3?|cargo|rustc|git|docker)\s+(--version|-v)$",
    // Read-only git.
    r"^git\s+(status|log|diff|branch|remote|show|shortlog)(\s+[\w./@^~=-]+)*$",
    // Reading files with safe extensions.
    r"^(cat|head|tail|wc|less)\s+(-[a-z0-9]+\s+)?[\w./-]+\.(txt|md|json|yaml|yml|toml|log|rs|js|ts|sh)$",
    // In-app pseudo-commands (intercepted upstream, listed here so the
    // gate agrees they are fine).
    r"^(clear|help|history|status|bots|userbots)$",
];

/// Verdict for one command string. Ephemeral; consumed by the caller,
/// never stored (the audit log keeps its own record).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandDecision {
    pub allowed: bool,
    pub reason: String,
}

impl CommandDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

/// Commands handled inside the app; they must never reach a shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PseudoCommand {
    Clear,
    Help,
    History,
    Status,
    Bots,
    Userbots,
}

impl PseudoCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "clear" => Some(Self::Clear),
            "help" => Some(Self::Help),
            "history" => Some(Self::History),
            "status" => Some(Self::Status),
            "bots" => Some(Self::Bots),
            "userbots" => Some(Self::Userbots),
            _ => None,
        }
    }
}

/// Allow/deny decision function for operator-submitted commands.
///
/// The pattern tables are immutable after construction. Deny is checked
/// strictly before allow, so a string matching both is always rejected,
/// and anything matching neither is rejected too (fail-closed).
pub struct CommandGate {
    blocked: Vec<Regex>,
    allowed: Vec<Regex>,
}

impl CommandGate {
    /// Gate over custom tables. Patterns are matched against the trimmed,
    /// lowercased command string.
    pub fn new(blocked: &[String], allowed: &[String]) -> Result<Self> {
        Ok(Self {
            blocked: compile(blocked)?,
            allowed: compile(allowed)?,
        })
    }

    /// Gate over the built-in tables, with optional extra patterns
    /// appended (config-provided).
    pub fn with_defaults(extra_blocked: &[String], extra_allowed: &[String]) -> Result<Self> {
        let mut blocked: Vec<String> = BLOCKED_PATTERNS.iter().map(|s| s.to_string()).collect();
        blocked.extend(extra_blocked.iter().cloned());
        let mut allowed: Vec<String> = ALLOWED_PATTERNS.iter().map(|s| s.to_string()).collect();
        allowed.extend(extra_allowed.iter().cloned());
        Self::new(&blocked, &allowed)
    }

    /// Decide whether `raw` may be forwarded to a command executor.
    /// Pure; no side effects.
    pub fn evaluate(&self, raw: &str) -> CommandDecision {
        let cmd = raw.trim().to_lowercase();
        if cmd.is_empty() {
            return CommandDecision::deny(REASON_NOT_ALLOWED);
        }

        for re in &self.blocked {
            if re.is_match(&cmd) {
                debug!(pattern = re.as_str(), "command hit the block list");
                return CommandDecision::deny(REASON_DANGEROUS);
            }
        }

        for re in &self.allowed {
            if re.is_match(&cmd) {
                return CommandDecision::allow();
            }
        }

        CommandDecision::deny(REASON_NOT_ALLOWED)
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::Config(format!("bad gate pattern {p:?}: {e}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> CommandGate {
        CommandGate::with_defaults(&[], &[]).unwrap()
    }

    #[test]
    fn allow_catalogue_passes() {
        let g = gate();
        for cmd in ["pwd", "whoami", "date", "git status", "cat README.md"] {
            let d = g.evaluate(cmd);
            assert!(d.allowed, "{cmd} should be allowed, got: {}", d.reason);
        }
    }

    #[test]
    fn block_wins_over_allow() {
        let g = gate();
        let d = g.evaluate("ls; rm -rf /");
        assert!(!d.allowed);
        assert_eq!(d.reason, REASON_DANGEROUS);
    }

    #[test]
    fn privilege_escalation_is_blocked() {
        let g = gate();
        let d = g.evaluate("sudo reboot");
        assert!(!d.allowed);
        assert_eq!(d.reason, REASON_DANGEROUS);
    }

    #[test]
    fn chaining_and_subshells_are_blocked() {
        let g = gate();
        for cmd in [
            "ls && whoami",
            "date || true",
            "echo `id`",
            "echo $(id)",
            "uptime &",
            "cat notes.txt | head",
        ] {
            let d = g.evaluate(cmd);
            assert!(!d.allowed, "{cmd} should be denied");
            assert_eq!(d.reason, REASON_DANGEROUS, "{cmd}");
        }
    }

    #[test]
    fn unknown_commands_fall_through_to_deny() {
        let g = gate();
        let d = g.evaluate("frobnicate");
        assert!(!d.allowed);
        assert_eq!(d.reason, REASON_NOT_ALLOWED);
    }

    #[test]
    fn empty_and_whitespace_are_denied() {
        let g = gate();
        assert!(!g.evaluate("").allowed);
        assert!(!g.evaluate("   \t ").allowed);
    }

    #[test]
    fn input_is_normalized_before_matching() {
        let g = gate();
        assert!(g.evaluate("  PWD  ").allowed);
        assert!(!g.evaluate("SUDO reboot").allowed);
    }

    #[test]
    fn cat_requires_a_safe_extension() {
        let g = gate();
        assert!(g.evaluate("cat notes.txt").allowed);
        assert!(!g.evaluate("cat /etc/passwd").allowed);
        assert!(!g.evaluate("cat id_rsa").allowed);
    }

    #[test]
    fn pseudo_commands_are_recognized() {
        let g = gate();
        for cmd in ["clear", "help", "history", "status", "bots", "userbots"] {
            assert!(g.evaluate(cmd).allowed, "{cmd}");
            assert!(PseudoCommand::parse(cmd).is_some(), "{cmd}");
        }
        assert_eq!(PseudoCommand::parse(" HELP "), Some(PseudoCommand::Help));
        assert_eq!(PseudoCommand::parse("ls"), None);
    }

    #[test]
    fn custom_tables_replace_the_defaults() {
        let g = CommandGate::new(
            &[r"forbidden".to_string()],
            &[r"^frobnicate$".to_string()],
        )
        .unwrap();
        assert!(g.evaluate("frobnicate").allowed);
        assert!(!g.evaluate("forbidden frobnicate").allowed);
        assert!(!g.evaluate("pwd").allowed); // defaults are gone
    }

    #[test]
    fn extra_patterns_extend_the_defaults() {
        let g = CommandGate::with_defaults(
            &[r"^uptime$".to_string()],
            &[r"^frobnicate$".to_string()],
        )
        .unwrap();
        assert!(g.evaluate("frobnicate").allowed);
        assert!(!g.evaluate("uptime").allowed); // extra block outranks built-in allow
        assert!(g.evaluate("pwd").allowed);
    }
}
