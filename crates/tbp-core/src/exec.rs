//! Command execution behind the gate.
//!
//! The `Terminal` is the only caller of a `CommandExecutor`: it intercepts
//! pseudo-commands, consults the `CommandGate`, and audits every decision
//! before anything touches a shell.

use std::{collections::VecDeque, path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::SessionKind,
    gate::{CommandGate, PseudoCommand},
    scheduler::{JobScheduler, JobStatus},
    sessions::{port::SessionPort, types::SessionStatus},
    utils::truncate_text,
    Result,
};

#[derive(Clone, Debug)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Executes an already-allowed command string in a restricted environment.
/// Implementations must not re-check the gate; that decision is upstream.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ExecOutput>;
}

/// Runs commands under `sh -c` with a wall-clock timeout and an output cap.
pub struct ShellExecutor {
    workdir: PathBuf,
    timeout: Duration,
    output_limit: usize,
}

impl ShellExecutor {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration, output_limit: usize) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            output_limit,
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<ExecOutput> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(res) => res?,
            // Dropping the in-flight future reaps the child (kill_on_drop).
            Err(_) => {
                return Ok(ExecOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("command timed out after {}s", self.timeout.as_secs()),
                })
            }
        };

        Ok(ExecOutput {
            success: output.status.success(),
            stdout: truncate_text(&String::from_utf8_lossy(&output.stdout), self.output_limit),
            stderr: truncate_text(&String::from_utf8_lossy(&output.stderr), self.output_limit),
        })
    }
}

/// What the terminal hands back to its front-end.
#[derive(Clone, Debug)]
pub enum TerminalReply {
    Output(ExecOutput),
    Denied { reason: String },
    /// The front owns the screen; it clears it.
    Clear,
    Text(String),
}

const HELP_TEXT: &str = "\
Available commands:
  ls / pwd / whoami / date / uptime / hostname / id / uname / df / free / env / ps
  echo <text>, which <binary>, <tool> --version
  git status|log|diff|branch|remote|show
  cat/head/tail/wc <file with a safe extension>
In-app commands:
  clear     wipe the screen
  help      this text
  history   recent commands
  status    sessions and jobs at a glance
  bots      connected bot sessions
  userbots  connected user sessions
Everything else is rejected. Chaining (;, &&, ||, |, `, $()) never passes.";

/// Operator terminal: pseudo-command interception, gate consultation,
/// bounded history. Sits strictly upstream of the executor.
pub struct Terminal {
    gate: CommandGate,
    executor: Arc<dyn CommandExecutor>,
    sessions: Arc<dyn SessionPort>,
    scheduler: JobScheduler,
    audit: Arc<AuditLogger>,
    history: tokio::sync::Mutex<VecDeque<String>>,
    history_size: usize,
}

impl Terminal {
    pub fn new(
        gate: CommandGate,
        executor: Arc<dyn CommandExecutor>,
        sessions: Arc<dyn SessionPort>,
        scheduler: JobScheduler,
        audit: Arc<AuditLogger>,
        history_size: usize,
    ) -> Self {
        Self {
            gate,
            executor,
            sessions,
            scheduler,
            audit,
            history: tokio::sync::Mutex::new(VecDeque::new()),
            history_size: history_size.max(1),
        }
    }

    pub async fn run(&self, user: &str, raw: &str) -> Result<TerminalReply> {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            self.remember(trimmed).await;
        }

        // Pseudo-commands are allowed by definition; they never reach a shell.
        if let Some(pseudo) = PseudoCommand::parse(trimmed) {
            self.log_decision(user, trimmed, true, None);
            return self.handle_pseudo(pseudo).await;
        }

        let decision = self.gate.evaluate(raw);
        self.log_decision(user, trimmed, decision.allowed, Some(decision.reason.as_str()));

        if !decision.allowed {
            return Ok(TerminalReply::Denied {
                reason: decision.reason,
            });
        }

        info!(%user, command = trimmed, "executing command");
        let output = self.executor.execute(trimmed).await?;
        Ok(TerminalReply::Output(output))
    }

    async fn handle_pseudo(&self, pseudo: PseudoCommand) -> Result<TerminalReply> {
        match pseudo {
            PseudoCommand::Clear => Ok(TerminalReply::Clear),
            PseudoCommand::Help => Ok(TerminalReply::Text(HELP_TEXT.to_string())),
            PseudoCommand::History => {
                let history = self.history.lock().await;
                if history.is_empty() {
                    return Ok(TerminalReply::Text("history is empty".to_string()));
                }
                let lines: Vec<String> = history
                    .iter()
                    .enumerate()
                    .map(|(i, cmd)| format!("{:>4}  {cmd}", i + 1))
                    .collect();
                Ok(TerminalReply::Text(lines.join("\n")))
            }
            PseudoCommand::Status => {
                let sessions = self.sessions.list_sessions().await;
                let connected = sessions
                    .iter()
                    .filter(|s| s.status == SessionStatus::Connected)
                    .count();
                let jobs = self.scheduler.list_jobs().await;
                let running = jobs
                    .iter()
                    .filter(|j| j.status == JobStatus::Running)
                    .count();
                Ok(TerminalReply::Text(format!(
                    "sessions: {connected}/{} connected\njobs: {running}/{} running",
                    sessions.len(),
                    jobs.len()
                )))
            }
            PseudoCommand::Bots => Ok(self.list_sessions_of_kind(SessionKind::Bot).await),
            PseudoCommand::Userbots => Ok(self.list_sessions_of_kind(SessionKind::User).await),
        }
    }

    async fn list_sessions_of_kind(&self, kind: SessionKind) -> TerminalReply {
        let sessions = self.sessions.list_sessions().await;
        let lines: Vec<String> = sessions
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| {
                let status = match s.status {
                    SessionStatus::Connected => "connected",
                    SessionStatus::Disconnected => "disconnected",
                };
                format!("{}  {}  {status}  sent {}", s.id.0, s.label, s.messages_sent)
            })
            .collect();

        if lines.is_empty() {
            let what = match kind {
                SessionKind::Bot => "no bot sessions connected",
                SessionKind::User => "no user sessions connected",
            };
            return TerminalReply::Text(what.to_string());
        }
        TerminalReply::Text(lines.join("\n"))
    }

    async fn remember(&self, command: &str) {
        let mut history = self.history.lock().await;
        if history.len() == self.history_size {
            history.pop_front();
        }
        history.push_back(command.to_string());
    }

    // Denials are audited, never escalated.
    fn log_decision(&self, user: &str, command: &str, allowed: bool, reason: Option<&str>) {
        let reason = reason.filter(|r| !r.is_empty());
        let _ = self
            .audit
            .write(AuditEvent::command(user, command, allowed, reason));
    }
}
