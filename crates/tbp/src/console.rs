//! Operator console: a line-oriented front over the terminal, the
//! scheduler and the session registry. Stands in for the web dashboard.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use tbp_core::{
    audit::{AuditEvent, AuditLogger},
    auth::Authenticator,
    domain::{JobId, SessionId, Target},
    exec::{Terminal, TerminalReply},
    scheduler::{Job, JobScheduler, JobSpec},
};
use tbp_telegram::BotRegistry;

const BANNER: &str = "\
TeleBot Pro console
  login <user> <password>           authenticate
  bot add <name> <token>            connect a bot session
  bot remove <name>                 drop a bot session
  job add <session> <targets,csv> <interval-secs> <repeat|-> <message...>
  job list | show|start|pause|stop|delete <id>
  exit                              quit
Anything else goes to the gated terminal (try `help`).";

pub async fn run(
    auth: Arc<Authenticator>,
    audit: Arc<AuditLogger>,
    terminal: Terminal,
    scheduler: JobScheduler,
    registry: Arc<BotRegistry>,
) -> anyhow::Result<()> {
    println!("{BANNER}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut token: Option<String> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["exit"] | ["quit"] => break,

            ["login", user, password] => {
                match auth.authenticate(user, password) {
                    Ok(issued) => {
                        let _ = audit.write(AuditEvent::auth(user, true));
                        println!("authenticated until {}", issued.expires_at.to_rfc3339());
                        token = Some(issued.token);
                    }
                    Err(e) => {
                        let _ = audit.write(AuditEvent::auth(user, false));
                        println!("{e}");
                    }
                }
            }
            ["login", ..] => println!("usage: login <user> <password>"),

            ["logout"] => {
                token = None;
                println!("logged out");
            }

            // Everything below needs a valid token.
            _ => {
                let Some(user) = current_user(&auth, &token) else {
                    println!("not authenticated; use: login <user> <password>");
                    continue;
                };

                match tokens.as_slice() {
                    ["bot", "add", name, bot_token] => {
                        match registry.add_bot(SessionId(name.to_string()), bot_token).await {
                            Ok(info) => println!("connected {} as {}", info.id.0, info.label),
                            Err(e) => println!("{e}"),
                        }
                    }
                    ["bot", "remove", name] => {
                        match registry.remove(&SessionId(name.to_string())).await {
                            Ok(()) => println!("removed {name}"),
                            Err(e) => println!("{e}"),
                        }
                    }
                    ["bot", ..] => println!("usage: bot add <name> <token> | bot remove <name>"),

                    ["job", ..] => handle_job(&user, &tokens, &line, &scheduler, &audit).await,

                    // The gated terminal gets everything else verbatim.
                    _ => match terminal.run(&user, &line).await {
                        Ok(TerminalReply::Output(out)) => {
                            if !out.stdout.is_empty() {
                                println!("{}", out.stdout.trim_end());
                            }
                            if !out.stderr.is_empty() {
                                eprintln!("{}", out.stderr.trim_end());
                            }
                            if !out.success {
                                println!("(command failed)");
                            }
                        }
                        Ok(TerminalReply::Denied { reason }) => println!("denied: {reason}"),
                        Ok(TerminalReply::Clear) => print!("\x1b[2J\x1b[1;1H"),
                        Ok(TerminalReply::Text(text)) => println!("{text}"),
                        Err(e) => println!("{e}"),
                    },
                }
            }
        }
    }

    Ok(())
}

fn current_user(auth: &Authenticator, token: &Option<String>) -> Option<String> {
    let claims = auth.verify(token.as_deref()?).ok()?;
    Some(claims.sub)
}

async fn handle_job(
    user: &str,
    tokens: &[&str],
    line: &str,
    scheduler: &JobScheduler,
    audit: &AuditLogger,
) {
    match tokens {
        ["job", "add", session, targets, interval, repeat, ..] => {
            let Ok(interval_secs) = interval.parse::<u64>() else {
                println!("interval must be a number of seconds");
                return;
            };
            let repeat_limit = match *repeat {
                "-" => None,
                n => match n.parse::<u32>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        println!("repeat must be a number or `-` for unbounded");
                        return;
                    }
                },
            };
            // The message is everything after the fixed fields.
            let message = line
                .split_whitespace()
                .skip(6)
                .collect::<Vec<_>>()
                .join(" ");

            let spec = JobSpec {
                session_id: SessionId(session.to_string()),
                targets: targets
                    .split(',')
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .map(|t| Target(t.to_string()))
                    .collect(),
                message,
                interval_secs,
                repeat_limit,
                start_now: true,
            };

            match scheduler.create_job(spec).await {
                Ok(job) => {
                    let _ = audit.write(AuditEvent::job(user, &job.id.0, "created"));
                    println!("{}", job_line(&job));
                }
                Err(e) => println!("{e}"),
            }
        }
        ["job", "add", ..] => {
            println!("usage: job add <session> <targets,csv> <interval-secs> <repeat|-> <message...>");
        }

        ["job", "list"] => {
            let jobs = scheduler.list_jobs().await;
            if jobs.is_empty() {
                println!("no jobs");
                return;
            }
            for job in jobs {
                println!("{}", job_line(&job));
            }
        }

        ["job", action @ ("show" | "start" | "pause" | "stop" | "delete"), id] => {
            let Some(job_id) = resolve_job(scheduler, id).await else {
                return;
            };
            let result = match *action {
                "show" => scheduler.get_job(&job_id).await.map(Some),
                "start" => scheduler.start_job(&job_id).await.map(Some),
                "pause" => scheduler.pause_job(&job_id).await.map(Some),
                "stop" => scheduler.stop_job(&job_id).await.map(Some),
                "delete" => scheduler.delete_job(&job_id).await.map(|()| None),
                _ => unreachable!(),
            };
            match result {
                Ok(Some(job)) => {
                    if *action != "show" {
                        let _ = audit.write(AuditEvent::job(user, &job_id.0, action));
                    }
                    println!("{}", job_line(&job));
                }
                Ok(None) => {
                    let _ = audit.write(AuditEvent::job(user, &job_id.0, action));
                    println!("deleted {}", short(&job_id.0));
                }
                Err(e) => println!("{e}"),
            }
        }

        _ => println!("usage: job add|list|show|start|pause|stop|delete"),
    }
}

/// Accept unambiguous id prefixes so the operator does not have to paste
/// full UUIDs.
async fn resolve_job(scheduler: &JobScheduler, prefix: &str) -> Option<JobId> {
    let matches: Vec<JobId> = scheduler
        .list_jobs()
        .await
        .into_iter()
        .map(|j| j.id)
        .filter(|id| id.0.starts_with(prefix))
        .collect();

    match matches.len() {
        0 => {
            println!("no job matches {prefix}");
            None
        }
        1 => Some(matches.into_iter().next().unwrap()),
        n => {
            println!("{n} jobs match {prefix}; be more specific");
            None
        }
    }
}

fn job_line(job: &Job) -> String {
    let next = job
        .stats
        .next_run
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:9}  every {}s  sent {} (ok {} / fail {})  next {}",
        short(&job.id.0),
        job.status.as_str(),
        job.interval_secs,
        job.stats.total_sent,
        job.stats.successful,
        job.stats.failed,
        next
    )
}

fn short(id: &str) -> &str {
    &id[..id.len().min(8)]
}
