use std::sync::Arc;

use tbp_core::{
    audit::AuditLogger,
    auth::Authenticator,
    config::Config,
    exec::{ShellExecutor, Terminal},
    gate::CommandGate,
    scheduler::JobScheduler,
    sessions::port::SessionPort,
    store::FileStore,
};
use tbp_telegram::BotRegistry;

mod console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tbp_core::logging::init("tbp")?;

    let cfg = Arc::new(Config::load()?);

    let registry = Arc::new(BotRegistry::new());
    let sessions: Arc<dyn SessionPort> = registry.clone();

    let store = Arc::new(FileStore::new(cfg.jobs_file.clone()));
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));
    let auth = Arc::new(Authenticator::new(
        cfg.admin_user.clone(),
        cfg.admin_password_sha256.clone(),
        &cfg.token_secret,
        cfg.token_ttl,
    ));

    let scheduler = JobScheduler::new(sessions.clone(), store, cfg.min_job_interval);
    let restored = scheduler.restore().await?;
    tracing::info!(restored, data_dir = %cfg.data_dir.display(), "telebot pro started");

    let gate = CommandGate::with_defaults(&cfg.extra_blocked_patterns, &cfg.extra_allowed_patterns)?;
    let executor = Arc::new(ShellExecutor::new(
        cfg.exec_workdir.clone(),
        cfg.exec_timeout,
        cfg.exec_output_limit,
    ));
    let terminal = Terminal::new(
        gate,
        executor,
        sessions,
        scheduler.clone(),
        audit.clone(),
        cfg.history_size,
    );

    console::run(auth, audit, terminal, scheduler.clone(), registry).await?;

    scheduler.shutdown().await;
    Ok(())
}
