use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, scheduler::MIN_INTERVAL_SECS, Result};

/// Typed configuration for TeleBot Pro.
///
/// Everything comes from the environment (with a `.env` fallback) so the
/// service can run unchanged on a laptop, in a container, or under systemd.
#[derive(Clone, Debug)]
pub struct Config {
    // Operator auth
    pub admin_user: String,
    pub admin_password_sha256: String,
    pub token_secret: String,
    pub token_ttl: Duration,

    // Storage
    pub data_dir: PathBuf,
    pub jobs_file: PathBuf,
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,

    // Scheduler
    pub min_job_interval: Duration,

    // Terminal
    pub exec_workdir: PathBuf,
    pub exec_timeout: Duration,
    pub exec_output_limit: usize,
    pub history_size: usize,

    // Command gate extensions (appended to the built-in tables)
    pub extra_blocked_patterns: Vec<String>,
    pub extra_allowed_patterns: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let admin_user = env_str("TBP_ADMIN_USER").unwrap_or_default();
        let admin_password_sha256 = env_str("TBP_ADMIN_PASSWORD_SHA256")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let token_secret = env_str("TBP_TOKEN_SECRET").unwrap_or_default();

        if admin_user.trim().is_empty() {
            return Err(Error::Config(
                "TBP_ADMIN_USER environment variable is required".to_string(),
            ));
        }
        if admin_password_sha256.len() != 64 || !admin_password_sha256.is_ascii() {
            return Err(Error::Config(
                "TBP_ADMIN_PASSWORD_SHA256 must be a 64-char hex SHA-256 digest".to_string(),
            ));
        }
        if token_secret.trim().len() < 16 {
            return Err(Error::Config(
                "TBP_TOKEN_SECRET must be at least 16 characters".to_string(),
            ));
        }

        let token_ttl = Duration::from_secs(env_u64("TBP_TOKEN_TTL_SECS").unwrap_or(86_400));

        // Storage layout under one data dir.
        let data_dir =
            PathBuf::from(env_str("TBP_DATA_DIR").unwrap_or("/tmp/telebot-pro".to_string()));
        fs::create_dir_all(&data_dir)?;
        let jobs_file = data_dir.join("jobs.json");
        let audit_log_path = env_str("TBP_AUDIT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("audit.log"));
        let audit_log_json = env_bool("TBP_AUDIT_JSON").unwrap_or(false);

        // The 10s floor is a hard product rule, not a default.
        let min_job_interval = Duration::from_secs(
            env_u64("TBP_MIN_JOB_INTERVAL_SECS")
                .unwrap_or(MIN_INTERVAL_SECS)
                .max(MIN_INTERVAL_SECS),
        );

        let exec_workdir = env_str("TBP_EXEC_WORKDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.clone());
        let exec_timeout = Duration::from_secs(env_u64("TBP_EXEC_TIMEOUT_SECS").unwrap_or(30));
        let exec_output_limit = env_usize("TBP_EXEC_OUTPUT_LIMIT").unwrap_or(64 * 1024);
        let history_size = env_usize("TBP_HISTORY_SIZE").unwrap_or(100);

        let extra_blocked_patterns = parse_csv(env_str("TBP_EXTRA_BLOCKED_PATTERNS"));
        let extra_allowed_patterns = parse_csv(env_str("TBP_EXTRA_ALLOWED_PATTERNS"));

        Ok(Self {
            admin_user,
            admin_password_sha256,
            token_secret,
            token_ttl,
            data_dir,
            jobs_file,
            audit_log_path,
            audit_log_json,
            min_job_interval,
            exec_workdir,
            exec_timeout,
            exec_output_limit,
            history_size,
            extra_blocked_patterns,
            extra_allowed_patterns,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
