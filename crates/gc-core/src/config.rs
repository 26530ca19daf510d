use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Typed runtime configuration, loaded from the environment (plus an optional
/// `.env` file in the working directory).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub owner_id: i64,

    // Store
    pub mongodb_uri: String,
    pub mongodb_db: String,

    // Scheduler
    pub scheduler_tick: Duration,
    pub delivery_timeout: Duration,
    pub scheduler_max_concurrency: usize,

    // Moderation
    pub admin_cache_ttl: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let owner_id = env_i64("OWNER_ID").ok_or_else(|| {
            Error::Config("OWNER_ID environment variable is required".to_string())
        })?;

        let mongodb_uri =
            env_str("MONGODB_URI").unwrap_or_else(|| "mongodb://localhost:27017".to_string());
        let mongodb_db = env_str("MONGODB_DB").unwrap_or_else(|| "guardcast".to_string());

        let scheduler_tick =
            Duration::from_secs(env_u64("SCHEDULER_TICK_SECS").unwrap_or(60).max(1));
        let delivery_timeout =
            Duration::from_secs(env_u64("DELIVERY_TIMEOUT_SECS").unwrap_or(30).max(1));
        let scheduler_max_concurrency =
            env_usize("SCHEDULER_MAX_CONCURRENCY").unwrap_or(16).max(1);

        let admin_cache_ttl = Duration::from_secs(env_u64("ADMIN_CACHE_TTL_SECS").unwrap_or(300));

        Ok(Self {
            bot_token,
            owner_id,
            mongodb_uri,
            mongodb_db,
            scheduler_tick,
            delivery_timeout,
            scheduler_max_concurrency,
            admin_cache_ttl,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
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
