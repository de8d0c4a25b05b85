use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Largest page the member listing API accepts.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Typed configuration for the export bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub admin_user_id: i64,
    pub export_command: String,

    // TDLib gateway
    pub tdlib_gateway_url: String,
    pub tdlib_request_timeout: Duration,

    // Export
    pub export_dir: PathBuf,
    pub page_size: u32,

    // Runtime
    pub update_queue_capacity: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let admin_raw = get("BOT_ADMIN_USER_ID").ok_or_else(|| {
            Error::Config("BOT_ADMIN_USER_ID environment variable is required".to_string())
        })?;
        let admin_user_id = admin_raw.trim().parse::<i64>().map_err(|_| {
            Error::Config(format!("BOT_ADMIN_USER_ID is not a valid user id: {admin_raw}"))
        })?;

        let tdlib_gateway_url = get("TDLIB_GATEWAY_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::Config("TDLIB_GATEWAY_URL environment variable is required".to_string())
            })?;
        let tdlib_request_timeout = Duration::from_millis(
            parse_num::<u64>(get("TDLIB_REQUEST_TIMEOUT_MS")).unwrap_or(30_000),
        );

        let export_command = get("EXPORT_COMMAND")
            .map(|s| s.trim().trim_start_matches('/').to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "export".to_string());

        let export_dir = PathBuf::from(get("EXPORT_DIR").unwrap_or_else(|| "exports".to_string()));
        let page_size = parse_num::<u32>(get("EXPORT_PAGE_SIZE"))
            .unwrap_or(MAX_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let update_queue_capacity =
            parse_num::<usize>(get("UPDATE_QUEUE_CAPACITY")).unwrap_or(256).max(1);

        Ok(Self {
            telegram_bot_token,
            admin_user_id,
            export_command,
            tdlib_gateway_url,
            tdlib_request_timeout,
            export_dir,
            page_size,
            update_queue_capacity,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
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

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_num<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
