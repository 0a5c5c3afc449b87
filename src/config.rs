// src/config.rs

use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, read from the environment once at startup and
/// passed by reference into everything that needs it. No globals.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server
    pub host: String,
    pub port: u16,

    // ── Providers
    pub openrouter_base_url: String,
    pub llm7_api_url: String,
    pub llm7_api_key: Option<String>,
    pub app_referer: Option<String>,
    pub app_title: String,

    // ── Database
    pub database_url: String,
    pub sqlite_max_connections: u32,

    // ── Consensus timing
    pub consensus_timeout: Duration,
    pub slow_notice_after: Duration,

    // ── Logging
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Tolerate trailing comments and whitespace in .env values
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

fn env_var_opt(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(val) => {
            let clean = val.split('#').next().unwrap_or("").trim().to_string();
            if clean.is_empty() { None } else { Some(clean) }
        }
        Err(_) => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_var_or("CONCORD_HOST", "0.0.0.0".to_string()),
            port: env_var_or("CONCORD_PORT", 3001),
            openrouter_base_url: env_var_or(
                "OPENROUTER_BASE_URL",
                "https://openrouter.ai/api/v1".to_string(),
            ),
            llm7_api_url: env_var_or(
                "LLM7_API_URL",
                "https://api.llm7.io/v1/chat/completions".to_string(),
            ),
            llm7_api_key: env_var_opt("LLM7_API_KEY"),
            app_referer: env_var_opt("CONCORD_APP_REFERER"),
            app_title: env_var_or("CONCORD_APP_TITLE", "Concord Chat".to_string()),
            database_url: env_var_or("DATABASE_URL", "sqlite:./concord.db".to_string()),
            sqlite_max_connections: env_var_or("SQLITE_MAX_CONNECTIONS", 10),
            consensus_timeout: Duration::from_millis(env_var_or(
                "CONCORD_CONSENSUS_TIMEOUT_MS",
                180_000,
            )),
            slow_notice_after: Duration::from_millis(env_var_or(
                "CONCORD_SLOW_NOTICE_MS",
                30_000,
            )),
            log_level: env_var_or("CONCORD_LOG_LEVEL", "info".to_string()),
        }
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
