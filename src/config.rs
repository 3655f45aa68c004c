use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use chrono::Duration;

use crate::constants::{
    DEFAULT_GARBAGE_THRESHOLD, DEFAULT_NOTICE_CHANNEL_CAPACITY, DEFAULT_SESSION_MAX_TTL_SECS,
    DEFAULT_SESSION_TTL_SECS,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub seed_demo_users: bool,
    pub seed_demo_password: String,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// TTL applied on login and on every renewal.
    pub default_ttl: Duration,
    /// Longest TTL a caller may request; longer ones are rejected, not clamped.
    pub max_ttl: Duration,
    /// Renewals tolerated before the reaper rebuilds its queue from a snapshot.
    pub garbage_threshold: usize,
    pub channel_capacity: usize,
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            max_ttl: Duration::seconds(DEFAULT_SESSION_MAX_TTL_SECS),
            garbage_threshold: DEFAULT_GARBAGE_THRESHOLD,
            channel_capacity: DEFAULT_NOTICE_CHANNEL_CAPACITY,
            cookie_secure: false,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: Duration::seconds(env_or_parse(
                "SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
            )),
            max_ttl: Duration::seconds(env_or_parse(
                "SESSION_MAX_TTL_SECS",
                DEFAULT_SESSION_MAX_TTL_SECS,
            )),
            garbage_threshold: env_or_parse("SESSION_GARBAGE_THRESHOLD", defaults.garbage_threshold),
            channel_capacity: env_or_parse("SESSION_CHANNEL_CAPACITY", defaults.channel_capacity),
            cookie_secure: env_or_bool("SESSION_COOKIE_SECURE", defaults.cookie_secure),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            seed_demo_users: env_or_bool("SEED_DEMO_USERS", false),
            seed_demo_password: env_or("SEED_DEMO_PASSWORD", "changeme123"),
            session: SessionConfig::from_env(),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
