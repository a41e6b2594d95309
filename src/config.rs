use std::env;

use crate::error::AppError;
use crate::resolver::DEFAULT_RADIUS_M;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub broadcast_batch_size: usize,
    pub broadcast_poll_secs: u64,
    pub default_radius_m: f64,
    pub push_endpoint: String,
    pub channel_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            broadcast_batch_size: parse_or_default("BROADCAST_BATCH_SIZE", 50)?,
            broadcast_poll_secs: parse_or_default("BROADCAST_POLL_SECS", 30)?,
            default_radius_m: parse_or_default("DEFAULT_RADIUS_M", DEFAULT_RADIUS_M)?,
            push_endpoint: env::var("PUSH_API_URL")
                .unwrap_or_else(|_| "https://api.line.me/v2/bot/message/push".to_string()),
            channel_token: env::var("CHANNEL_ACCESS_TOKEN").unwrap_or_default(),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
