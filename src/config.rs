use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::location::NamedLocation;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub depot: NamedLocation,
    pub shift: ShiftWindow,
    pub vrp: VrpConfig,
    pub geocoder: GeocoderConfig,
    pub email: EmailConfig,
    pub persistence_url: Option<String>,
    /// Request deadline for the persistence and email clients.
    pub http_timeout: Duration,
}

/// Working hours sent for every vehicle in an optimization request.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftWindow {
    pub start: String,
    pub end: String,
}

impl Default for ShiftWindow {
    fn default() -> Self {
        Self {
            start: "08:00".to_string(),
            end: "17:00".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VrpConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub long_running_threshold: usize,
    pub poll_interval: Duration,
    /// Zero means poll until the job reports a terminal status.
    pub max_poll_attempts: u32,
    pub request_timeout: Duration,
    /// Finished optimization runs kept for status lookups.
    pub retained_runs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeocoderBackend {
    Mock,
    Google,
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub backend: GeocoderBackend,
    pub google_api_key: Option<String>,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let geocoder_backend = match env::var("GEOCODER_BACKEND")
            .unwrap_or_else(|_| "mock".to_string())
            .to_lowercase()
            .as_str()
        {
            "mock" => GeocoderBackend::Mock,
            "google" => GeocoderBackend::Google,
            other => {
                return Err(AppError::Internal(format!(
                    "invalid GEOCODER_BACKEND: {other}, expected mock/google"
                )))
            }
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3001)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            depot: NamedLocation {
                name: env::var("DEPOT_NAME").unwrap_or_else(|_| "Main Depot".to_string()),
                lat: parse_or_default("DEPOT_LAT", 49.2827)?,
                lng: parse_or_default("DEPOT_LNG", -123.1207)?,
            },
            shift: ShiftWindow {
                start: env::var("SHIFT_START").unwrap_or_else(|_| "08:00".to_string()),
                end: env::var("SHIFT_END").unwrap_or_else(|_| "17:00".to_string()),
            },
            vrp: VrpConfig {
                api_key: optional("ROUTIFIC_API_KEY"),
                base_url: env::var("ROUTIFIC_BASE_URL")
                    .unwrap_or_else(|_| "https://api.routific.com/v1".to_string()),
                long_running_threshold: parse_or_default("LONG_RUNNING_THRESHOLD", 60)?,
                poll_interval: Duration::from_millis(parse_or_default("POLL_INTERVAL_MS", 2000)?),
                max_poll_attempts: parse_or_default("MAX_POLL_ATTEMPTS", 150)?,
                request_timeout: Duration::from_millis(parse_or_default("VRP_TIMEOUT_MS", 60_000)?),
                retained_runs: parse_or_default("RETAINED_RUNS", 20)?,
            },
            geocoder: GeocoderConfig {
                backend: geocoder_backend,
                google_api_key: optional("GOOGLE_MAPS_API_KEY"),
                interval: Duration::from_millis(parse_or_default("GEOCODE_INTERVAL_MS", 200)?),
                timeout: Duration::from_millis(parse_or_default("GEOCODE_TIMEOUT_MS", 5_000)?),
            },
            email: EmailConfig {
                api_url: optional("EMAIL_API_URL"),
                api_key: optional("EMAIL_API_KEY"),
                from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "dispatch@route-planner.local".to_string()),
            },
            persistence_url: optional("PERSISTENCE_URL"),
            http_timeout: Duration::from_millis(parse_or_default("HTTP_TIMEOUT_MS", 10_000)?),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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
