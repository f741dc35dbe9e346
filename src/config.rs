use crate::decode::TRADE_DETECTED;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub event_input: EventInput,
    pub trade_event_type: String,
    pub position_conflict_retries: u32,
    pub read_retry_initial: Duration,
    pub read_retry_max: Duration,
}

/// Where the consumer reads newline-delimited envelopes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventInput {
    Stdin,
    File(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let event_input = match env_map
            .get("EVENT_INPUT")
            .map(|s| s.trim())
            .unwrap_or("-")
        {
            "" | "-" => EventInput::Stdin,
            path => EventInput::File(path.to_string()),
        };

        let trade_event_type = match env_map.get("TRADE_EVENT_TYPE").map(|s| s.trim()) {
            None => TRADE_DETECTED.to_string(),
            Some("") => {
                return Err(ConfigError::InvalidValue(
                    "TRADE_EVENT_TYPE".to_string(),
                    "must not be empty".to_string(),
                ))
            }
            Some(s) => s.to_string(),
        };

        let position_conflict_retries = env_map
            .get("POSITION_CONFLICT_RETRIES")
            .map(|s| s.as_str())
            .unwrap_or("3")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "POSITION_CONFLICT_RETRIES".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;

        let read_retry_initial = parse_millis(&env_map, "READ_RETRY_INITIAL_MS", 100)?;
        let read_retry_max = parse_millis(&env_map, "READ_RETRY_MAX_MS", 5000)?;
        if read_retry_max < read_retry_initial {
            return Err(ConfigError::InvalidValue(
                "READ_RETRY_MAX_MS".to_string(),
                "must not be below READ_RETRY_INITIAL_MS".to_string(),
            ));
        }

        Ok(Config {
            database_path,
            event_input,
            trade_event_type,
            position_conflict_retries,
            read_retry_initial,
            read_retry_max,
        })
    }
}

fn parse_millis(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match env_map.get(key) {
        None => Ok(Duration::from_millis(default)),
        Some(s) => match s.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                "must be a positive number of milliseconds".to_string(),
            )),
        },
    }
}
