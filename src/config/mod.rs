//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::rate_limit::INPUT_RATE_LIMIT;
use crate::util::time::TICK_RATE;

/// Ready frames a stalled session may drain in one server tick
pub const DEFAULT_MAX_CATCHUP_FRAMES: u32 = 4;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, empty allows any
    pub client_origins: Vec<String>,

    /// Authoritative ticks per second
    pub tick_rate: u32,
    pub max_catchup_frames: u32,
    /// Inbound messages per second per connection
    pub input_rate_limit: u32,
    /// Fixed seed for room codes; entropy when unset
    pub room_code_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: "info".to_string(),
            client_origins: Vec::new(),
            tick_rate: TICK_RATE,
            max_catchup_frames: DEFAULT_MAX_CATCHUP_FRAMES,
            input_rate_limit: INPUT_RATE_LIMIT,
            room_code_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port.trim())
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT"))?,
            (None, Some(addr)) => addr
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let tick_rate = parse_or(&lookup, "TICK_RATE", defaults.tick_rate)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origins,
            tick_rate,
            max_catchup_frames: parse_or(
                &lookup,
                "MAX_CATCHUP_FRAMES",
                defaults.max_catchup_frames,
            )?,
            input_rate_limit: parse_or(&lookup, "INPUT_RATE_LIMIT", defaults.input_rate_limit)?,
            room_code_seed: lookup("ROOM_CODE_SEED")
                .map(|seed| seed.trim().parse().map_err(|_| ConfigError::Invalid("ROOM_CODE_SEED")))
                .transpose()?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
