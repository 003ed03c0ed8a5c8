// src/config.rs

use std::{env, net::SocketAddr};

use dotenvy::dotenv;
use thiserror::Error;

/// Used when `BIND_ADDR` is not set.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,

    /// Pass threshold (percent) for exams that define no `passing_score`.
    /// `None` means such exams can never be passed.
    pub default_passing_percentage: Option<f64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let default_passing_percentage = match env::var("EXAM_DEFAULT_PASSING_PERCENTAGE") {
            Ok(raw) => Some(parse_percentage(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            default_passing_percentage,
        })
    }
}

fn parse_percentage(raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw.trim().parse().map_err(|e: std::num::ParseFloatError| {
        ConfigError::Invalid {
            name: "EXAM_DEFAULT_PASSING_PERCENTAGE",
            reason: e.to_string(),
        }
    })?;

    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::Invalid {
            name: "EXAM_DEFAULT_PASSING_PERCENTAGE",
            reason: format!("{value} is outside 0..=100"),
        });
    }

    Ok(value)
}
