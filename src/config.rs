use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::pricing::{
    PricingConfig, DEFAULT_FLAT_DELIVERY_FEE, DEFAULT_FREE_SHIPPING_THRESHOLD,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server settings read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Orders are kept in memory when unset.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub pricing: PricingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL"),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(get("PORT"), "PORT", "a valid port number", 8080)?,
            pricing: PricingConfig {
                free_shipping_threshold: parse(
                    get("FREE_SHIPPING_THRESHOLD"),
                    "FREE_SHIPPING_THRESHOLD",
                    "a number",
                    DEFAULT_FREE_SHIPPING_THRESHOLD,
                )?,
                flat_delivery_fee: parse(
                    get("FLAT_DELIVERY_FEE"),
                    "FLAT_DELIVERY_FEE",
                    "a number",
                    DEFAULT_FLAT_DELIVERY_FEE,
                )?,
                apply_line_discounts: parse(
                    get("APPLY_LINE_DISCOUNTS"),
                    "APPLY_LINE_DISCOUNTS",
                    "true or false",
                    false,
                )?,
            },
        })
    }
}

fn parse<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value: raw,
        }),
    }
}
