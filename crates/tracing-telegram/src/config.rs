// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::constants::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::ConfigError;
use crate::layer::HandlerOptions;
use crate::sender::SenderOptions;

/// Layer configuration read from `TELEGRAM_*` environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token (`TELEGRAM_BOT_TOKEN`)
    pub token: String,
    /// Destination chat (`TELEGRAM_CHAT_ID`)
    pub chat_id: i64,
    /// Bot API root (`TELEGRAM_BASE_URL`)
    pub base_url: String,
    /// Payloads that trigger a flush (`TELEGRAM_BATCH_SIZE`)
    pub batch_size: usize,
    /// Flush timer, 0 disables it (`TELEGRAM_FLUSH_INTERVAL_MS`)
    pub flush_interval: Duration,
    /// Per-request timeout (`TELEGRAM_TIMEOUT_SECS`)
    pub timeout: Duration,
    /// Minimum forwarded level (`TELEGRAM_LOG_LEVEL`)
    pub log_level: String,
    /// Log Bot API traffic at debug level (`TELEGRAM_VERBOSE`)
    pub verbose: bool,
    /// HTTPS proxy URL (`TELEGRAM_PROXY_HTTPS`, then `HTTPS_PROXY`)
    pub https_proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: 0,
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: 0,
            flush_interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            log_level: "info".to_string(),
            verbose: false,
            https_proxy: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Create configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse or the result
    /// fails [`Config::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let chat_id = parse_var("TELEGRAM_CHAT_ID")?.unwrap_or(defaults.chat_id);
        let base_url = env::var("TELEGRAM_BASE_URL").unwrap_or(defaults.base_url);
        let batch_size = parse_var("TELEGRAM_BATCH_SIZE")?.unwrap_or(defaults.batch_size);
        let flush_interval = parse_var("TELEGRAM_FLUSH_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.flush_interval);
        let timeout = parse_var("TELEGRAM_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let log_level = env::var("TELEGRAM_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);
        let verbose = env::var("TELEGRAM_VERBOSE")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false);
        let https_proxy = env::var("TELEGRAM_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            token,
            chat_id,
            base_url,
            batch_size,
            flush_interval,
            timeout,
            log_level,
            verbose,
            https_proxy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the token or chat ID is missing, the base URL is
    /// empty, the timeout is zero, or the log level is unknown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if self.chat_id == 0 {
            return Err(ConfigError::MissingChatId);
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "TELEGRAM_BASE_URL",
                value: self.base_url.clone(),
            });
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "TELEGRAM_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        self.level()?;

        Ok(())
    }

    /// Parsed `log_level`
    pub fn level(&self) -> Result<Level, ConfigError> {
        let level = match self.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: "TELEGRAM_LOG_LEVEL",
                    value: self.log_level.clone(),
                })
            }
        };
        Ok(level)
    }

    pub fn sender_options(&self) -> SenderOptions {
        SenderOptions {
            token: self.token.clone(),
            chat_id: self.chat_id,
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            https_proxy: self.https_proxy.clone(),
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            verbose: self.verbose,
            ..Default::default()
        }
    }

    pub fn handler_options(&self) -> Result<HandlerOptions, ConfigError> {
        Ok(HandlerOptions {
            level: self.level()?,
            sender: self.sender_options(),
            ..Default::default()
        })
    }
}
