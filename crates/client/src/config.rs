//! Client configuration from `TRADEDESK_*` environment variables.
//!
//! Every setting has a default; unparsable values are logged and ignored so a
//! typo in the environment never prevents the client from starting.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;

use tradedesk_core::CurrencyPrecision;
use tradedesk_invoicing::{GuardMode, LedgerPolicy};
use tradedesk_observability::LogFormat;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_BANNER_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" | "test" => Ok(Self::Development),
            "prod" | "production" | "staging" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub auth_token: Option<String>,
    pub environment: Environment,
    pub search_debounce: Duration,
    pub banner_timeout: Duration,
    /// Overrides the platform config directory for stored preferences.
    pub preferences_path: Option<PathBuf>,
    pub edit_window_hours: i64,
    pub currency_decimals: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            environment: if cfg!(debug_assertions) {
                Environment::Development
            } else {
                Environment::Production
            },
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            banner_timeout: Duration::from_millis(DEFAULT_BANNER_MS),
            preferences_path: None,
            edit_window_hours: tradedesk_invoicing::policy::DEFAULT_EDIT_WINDOW_HOURS,
            currency_decimals: CurrencyPrecision::default().decimal_places,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_url: non_empty("TRADEDESK_API_URL").unwrap_or(defaults.api_url),
            auth_token: non_empty("TRADEDESK_AUTH_TOKEN"),
            environment: parsed(&non_empty, "TRADEDESK_ENV").unwrap_or(defaults.environment),
            search_debounce: parsed(&non_empty, "TRADEDESK_SEARCH_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.search_debounce),
            banner_timeout: parsed(&non_empty, "TRADEDESK_BANNER_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.banner_timeout),
            preferences_path: non_empty("TRADEDESK_PREFERENCES_PATH").map(PathBuf::from),
            edit_window_hours: parsed(&non_empty, "TRADEDESK_EDIT_WINDOW_HOURS")
                .filter(|h: &i64| {
                    let ok = *h >= 0 && TimeDelta::try_hours(*h).is_some();
                    if !ok {
                        tracing::warn!(hours = *h, "edit window out of range, using default");
                    }
                    ok
                })
                .unwrap_or(defaults.edit_window_hours),
            currency_decimals: parsed(&non_empty, "TRADEDESK_CURRENCY_DECIMALS")
                .filter(|d: &u32| *d <= 8)
                .unwrap_or(defaults.currency_decimals),
        }
    }

    pub fn guard_mode(&self) -> GuardMode {
        match self.environment {
            Environment::Development => GuardMode::Development,
            Environment::Production => GuardMode::Production,
        }
    }

    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy::default()
            .with_edit_window_hours(self.edit_window_hours)
            .with_precision(CurrencyPrecision::with_decimal_places(self.currency_decimals))
            .with_guard_mode(self.guard_mode())
    }

    pub fn log_format(&self) -> LogFormat {
        match self.environment {
            Environment::Development => LogFormat::Pretty,
            Environment::Production => LogFormat::Json,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting, using default");
            None
        }
    }
}
