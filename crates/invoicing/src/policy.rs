//! Tunable ledger rules (currency precision, edit window, diagnostics mode).

use chrono::{FixedOffset, Offset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use tradedesk_core::CurrencyPrecision;

/// Whether development diagnostics (field guard, invariant checks) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    Development,
    Production,
}

impl GuardMode {
    /// Development in debug builds, production in release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Development
    }
}

impl Default for GuardMode {
    fn default() -> Self {
        Self::for_build()
    }
}

/// Rules shared by the reconciler, the action resolver and reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    pub precision: CurrencyPrecision,
    /// How long an issued invoice stays editable after `issuedAt`.
    pub edit_window: TimeDelta,
    /// Offset at which "today" and due dates are compared.
    pub business_offset: FixedOffset,
    pub guard_mode: GuardMode,
}

pub const DEFAULT_EDIT_WINDOW_HOURS: i64 = 24;

/// Gulf Standard Time (+04:00).
pub const DEFAULT_BUSINESS_OFFSET_SECONDS: i32 = 4 * 3600;

impl LedgerPolicy {
    /// Out-of-range values keep the current window.
    pub fn with_edit_window_hours(mut self, hours: i64) -> Self {
        match TimeDelta::try_hours(hours).filter(|w| *w >= TimeDelta::zero()) {
            Some(window) => self.edit_window = window,
            None => tracing::warn!(hours, "edit window out of range, keeping current value"),
        }
        self
    }

    pub fn with_guard_mode(mut self, mode: GuardMode) -> Self {
        self.guard_mode = mode;
        self
    }

    pub fn with_precision(mut self, precision: CurrencyPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Offset from seconds east of UTC; out-of-range values keep the current offset.
    pub fn with_business_offset_seconds(mut self, seconds: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(seconds) {
            self.business_offset = offset;
        }
        self
    }
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            precision: CurrencyPrecision::default(),
            edit_window: TimeDelta::hours(DEFAULT_EDIT_WINDOW_HOURS),
            business_offset: FixedOffset::east_opt(DEFAULT_BUSINESS_OFFSET_SECONDS)
                .unwrap_or_else(|| Utc.fix()),
            guard_mode: GuardMode::default(),
        }
    }
}
