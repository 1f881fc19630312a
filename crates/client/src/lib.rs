//! `tradedesk-client`: async session layer over the invoicing domain.
//!
//! Everything here is IO orchestration: talking to the backend, keeping the
//! newest list response, debouncing search input and persisting preferences.
//! Business rules live in `tradedesk-invoicing`.

pub mod backend;
pub mod banner;
pub mod config;
pub mod debounce;
#[cfg(feature = "http")]
pub mod http;
pub mod preferences;
pub mod refresh;
pub mod session;

pub use backend::memory::InMemoryBackend;
pub use backend::{BackendError, InvoiceBackend, ListQuery};
pub use banner::{Banner, BannerKind, BannerSlot};
pub use config::{ClientConfig, Environment};
pub use debounce::{FilterChange, SearchDebouncer};
#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use preferences::{
    JsonFileStore, MemoryStore, PageSizePreference, PreferenceError, PreferenceStore,
};
pub use refresh::{ListRefresher, ListState};
pub use session::{ChangeOutcome, InvoiceSession, Notice, SessionError};

/// Install logging for the configured environment.
pub fn init_logging(config: &ClientConfig) {
    tradedesk_observability::init(config.log_format());
}
