//! Epidemic domain for Pulse
//!
//! Keeps today's and yesterday's country-level figures, persists the
//! 7-field epidemic record when the tests figure moves, and reports
//! day-over-day deltas.

pub mod client;
pub mod country;
pub mod record;
pub mod service;
pub mod types;

pub use client::EpidemicClient;
pub use country::CountryResolver;
pub use record::{date_label, EpidemicRecord, EPIDEMIC_KEY, TESTS_FIELD};
pub use service::EpidemicCacheService;
pub use types::*;
