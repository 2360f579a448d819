//! # Utilities Module
//!
//! Internal utility modules for the campaign-core crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod classifier;
pub(crate) mod limiter;
pub(crate) mod logger;
pub(crate) mod rate_limiter;
pub(crate) mod retry;
pub(crate) mod runner;

// Selective exports - only public utilities
pub use classifier::{classify, ErrorClass};
pub use limiter::{ConcurrencyLimiter, LimiterStats};
pub use logger::{setup_logger, setup_logger_with_file};
pub use rate_limiter::RateGovernor;
pub use retry::{with_timeout, RetryExecutor, RetryStats, BASE_RETRY_DELAY_MS};
pub use runner::CampaignRunner;
