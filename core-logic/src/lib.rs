//! # Campaign Core - Bounded-Concurrency Batch Orchestrator
//!
//! Drives a two-step remote protocol over many date-keyed work items while
//! holding a concurrency ceiling and a batch dispatch rate, retrying
//! transient failures and never dispatching the same key twice.
//!
//! ## Modules
//!
//! - [`batch`] - Concurrent execution of one batch of work items
//! - [`campaign`] - The campaign loop and its final report
//! - [`config`] - Campaign configuration (TOML)
//! - [`error`] - Typed error handling with thiserror
//! - [`generator`] - Work items and the de-duplication set
//! - [`metrics`] - Running totals and the campaign report
//! - [`traits`] - Protocol and progress-observer seams

pub mod batch;
pub mod campaign;
pub mod config;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod traits;
pub(crate) mod utils;

pub use batch::{BatchOutcome, BatchProcessor};
pub use campaign::Campaign;
pub use config::{BackoffTable, CampaignConfig, RetryPolicy};
pub use error::{ConfigError, CoreError, NetworkError};
pub use generator::{DeduplicationSet, WorkItem, WorkItemGenerator};
pub use metrics::{CampaignOutcome, CampaignReport, RunningTotals};
pub use traits::{FarmProtocol, NoopObserver, Progress, ProgressObserver};

pub use utils::{
    classify, setup_logger, setup_logger_with_file, with_timeout, CampaignRunner,
    ConcurrencyLimiter, ErrorClass, LimiterStats, RateGovernor, RetryExecutor, RetryStats,
    BASE_RETRY_DELAY_MS,
};
