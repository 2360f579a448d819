use crate::generator::WorkItem;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// The two-step remote protocol a campaign drives.
///
/// Transport, authentication and payload shape are the implementor's
/// concern; the orchestrator only sees success or an error to classify.
#[async_trait]
pub trait FarmProtocol: Send + Sync + 'static {
    type Baseline: Send + 'static;
    type Handle: Send + Sync + 'static;
    type Ack: Send + 'static;

    /// Fetch the state work items are derived from
    async fn fetch_baseline(&self) -> Result<Self::Baseline>;

    /// Extract the anchor date; `None` means the baseline is unusable.
    fn anchor(&self, baseline: &Self::Baseline) -> Option<NaiveDate>;

    /// Step A: create the remote resource for an item
    async fn acquire(&self, item: &WorkItem) -> Result<Self::Handle>;

    /// Step B: complete the resource for the item's target date
    async fn finalize(&self, handle: &Self::Handle, item: &WorkItem) -> Result<Self::Ack>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: u64,
    pub target: u64,
    pub gained: u64,
}

/// Receives progress after every completed batch.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _progress: &Progress) {}
}
