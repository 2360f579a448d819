use crate::utils::limiter::LimiterStats;
use crate::utils::retry::RetryStats;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

/// Totals folded in by the campaign loop after each batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunningTotals {
    pub gained: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub processed: u64,
}

impl RunningTotals {
    pub fn record_batch(&mut self, items: u64, succeeded: u64) {
        self.processed += items;
        self.request_count += items;
        self.gained += succeeded;
        self.error_count += items.saturating_sub(succeeded);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignOutcome {
    /// Target reached
    Exhausted,
    /// Stop token observed
    Stopped,
    /// Baseline fetch failed or lacked an anchor
    InitFailed,
}

/// Terminal snapshot produced exactly once per campaign run.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub timestamp: String,
    pub outcome: CampaignOutcome,
    #[serde(flatten)]
    pub totals: RunningTotals,
    pub keys_consumed: u64,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub limiter: LimiterStats,
    pub retry: RetryStats,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl CampaignReport {
    pub fn new(
        outcome: CampaignOutcome,
        totals: RunningTotals,
        keys_consumed: u64,
        duration: Duration,
        limiter: LimiterStats,
        retry: RetryStats,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            outcome,
            totals,
            keys_consumed,
            duration,
            limiter,
            retry,
        }
    }

    pub fn gained(&self) -> u64 {
        self.totals.gained
    }

    pub fn request_count(&self) -> u64 {
        self.totals.request_count
    }

    pub fn error_count(&self) -> u64 {
        self.totals.error_count
    }

    pub fn processed(&self) -> u64 {
        self.totals.processed
    }

    /// Percentage of processed items that completed both steps.
    pub fn success_rate(&self) -> f64 {
        if self.totals.request_count > 0 {
            self.totals.gained as f64 / self.totals.request_count as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn export_to_file(&self, path: &str) -> std::io::Result<()> {
        tokio::fs::write(path, self.to_json()).await
    }
}
