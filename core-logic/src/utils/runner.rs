use crate::campaign::Campaign;
use crate::metrics::CampaignReport;
use crate::traits::FarmProtocol;
use tokio::signal;
use tracing::{error, info, Instrument};

pub struct CampaignRunner;

impl CampaignRunner {
    /// Run a campaign with Ctrl+C wired to its stop token, then log the
    /// summary line.
    pub async fn run_until_ctrl_c<P: FarmProtocol>(
        campaign: &mut Campaign<P>,
    ) -> CampaignReport {
        let cloned_token = campaign.stop_token();

        let listener = tokio::spawn(async move {
            tokio::select! {
                res = signal::ctrl_c() => match res {
                    Ok(()) => {
                        info!(
                            target: "campaign",
                            "🛑 Received Ctrl+C. Finishing current batch..."
                        );
                        cloned_token.cancel();
                    }
                    Err(err) => {
                        error!("Unable to listen for shutdown signal: {}", err);
                    }
                },
                _ = cloned_token.cancelled() => {}
            }
        });

        let span = tracing::info_span!("campaign", target_items = campaign.config().target);
        let report = campaign.run().instrument(span).await;

        // Release the listener if the campaign finished on its own.
        listener.abort();

        Self::log_summary(&report);
        report
    }

    pub fn log_summary(report: &CampaignReport) {
        info!(
            target: "campaign",
            "Total Time: {:.1}s | Gained: {} | Failed: {} | Success Rate: {:.2}% | Outcome: {:?}",
            report.duration.as_secs_f64(),
            report.gained(),
            report.error_count(),
            report.success_rate(),
            report.outcome
        );
        info!(
            target: "campaign",
            "Limiter: submitted {} | succeeded {} | failed {}",
            report.limiter.submitted,
            report.limiter.succeeded,
            report.limiter.failed
        );
    }
}
