use dealwatch_core::CandidateStore;
use price_client::PriceSource;
use publisher::Publisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub cycle_interval: Duration,
    /// Cadence for the publish-governor daily reset.
    pub reset_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(15 * 60),
            reset_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Long-running scheduler around the orchestrator: one cycle per interval,
/// never overlapping, plus the daily governor reset. Shutdown lets the
/// in-flight cycle finish before the loop exits.
pub struct DealService<S: PriceSource + 'static, C: CandidateStore, P: Publisher> {
    orchestrator: Arc<Orchestrator<S, C, P>>,
    config: ServiceConfig,
}

impl<S: PriceSource + 'static, C: CandidateStore, P: Publisher> DealService<S, C, P> {
    pub fn new(orchestrator: Arc<Orchestrator<S, C, P>>, config: ServiceConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        // The first cycle fires immediately; the reset waits a full period.
        let mut cycle_timer = interval(self.config.cycle_interval);
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reset_timer = interval_at(
            Instant::now() + self.config.reset_interval,
            self.config.reset_interval,
        );

        info!(
            "service loop started, cycling every {}s",
            self.config.cycle_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = cycle_timer.tick() => {
                    self.orchestrator.run_cycle().await;
                }
                _ = reset_timer.tick() => {
                    self.orchestrator.reset_publish_period();
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, stopping after in-flight work");
                        break;
                    }
                }
            }
        }

        info!("service loop stopped");
    }
}
