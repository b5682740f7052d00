use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Rolling window the call budget is accounted against.
const BUDGET_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Upstream plan allowance per 60-second window.
    pub tokens_per_minute: u32,
    /// Stop issuing calls once within this many tokens of the allowance.
    pub token_buffer: u32,
    /// Hard minimum spacing between any two consecutive calls.
    pub min_request_interval: Duration,
}

impl BudgetConfig {
    /// Settings for the 1200 tokens/minute plan.
    pub fn high_volume() -> Self {
        Self {
            tokens_per_minute: 1200,
            token_buffer: 10,
            min_request_interval: Duration::from_millis(50),
        }
    }

    fn effective_cap(&self) -> u32 {
        self.tokens_per_minute.saturating_sub(self.token_buffer)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self::high_volume()
    }
}

/// Shared call accounting. One ledger serves every worker; the decide-and-
/// record step runs as a single unit under the lock, and any required wait
/// happens inside it so spacing holds globally, not per worker.
#[derive(Debug)]
struct RateLedger {
    window_start: Instant,
    calls_this_window: u32,
    last_call_at: Option<Instant>,
}

#[derive(Debug)]
pub struct RateBudget {
    config: BudgetConfig,
    ledger: Mutex<RateLedger>,
}

impl RateBudget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(RateLedger {
                window_start: Instant::now(),
                calls_this_window: 0,
                last_call_at: None,
            }),
        }
    }

    /// Block until a call may be issued, then record it. Returns how long the
    /// caller was held up. Never fails; budget pressure only ever waits.
    pub async fn acquire(&self) -> Duration {
        let acquire_started = Instant::now();
        let mut ledger = self.ledger.lock().await;

        loop {
            let now = Instant::now();
            if now.duration_since(ledger.window_start) >= BUDGET_WINDOW {
                ledger.window_start = now;
                ledger.calls_this_window = 0;
            }

            if ledger.calls_this_window >= self.config.effective_cap() {
                let until_rollover =
                    BUDGET_WINDOW.saturating_sub(now.duration_since(ledger.window_start));
                tracing::debug!(
                    "call budget exhausted, sleeping {:?} until window rollover",
                    until_rollover
                );
                sleep(until_rollover).await;
                continue;
            }

            if let Some(last_call) = ledger.last_call_at {
                let since_last = now.duration_since(last_call);
                if since_last < self.config.min_request_interval {
                    sleep(self.config.min_request_interval - since_last).await;
                }
            }

            ledger.last_call_at = Some(Instant::now());
            ledger.calls_this_window += 1;
            break;
        }

        acquire_started.elapsed()
    }

    pub async fn status(&self) -> BudgetStatus {
        let mut ledger = self.ledger.lock().await;

        let now = Instant::now();
        if now.duration_since(ledger.window_start) >= BUDGET_WINDOW {
            ledger.window_start = now;
            ledger.calls_this_window = 0;
        }

        let cap = self.config.effective_cap();
        BudgetStatus {
            calls_this_window: ledger.calls_this_window,
            effective_cap: cap,
            remaining_in_window: cap.saturating_sub(ledger.calls_this_window),
            window_resets_in: BUDGET_WINDOW
                .saturating_sub(now.duration_since(ledger.window_start)),
            min_request_interval: self.config.min_request_interval,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub calls_this_window: u32,
    pub effective_cap: u32,
    pub remaining_in_window: u32,
    pub window_resets_in: Duration,
    pub min_request_interval: Duration,
}

impl BudgetStatus {
    pub fn utilization_percentage(&self) -> f64 {
        if self.effective_cap == 0 {
            return 100.0;
        }
        (self.calls_this_window as f64 / self.effective_cap as f64) * 100.0
    }

    pub fn is_near_limit(&self) -> bool {
        self.utilization_percentage() > 80.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn small_budget(tokens: u32, buffer: u32, spacing: Duration) -> RateBudget {
        RateBudget::new(BudgetConfig {
            tokens_per_minute: tokens,
            token_buffer: buffer,
            min_request_interval: spacing,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_cap_does_not_wait() {
        let budget = small_budget(10, 2, Duration::ZERO);

        for _ in 0..8 {
            budget.acquire().await;
        }

        let status = budget.status().await;
        assert_eq!(status.calls_this_window, 8);
        assert_eq!(status.remaining_in_window, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_until_window_rollover() {
        let budget = small_budget(5, 2, Duration::ZERO);

        for _ in 0..3 {
            budget.acquire().await;
        }

        // The cap minus buffer is reached; the next call must ride out the
        // rest of the 60-second window.
        let started = Instant::now();
        let waited = budget.acquire().await;
        assert!(started.elapsed() >= Duration::from_secs(59));
        assert!(waited >= Duration::from_secs(59));

        let status = budget.status().await;
        assert_eq!(status.calls_this_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_spacing_between_calls() {
        let budget = small_budget(1000, 10, Duration::from_millis(200));

        budget.acquire().await;
        let started = Instant::now();
        budget.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_shared_across_workers() {
        let budget = Arc::new(small_budget(5, 0, Duration::ZERO));
        let started = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move {
                budget.acquire().await;
            }));
        }
        for handle in handles {
            handle.await.expect("worker should not panic");
        }

        // Six calls against a shared cap of five: at least one worker had to
        // wait for the next window.
        assert!(started.elapsed() >= Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_rollover() {
        let budget = small_budget(100, 10, Duration::ZERO);
        budget.acquire().await;

        sleep(Duration::from_secs(61)).await;

        let status = budget.status().await;
        assert_eq!(status.calls_this_window, 0);
        assert_eq!(status.remaining_in_window, 90);
    }
}
