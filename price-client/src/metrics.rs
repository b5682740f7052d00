use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// What one request looked like from the client's side: how long the call
/// budget held it before dispatch, and how the wire leg went.
#[derive(Debug, Clone)]
pub struct RequestSample {
    pub endpoint: String,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    /// Time spent parked in `RateBudget::acquire` before the request left.
    pub budget_wait: Duration,
    pub success: bool,
}

/// Per-endpoint tallies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointStats {
    pub requests: u64,
    pub failures: u64,
    pub total_response_time: Duration,
    pub slowest_response: Duration,
}

impl EndpointStats {
    fn absorb(&mut self, sample: &RequestSample) {
        self.requests += 1;
        if !sample.success {
            self.failures += 1;
        }
        self.total_response_time += sample.response_time;
        if sample.response_time > self.slowest_response {
            self.slowest_response = sample.response_time;
        }
    }

    pub fn mean_response_time(&self) -> Duration {
        if self.requests == 0 {
            Duration::ZERO
        } else {
            self.total_response_time / self.requests as u32
        }
    }
}

/// Aggregate view of the client's traffic since the last reset. The
/// budget-wait figures are the interesting part operationally: they show
/// how hard the token budget is braking the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub requests: u64,
    pub failures: u64,
    /// Requests the budget held for a noticeable time before dispatch.
    pub throttled_requests: u64,
    pub total_budget_wait: Duration,
    pub longest_budget_wait: Duration,
    pub by_endpoint: HashMap<String, EndpointStats>,
}

impl ClientMetrics {
    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }

    /// Mean time spent waiting on the budget, over all requests.
    pub fn mean_budget_wait(&self) -> Duration {
        if self.requests == 0 {
            Duration::ZERO
        } else {
            self.total_budget_wait / self.requests as u32
        }
    }
}

/// A budget wait below this counts as free flow, not throttling.
const THROTTLE_FLOOR: Duration = Duration::from_millis(50);

/// Traffic recorder shared by all callers of one `PriceApiClient`.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<ClientMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sample: RequestSample) {
        let mut metrics = self.inner.lock().unwrap();

        metrics.requests += 1;
        if !sample.success {
            metrics.failures += 1;
        }

        metrics.total_budget_wait += sample.budget_wait;
        if sample.budget_wait > metrics.longest_budget_wait {
            metrics.longest_budget_wait = sample.budget_wait;
        }
        if sample.budget_wait >= THROTTLE_FLOOR {
            metrics.throttled_requests += 1;
        }

        metrics
            .by_endpoint
            .entry(sample.endpoint.clone())
            .or_default()
            .absorb(&sample);
    }

    pub fn snapshot(&self) -> ClientMetrics {
        self.inner.lock().unwrap().clone()
    }

    pub fn endpoint_stats(&self, endpoint: &str) -> Option<EndpointStats> {
        self.inner.lock().unwrap().by_endpoint.get(endpoint).cloned()
    }

    pub fn reset(&self) {
        *self.inner.lock().unwrap() = ClientMetrics::default();
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}
