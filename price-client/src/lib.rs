pub mod adapter;
pub mod api;
pub mod fanout;
pub mod metrics;
pub mod rate_limiter;

pub use adapter::{candidate_from_raw, merge_product};
pub use api::{DealQuery, PriceApiClient, PriceSource, RawDeal, RawProduct};
pub use fanout::{CategoryFanOut, FanOutConfig, FanOutOutcome};
pub use metrics::{ClientMetrics, EndpointStats, MetricsRecorder, RequestSample};
pub use rate_limiter::{BudgetConfig, BudgetStatus, RateBudget};
