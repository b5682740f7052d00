use crate::metrics::{MetricsRecorder, RequestSample};
use crate::rate_limiter::{BudgetConfig, BudgetStatus, RateBudget};
use async_trait::async_trait;
use dealwatch_core::UpstreamError;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A price-drop entry as the upstream reports it: raw, unfiltered and
/// unvalidated. All semantic validation happens in the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDeal {
    pub product_id: Option<String>,
    pub title: Option<String>,
    /// Prices arrive in cents.
    pub current_price_cents: Option<i64>,
    /// Pre-drop baseline (30-day average), in cents.
    pub reference_price_cents: Option<i64>,
    /// Upstream's own discount claim. Recomputed locally, never trusted.
    pub discount_percent: Option<f64>,
    pub category_id: Option<u64>,
    pub category_name: Option<String>,
    pub brand: Option<String>,
    pub sales_rank: Option<u32>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub prime_eligible: Option<bool>,
    pub fulfilled_by_platform: Option<bool>,
    pub image_url: Option<String>,
}

/// Detail record for a single product lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProduct {
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub current_price_cents: Option<i64>,
    pub reference_price_cents: Option<i64>,
    pub category_name: Option<String>,
    pub brand: Option<String>,
    pub sales_rank: Option<u32>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub prime_eligible: Option<bool>,
    pub fulfilled_by_platform: Option<bool>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DealListResponse {
    deals: Vec<RawDeal>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuotaResponse {
    tokens_left: i64,
}

/// Filter parameters for a price-drop listing call.
#[derive(Debug, Clone)]
pub struct DealQuery {
    pub min_discount_percent: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub category_id: Option<u64>,
    pub max_sales_rank: Option<u32>,
    pub min_rating: Option<f64>,
    pub page: u32,
}

impl DealQuery {
    /// Same query scoped to a single category.
    pub fn for_category(&self, category_id: u64) -> Self {
        Self {
            category_id: Some(category_id),
            ..self.clone()
        }
    }

    /// Fallback variant with minimal restrictions, used when the primary
    /// query comes back empty.
    pub fn relaxed(&self, fallback_min_discount: f64) -> Self {
        Self {
            min_discount_percent: fallback_min_discount,
            max_sales_rank: None,
            min_rating: None,
            ..self.clone()
        }
    }
}

/// Capability interface over the price-history service.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn list_price_drops(&self, query: &DealQuery) -> Result<Vec<RawDeal>, UpstreamError>;

    /// `Ok(None)` on genuine absence of the product.
    async fn get_product(&self, product_id: &str) -> Result<Option<RawProduct>, UpstreamError>;

    async fn remaining_quota(&self) -> Result<i64, UpstreamError>;
}

/// HTTP client for the price-data source. Every request passes through the
/// shared call budget before it reaches the wire.
#[derive(Debug)]
pub struct PriceApiClient {
    http_client: Client,
    budget: Arc<RateBudget>,
    metrics: Arc<MetricsRecorder>,
    base_url: String,
    api_key: String,
}

impl PriceApiClient {
    pub fn new(base_url: String, api_key: String, budget_config: BudgetConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            budget: Arc::new(RateBudget::new(budget_config)),
            metrics: Arc::new(MetricsRecorder::new()),
            base_url,
            api_key,
        }
    }

    pub fn with_shared_budget(mut self, budget: Arc<RateBudget>) -> Self {
        self.budget = budget;
        self
    }

    async fn make_request(
        &self,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, UpstreamError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let start_time = Instant::now();

        let budget_wait = self.budget.acquire().await;
        if budget_wait > Duration::from_millis(500) {
            debug!("held {:?} by the call budget before {}", budget_wait, endpoint);
        }

        debug!("price API request: GET {}", endpoint);
        let result = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(query_params)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!("network error for {}: {}", endpoint, e);
                self.record(endpoint, None, start_time.elapsed(), budget_wait, false);
                if e.is_timeout() {
                    return Err(UpstreamError::RequestTimeout);
                }
                return Err(UpstreamError::Transport {
                    details: e.to_string(),
                });
            }
        };

        let status = response.status();
        self.record(
            endpoint,
            Some(status.as_u16()),
            start_time.elapsed(),
            budget_wait,
            status.is_success(),
        );

        if status.is_success() {
            return Ok(response);
        }

        error!("request failed with status {} for {}", status, endpoint);
        match status {
            StatusCode::UNAUTHORIZED => Err(UpstreamError::AuthenticationFailed {
                reason: "API key rejected".to_string(),
            }),
            StatusCode::FORBIDDEN => Err(UpstreamError::Forbidden {
                resource: endpoint.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(UpstreamError::EndpointUnavailable {
                endpoint: endpoint.to_string(),
            }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                warn!("upstream quota exhausted, retry after {}s", retry_after);
                Err(UpstreamError::QuotaExhausted { retry_after })
            }
            s if s.is_server_error() => Err(UpstreamError::ServerError {
                status_code: s.as_u16(),
            }),
            s => Err(UpstreamError::InvalidResponse {
                details: format!("unexpected status {} for {}", s, endpoint),
            }),
        }
    }

    fn record(
        &self,
        endpoint: &str,
        status_code: Option<u16>,
        elapsed: Duration,
        budget_wait: Duration,
        success: bool,
    ) {
        self.metrics.record(RequestSample {
            endpoint: endpoint.to_string(),
            status_code,
            response_time: elapsed,
            budget_wait,
            success,
        });
    }

    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn budget(&self) -> Arc<RateBudget> {
        self.budget.clone()
    }

    pub async fn budget_status(&self) -> BudgetStatus {
        self.budget.status().await
    }
}

#[async_trait]
impl PriceSource for PriceApiClient {
    async fn list_price_drops(&self, query: &DealQuery) -> Result<Vec<RawDeal>, UpstreamError> {
        let mut params = vec![
            (
                "min_discount",
                format!("{}", query.min_discount_percent as i64),
            ),
            ("min_price_cents", format!("{}", (query.min_price * 100.0) as i64)),
            ("max_price_cents", format!("{}", (query.max_price * 100.0) as i64)),
            ("sort", "discount".to_string()),
            ("page", query.page.to_string()),
        ];
        if let Some(category_id) = query.category_id {
            params.push(("category", category_id.to_string()));
        }
        if let Some(max_rank) = query.max_sales_rank {
            params.push(("max_sales_rank", max_rank.to_string()));
        }
        if let Some(min_rating) = query.min_rating {
            // Upstream takes tenths of a star.
            params.push(("min_rating", format!("{}", (min_rating * 10.0) as i64)));
        }

        let response = self.make_request("/v1/deals", &params).await?;
        let listing: DealListResponse = response.json().await.map_err(|e| {
            error!("failed to parse deal listing: {}", e);
            UpstreamError::InvalidResponse {
                details: "failed to parse deal listing".to_string(),
            }
        })?;

        info!("retrieved {} raw price drops", listing.deals.len());
        Ok(listing.deals)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<RawProduct>, UpstreamError> {
        let endpoint = format!("/v1/products/{}", product_id);
        let response = match self.make_request(&endpoint, &[]).await {
            Ok(response) => response,
            Err(UpstreamError::EndpointUnavailable { .. }) => {
                debug!("no product found for {}", product_id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let product: RawProduct = response.json().await.map_err(|e| {
            error!("failed to parse product {}: {}", product_id, e);
            UpstreamError::InvalidResponse {
                details: format!("failed to parse product {}", product_id),
            }
        })?;

        Ok(Some(product))
    }

    async fn remaining_quota(&self) -> Result<i64, UpstreamError> {
        let response = self.make_request("/v1/quota", &[]).await?;
        let quota: QuotaResponse =
            response
                .json()
                .await
                .map_err(|_| UpstreamError::InvalidResponse {
                    details: "failed to parse quota response".to_string(),
                })?;
        Ok(quota.tokens_left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = PriceApiClient::new(
            "https://prices.test".to_string(),
            "test-key".to_string(),
            BudgetConfig::default(),
        );

        let status = client.budget_status().await;
        assert_eq!(status.calls_this_window, 0);
        assert_eq!(status.effective_cap, 1190);
    }

    #[test]
    fn test_query_for_category() {
        let query = DealQuery {
            min_discount_percent: 15.0,
            min_price: 15.0,
            max_price: 300.0,
            category_id: None,
            max_sales_rank: Some(100_000),
            min_rating: Some(3.5),
            page: 0,
        };

        let scoped = query.for_category(172282);
        assert_eq!(scoped.category_id, Some(172282));
        assert_eq!(scoped.min_discount_percent, 15.0);
    }

    #[test]
    fn test_relaxed_query_drops_optional_filters() {
        let query = DealQuery {
            min_discount_percent: 15.0,
            min_price: 15.0,
            max_price: 300.0,
            category_id: Some(172282),
            max_sales_rank: Some(100_000),
            min_rating: Some(3.5),
            page: 0,
        };

        let relaxed = query.relaxed(10.0);
        assert_eq!(relaxed.min_discount_percent, 10.0);
        assert!(relaxed.max_sales_rank.is_none());
        assert!(relaxed.min_rating.is_none());
        // Category scope and price band stay.
        assert_eq!(relaxed.category_id, Some(172282));
        assert_eq!(relaxed.max_price, 300.0);
    }

    #[test]
    fn test_raw_deal_deserializes_with_missing_fields() {
        let raw: RawDeal =
            serde_json::from_str(r#"{"product_id":"B00X","current_price_cents":1999}"#)
                .expect("partial payloads must deserialize");
        assert_eq!(raw.product_id.as_deref(), Some("B00X"));
        assert!(raw.title.is_none());
        assert!(raw.rating.is_none());
    }
}
