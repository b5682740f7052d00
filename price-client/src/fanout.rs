use dealwatch_core::{Candidate, CommissionTable};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapter::{candidate_from_raw, merge_product};
use crate::api::{DealQuery, PriceSource};

#[derive(Debug, Clone)]
pub struct FanOutConfig {
    /// Concurrent category workers.
    pub max_workers: usize,
    /// Only the highest-earning categories are queried each cycle.
    pub top_categories: usize,
    /// Base pause between detail lookups within one worker.
    pub inter_request_pause: Duration,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            top_categories: 5,
            inter_request_pause: Duration::from_millis(100),
        }
    }
}

/// What one fan-out pass produced, including the failure tally. Per-category
/// failures never sink the pass; the healthy categories' results still count.
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    pub candidates: Vec<Candidate>,
    pub categories_checked: usize,
    pub categories_failed: usize,
    pub fetched: usize,
    pub invalid: usize,
}

/// Concurrent per-category fetch across the configured category set, ordered
/// by commission weight so the best-earning categories are always covered
/// before the token budget tightens.
pub struct CategoryFanOut<S: PriceSource> {
    source: Arc<S>,
    commissions: CommissionTable,
    config: FanOutConfig,
}

impl<S: PriceSource + 'static> CategoryFanOut<S> {
    pub fn new(source: Arc<S>, commissions: CommissionTable, config: FanOutConfig) -> Self {
        Self {
            source,
            commissions,
            config,
        }
    }

    /// Pick the top categories by commission weight, highest first.
    fn select_categories(&self, categories: &[u64]) -> Vec<u64> {
        let mut ranked: Vec<u64> = categories.to_vec();
        ranked.sort_by(|a, b| {
            self.commissions
                .weight(*b)
                .partial_cmp(&self.commissions.weight(*a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.config.top_categories);
        ranked
    }

    pub async fn fetch(&self, base_query: &DealQuery, categories: &[u64]) -> FanOutOutcome {
        let selected = self.select_categories(categories);
        info!(
            "fanning out across {} categories with {} workers",
            selected.len(),
            self.config.max_workers
        );

        let results: Vec<Result<CategoryResult, u64>> = stream::iter(selected.clone())
            .map(|category_id| {
                let query = base_query.for_category(category_id);
                let source = self.source.clone();
                let pause = self.config.inter_request_pause;
                async move {
                    fetch_category(source.as_ref(), category_id, &query, pause)
                        .await
                        .map_err(|_| category_id)
                }
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .collect()
            .await;

        let mut outcome = FanOutOutcome {
            categories_checked: selected.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(category_result) => {
                    outcome.fetched += category_result.fetched;
                    outcome.invalid += category_result.invalid;
                    outcome.candidates.extend(category_result.candidates);
                }
                Err(category_id) => {
                    warn!("category {} failed this pass, skipping", category_id);
                    outcome.categories_failed += 1;
                }
            }
        }

        info!(
            "fan-out done: {} candidates from {} categories ({} failed)",
            outcome.candidates.len(),
            outcome.categories_checked,
            outcome.categories_failed
        );
        outcome
    }
}

#[derive(Debug, Default)]
struct CategoryResult {
    candidates: Vec<Candidate>,
    fetched: usize,
    invalid: usize,
}

/// One worker's pass over a single category. Detail lookups are only issued
/// for candidates missing rating or review data, spaced with a jittered
/// pause to avoid bursts within the shared call budget.
async fn fetch_category<S: PriceSource>(
    source: &S,
    category_id: u64,
    query: &DealQuery,
    pause: Duration,
) -> Result<CategoryResult, dealwatch_core::UpstreamError> {
    let raw_deals = source.list_price_drops(query).await?;
    debug!("category {}: {} raw entries", category_id, raw_deals.len());

    let mut result = CategoryResult {
        fetched: raw_deals.len(),
        ..Default::default()
    };
    for raw in &raw_deals {
        let mut candidate = match candidate_from_raw(raw) {
            Ok(candidate) => candidate,
            Err(e) => {
                debug!("dropping malformed entry in category {}: {}", category_id, e);
                result.invalid += 1;
                continue;
            }
        };

        if candidate.rating.is_none() || candidate.review_count.is_none() {
            if !pause.is_zero() {
                let jitter = fastrand::u64(0..=pause.as_millis() as u64 / 2);
                tokio::time::sleep(pause + Duration::from_millis(jitter)).await;
            }
            match source.get_product(&candidate.product_id).await {
                Ok(Some(detail)) => merge_product(&mut candidate, &detail),
                Ok(None) => {}
                Err(e) => {
                    debug!(
                        "detail lookup failed for {}, keeping listing data: {}",
                        candidate.product_id, e
                    );
                }
            }
        }

        result.candidates.push(candidate);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{RawDeal, RawProduct};
    use async_trait::async_trait;
    use dealwatch_core::UpstreamError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedSource {
        deals_by_category: HashMap<u64, Vec<RawDeal>>,
        failing_categories: Vec<u64>,
        queried: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                deals_by_category: HashMap::new(),
                failing_categories: Vec::new(),
                queried: Mutex::new(Vec::new()),
            }
        }

        fn with_deal(mut self, category_id: u64, product_id: &str) -> Self {
            self.deals_by_category
                .entry(category_id)
                .or_default()
                .push(RawDeal {
                    product_id: Some(product_id.to_string()),
                    title: Some(format!("Product {}", product_id)),
                    current_price_cents: Some(2999),
                    reference_price_cents: Some(4999),
                    category_id: Some(category_id),
                    rating: Some(4.2),
                    review_count: Some(120),
                    ..Default::default()
                });
            self
        }

        fn failing(mut self, category_id: u64) -> Self {
            self.failing_categories.push(category_id);
            self
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn list_price_drops(
            &self,
            query: &DealQuery,
        ) -> Result<Vec<RawDeal>, UpstreamError> {
            let category_id = query.category_id.unwrap_or(0);
            self.queried.lock().unwrap().push(category_id);
            if self.failing_categories.contains(&category_id) {
                return Err(UpstreamError::ServerError { status_code: 503 });
            }
            Ok(self
                .deals_by_category
                .get(&category_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_product(&self, _: &str) -> Result<Option<RawProduct>, UpstreamError> {
            Ok(None)
        }

        async fn remaining_quota(&self) -> Result<i64, UpstreamError> {
            Ok(1000)
        }
    }

    fn base_query() -> DealQuery {
        DealQuery {
            min_discount_percent: 15.0,
            min_price: 15.0,
            max_price: 300.0,
            category_id: None,
            max_sales_rank: None,
            min_rating: None,
            page: 0,
        }
    }

    #[tokio::test]
    async fn test_top_categories_selected_by_commission() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_deal(11055981, "B0BEAUTY01")
                .with_deal(172282, "B0ELEC0001"),
        );
        let fanout = CategoryFanOut::new(
            source.clone(),
            CommissionTable::default(),
            FanOutConfig {
                top_categories: 2,
                inter_request_pause: Duration::ZERO,
                ..Default::default()
            },
        );

        // 11055981 (10.0) and 3375251 (10.0) outrank 172282 (3.0).
        let outcome = fanout
            .fetch(&base_query(), &[172282, 11055981, 3375251])
            .await;

        let queried = source.queried.lock().unwrap().clone();
        assert_eq!(outcome.categories_checked, 2);
        assert!(queried.contains(&11055981));
        assert!(queried.contains(&3375251));
        assert!(!queried.contains(&172282));
    }

    #[tokio::test]
    async fn test_partial_category_failure_keeps_other_results() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_deal(11055981, "B0BEAUTY01")
                .failing(3375251),
        );
        let fanout = CategoryFanOut::new(
            source,
            CommissionTable::default(),
            FanOutConfig {
                top_categories: 2,
                inter_request_pause: Duration::ZERO,
                ..Default::default()
            },
        );

        let outcome = fanout.fetch(&base_query(), &[11055981, 3375251]).await;

        assert_eq!(outcome.categories_checked, 2);
        assert_eq!(outcome.categories_failed, 1);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].product_id, "B0BEAUTY01");
    }
}
