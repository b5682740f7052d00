use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::types::{Candidate, CycleStats, StoredDeal};

/// Narrow persistence interface consumed by the pipeline. The store is
/// assumed durable and queryable by product id + timestamp; cooldown policy
/// lives entirely outside of it.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Persist a detected candidate, returning its row id.
    async fn save_candidate(&self, candidate: &Candidate) -> Result<i64, DatabaseError>;

    /// Mark the most recent detection of this product as published.
    async fn mark_published(
        &self,
        product_id: &str,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Most recent stored detection of this product at or after `since`.
    async fn find_recent(
        &self,
        product_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<StoredDeal>, DatabaseError>;

    /// Append one cycle's statistics record.
    async fn record_metrics(&self, stats: &CycleStats) -> Result<(), DatabaseError>;
}
