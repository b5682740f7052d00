use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected price-drop event for one product, before any filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Opaque catalog identifier (e.g. a SKU).
    pub product_id: String,
    pub title: String,
    pub current_price: f64,
    /// Pre-drop baseline, typically a 30-day average.
    pub reference_price: f64,
    /// Always recomputed from current/reference prices, never taken verbatim
    /// from upstream when both prices are present.
    pub discount_percent: f64,
    pub category_id: u64,
    pub category_name: String,
    pub brand: Option<String>,
    /// Popularity rank, lower is more popular. `None` means unknown.
    pub sales_rank: Option<u32>,
    /// Average customer rating on a 0-5 scale, if known.
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub prime_eligible: bool,
    pub fulfilled_by_platform: bool,
    pub image_url: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl Candidate {
    /// Discount percentage derived from the two prices, clamped to >= 0.
    /// A missing or non-positive reference price yields 0.
    pub fn discount_from(current: f64, reference: f64) -> f64 {
        if reference > 0.0 {
            (((reference - current) / reference) * 100.0).max(0.0)
        } else {
            0.0
        }
    }

    /// Absolute savings in currency units.
    pub fn savings(&self) -> f64 {
        (self.reference_price - self.current_price).max(0.0)
    }
}

/// A candidate plus the priority score used for publish ordering.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// commission weight x discount percent
    pub score: f64,
    pub commission_weight: f64,
}

/// Cooldown bookkeeping for one product identifier.
#[derive(Debug, Clone)]
pub struct DedupRecord {
    pub last_detected_at: DateTime<Utc>,
    pub last_published_at: Option<DateTime<Utc>>,
    pub published_post_id: Option<String>,
}

/// Row shape returned by the persistence store for dedup lookups.
#[derive(Debug, Clone)]
pub struct StoredDeal {
    pub id: i64,
    pub product_id: String,
    pub title: String,
    pub detected_at: DateTime<Utc>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// Per-cycle statistics, emitted regardless of how the cycle ended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    pub categories_checked: u32,
    pub categories_failed: u32,
    pub fetched: u32,
    pub persisted: u32,
    pub filtered_out: u32,
    pub published: u32,
    pub errors: u32,
    pub elapsed_ms: u64,
    /// False when the cycle ended in the failed state.
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_computation() {
        let discount = Candidate::discount_from(29.25, 39.00);
        assert!((discount - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_discount_zero_reference() {
        assert_eq!(Candidate::discount_from(10.0, 0.0), 0.0);
        assert_eq!(Candidate::discount_from(10.0, -5.0), 0.0);
    }

    #[test]
    fn test_discount_clamped_on_price_rise() {
        // Current above reference is not a deal, never a negative discount.
        assert_eq!(Candidate::discount_from(50.0, 40.0), 0.0);
    }
}
