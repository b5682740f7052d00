use dealwatch_core::Candidate;
use tracing::debug;

/// Title substrings that disqualify a candidate outright, matched
/// case-insensitively.
const RESTRICTED_KEYWORDS: &[&str] = &[
    "adult", "sexual", "intimate", "lingerie", "erotic", "tobacco", "alcohol", "weapon", "drug",
];

const NICHE_CATEGORIES: &[&str] = &[
    "beauty",
    "cosmetics",
    "makeup",
    "skincare",
    "skin care",
    "hair care",
    "haircare",
    "nail",
    "fragrance",
    "perfume",
    "personal care",
    "luxury beauty",
    "premium beauty",
];

const NICHE_KEYWORDS: &[&str] = &[
    "lipstick",
    "foundation",
    "concealer",
    "mascara",
    "eyeshadow",
    "blush",
    "bronzer",
    "primer",
    "setting spray",
    "powder",
    "eyeliner",
    "brow",
    "eyebrow",
    "highlighter",
    "contour",
    "serum",
    "moisturizer",
    "cleanser",
    "toner",
    "cream",
    "lotion",
    "mask",
    "exfoliant",
    "sunscreen",
    "shampoo",
    "conditioner",
    "hair mask",
    "styling",
    "nail polish",
    "nail care",
    "cuticle",
    "manicure",
    "cologne",
    "body spray",
    "body mist",
    "makeup brush",
    "beauty sponge",
    "applicator",
];

const NICHE_BRANDS: &[&str] = &[
    "maybelline",
    "loreal",
    "revlon",
    "covergirl",
    "neutrogena",
    "olay",
    "clinique",
    "estee lauder",
    "mac",
    "sephora",
    "ulta",
    "nyx",
    "urban decay",
    "too faced",
    "benefit",
    "fenty beauty",
    "rare beauty",
    "glossier",
    "drunk elephant",
    "the ordinary",
    "cerave",
    "la roche posay",
    "vichy",
];

/// General quality gate, applied before anything is persisted.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_discount_percent: f64,
    pub min_price_drop: f64,
    pub min_product_price: f64,
    pub max_product_price: f64,
    pub min_rating: f64,
    pub min_review_count: u32,
    /// When set, candidates with a known rank above this are rejected.
    pub max_sales_rank: Option<u32>,
    pub require_prime: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_discount_percent: 15.0,
            min_price_drop: 5.0,
            min_product_price: 15.0,
            max_product_price: 300.0,
            min_rating: 3.5,
            min_review_count: 25,
            max_sales_rank: None,
            require_prime: false,
        }
    }
}

/// Stricter numeric gate for niche candidates that already cleared
/// classification.
#[derive(Debug, Clone)]
pub struct NicheConfig {
    pub min_discount_percent: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub min_rating: f64,
    pub min_review_count: u32,
    /// Anything cheaper is assumed to be a sample or travel size.
    pub price_floor: f64,
}

impl Default for NicheConfig {
    fn default() -> Self {
        Self {
            min_discount_percent: 20.0,
            min_price: 20.0,
            max_price: 200.0,
            min_rating: 4.0,
            min_review_count: 50,
            price_floor: 15.0,
        }
    }
}

/// Two-tier quality gate. The persist tier decides what is worth recording
/// at all; the publish tier decides what may go out, optionally scoped to
/// the configured content niche.
///
/// Missing optional fields (rating, review count, rank) are permissive:
/// absence never rejects on its own.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    config: FilterConfig,
    niche: NicheConfig,
}

impl FilterChain {
    pub fn new(config: FilterConfig, niche: NicheConfig) -> Self {
        Self { config, niche }
    }

    pub fn passes_persist_tier(&self, candidate: &Candidate) -> bool {
        if candidate.discount_percent < self.config.min_discount_percent {
            return false;
        }

        if candidate.current_price < self.config.min_product_price
            || candidate.current_price > self.config.max_product_price
        {
            return false;
        }

        if candidate.savings() < self.config.min_price_drop {
            return false;
        }

        if candidate.title.trim().chars().count() < 10 {
            return false;
        }

        let title_lower = candidate.title.to_lowercase();
        if RESTRICTED_KEYWORDS.iter().any(|kw| title_lower.contains(kw)) {
            debug!("restricted keyword in title for {}", candidate.product_id);
            return false;
        }

        if let Some(rating) = candidate.rating {
            if rating < self.config.min_rating {
                return false;
            }
        }
        if let Some(reviews) = candidate.review_count {
            if reviews < self.config.min_review_count {
                return false;
            }
        }

        if let (Some(max_rank), Some(rank)) = (self.config.max_sales_rank, candidate.sales_rank) {
            if rank > max_rank {
                return false;
            }
        }

        if self.config.require_prime && !candidate.prime_eligible {
            return false;
        }

        true
    }

    /// Classify a candidate into the niche by category, title keyword or
    /// brand. Any one signal suffices.
    pub fn is_niche_product(&self, candidate: &Candidate) -> bool {
        let category = candidate.category_name.to_lowercase();
        if NICHE_CATEGORIES.iter().any(|c| category.contains(c)) {
            return true;
        }

        let title = candidate.title.to_lowercase();
        if NICHE_KEYWORDS.iter().any(|kw| title.contains(kw)) {
            return true;
        }

        if let Some(brand) = &candidate.brand {
            let brand = brand.to_lowercase();
            if NICHE_BRANDS.iter().any(|b| brand.contains(b)) {
                return true;
            }
        }

        false
    }

    /// Only meaningful for candidates that already passed the persist tier
    /// and are out of publish-cooldown.
    pub fn passes_publish_tier(&self, candidate: &Candidate, niche_mode: bool) -> bool {
        if !niche_mode {
            return true;
        }

        if !self.is_niche_product(candidate) {
            debug!("{} is outside the niche, not publishing", candidate.product_id);
            return false;
        }

        if candidate.discount_percent < self.niche.min_discount_percent {
            return false;
        }

        if candidate.current_price < self.niche.min_price
            || candidate.current_price > self.niche.max_price
        {
            return false;
        }

        if let Some(rating) = candidate.rating {
            if rating < self.niche.min_rating {
                return false;
            }
        }
        if let Some(reviews) = candidate.review_count {
            if reviews < self.niche.min_review_count {
                return false;
            }
        }

        if candidate.current_price < self.niche.price_floor {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate() -> Candidate {
        Candidate {
            product_id: "X1".to_string(),
            title: "Hydrating Face Serum Deluxe".to_string(),
            current_price: 29.25,
            reference_price: 39.00,
            discount_percent: Candidate::discount_from(29.25, 39.00),
            category_id: 11055981,
            category_name: "Beauty".to_string(),
            brand: None,
            sales_rank: None,
            rating: Some(4.3),
            review_count: Some(2847),
            prime_eligible: true,
            fulfilled_by_platform: true,
            image_url: None,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_persist_tier_accepts_quality_deal() {
        let chain = FilterChain::default();
        assert!(chain.passes_persist_tier(&candidate()));
    }

    #[test]
    fn test_persist_tier_rejects_small_discount() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.current_price = 36.00;
        c.discount_percent = Candidate::discount_from(36.00, 39.00);
        assert!(!chain.passes_persist_tier(&c));
    }

    #[test]
    fn test_persist_tier_rejects_small_savings() {
        let chain = FilterChain::new(
            FilterConfig {
                min_discount_percent: 10.0,
                ..Default::default()
            },
            NicheConfig::default(),
        );
        // 12.5% off but only $3 saved.
        let mut c = candidate();
        c.current_price = 21.00;
        c.reference_price = 24.00;
        c.discount_percent = Candidate::discount_from(21.00, 24.00);
        assert!(!chain.passes_persist_tier(&c));
    }

    #[test]
    fn test_persist_tier_rejects_short_title() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.title = "  Serum  ".to_string();
        assert!(!chain.passes_persist_tier(&c));
    }

    #[test]
    fn test_persist_tier_rejects_restricted_keyword() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.title = "Intimate Massage Oil Gift Set".to_string();
        assert!(!chain.passes_persist_tier(&c));
    }

    #[test]
    fn test_persist_tier_permissive_on_missing_rating() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.rating = None;
        c.review_count = None;
        assert!(chain.passes_persist_tier(&c));
    }

    #[test]
    fn test_persist_tier_rejects_present_low_rating() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.rating = Some(2.9);
        assert!(!chain.passes_persist_tier(&c));
    }

    #[test]
    fn test_niche_classification_by_each_signal() {
        let chain = FilterChain::default();

        let by_category = candidate();
        assert!(chain.is_niche_product(&by_category));

        let mut by_keyword = candidate();
        by_keyword.category_name = "Health".to_string();
        assert!(chain.is_niche_product(&by_keyword)); // "serum" in title

        let mut by_brand = candidate();
        by_brand.category_name = "Health".to_string();
        by_brand.title = "Daily Facial SPF 30 Stick".to_string();
        by_brand.brand = Some("CeraVe".to_string());
        assert!(chain.is_niche_product(&by_brand));

        let mut none = candidate();
        none.category_name = "Electronics".to_string();
        none.title = "Wireless Earbuds with Charging Case".to_string();
        none.brand = Some("Soundcore".to_string());
        assert!(!chain.is_niche_product(&none));
    }

    #[test]
    fn test_publish_tier_passes_reference_scenario() {
        let chain = FilterChain::default();
        let c = candidate();
        assert!(chain.passes_persist_tier(&c));
        assert!(chain.passes_publish_tier(&c, true));
    }

    #[test]
    fn test_publish_tier_rejects_sample_size_price() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.current_price = 8.00;
        c.discount_percent = Candidate::discount_from(8.00, 39.00);
        assert!(!chain.passes_publish_tier(&c, true));
    }

    #[test]
    fn test_publish_tier_permissive_on_missing_fields() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.rating = None;
        c.review_count = None;
        assert!(chain.passes_publish_tier(&c, true));
    }

    #[test]
    fn test_publish_tier_open_when_niche_mode_off() {
        let chain = FilterChain::default();
        let mut c = candidate();
        c.category_name = "Electronics".to_string();
        c.title = "Wireless Earbuds with Charging Case".to_string();
        assert!(chain.passes_publish_tier(&c, false));
        assert!(!chain.passes_publish_tier(&c, true));
    }
}
