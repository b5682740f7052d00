use chrono::Utc;
use dealwatch_core::{Candidate, ValidationError};
use tracing::debug;

use crate::api::{RawDeal, RawProduct};

/// Convert cents as reported upstream into dollars.
fn dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Validate and normalize a raw listing entry into a pipeline candidate.
///
/// Product id, title and current price are required; everything else is
/// optional and passed through as-is. The discount is recomputed from the
/// two prices, never taken from the upstream payload.
pub fn candidate_from_raw(raw: &RawDeal) -> Result<Candidate, ValidationError> {
    let product_id = raw
        .product_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or(ValidationError::MissingProductId)?
        .to_string();

    let title = raw
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ValidationError::MissingTitle {
            product_id: product_id.clone(),
        })?
        .to_string();

    let current_price = raw
        .current_price_cents
        .filter(|c| *c > 0)
        .map(dollars)
        .ok_or_else(|| ValidationError::MissingPrice {
            product_id: product_id.clone(),
        })?;

    let reference_price = raw
        .reference_price_cents
        .filter(|c| *c > 0)
        .map(dollars)
        .unwrap_or(current_price);

    let discount_percent = Candidate::discount_from(current_price, reference_price);
    if let Some(claimed) = raw.discount_percent {
        if (claimed - discount_percent).abs() > 1.0 {
            debug!(
                "upstream claimed {:.1}% off {}, computed {:.1}%",
                claimed, product_id, discount_percent
            );
        }
    }

    Ok(Candidate {
        product_id,
        title,
        current_price,
        reference_price,
        discount_percent,
        category_id: raw.category_id.unwrap_or(0),
        category_name: raw.category_name.clone().unwrap_or_default(),
        brand: raw.brand.clone(),
        sales_rank: raw.sales_rank,
        rating: raw.rating,
        review_count: raw.review_count,
        prime_eligible: raw.prime_eligible.unwrap_or(false),
        fulfilled_by_platform: raw.fulfilled_by_platform.unwrap_or(false),
        image_url: raw.image_url.clone(),
        detected_at: Utc::now(),
    })
}

/// Fill gaps in a candidate from a product detail lookup. Listing data wins
/// where both sides carry a value; the detail record only supplies what the
/// listing left empty.
pub fn merge_product(candidate: &mut Candidate, product: &RawProduct) {
    if candidate.brand.is_none() {
        candidate.brand = product.brand.clone();
    }
    if candidate.sales_rank.is_none() {
        candidate.sales_rank = product.sales_rank;
    }
    if candidate.rating.is_none() {
        candidate.rating = product.rating;
    }
    if candidate.review_count.is_none() {
        candidate.review_count = product.review_count;
    }
    if candidate.image_url.is_none() {
        candidate.image_url = product.image_url.clone();
    }
    if candidate.category_name.is_empty() {
        if let Some(name) = &product.category_name {
            candidate.category_name = name.clone();
        }
    }
    if let Some(prime) = product.prime_eligible {
        candidate.prime_eligible = candidate.prime_eligible || prime;
    }
    if let Some(fba) = product.fulfilled_by_platform {
        candidate.fulfilled_by_platform = candidate.fulfilled_by_platform || fba;
    }
}
