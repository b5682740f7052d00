use dealwatch_core::{Candidate, CommissionTable, ScoredCandidate};
use std::cmp::Ordering;

/// Deterministic publish-priority ordering. Score is commission weight times
/// discount percent; ties fall back to higher discount, then to the earlier
/// detection so first-seen deals win.
#[derive(Debug, Clone)]
pub struct Ranker {
    commissions: CommissionTable,
    batch_size: usize,
}

impl Ranker {
    pub fn new(commissions: CommissionTable, batch_size: usize) -> Self {
        Self {
            commissions,
            batch_size,
        }
    }

    pub fn score(&self, candidate: &Candidate) -> ScoredCandidate {
        let commission_weight = self.commissions.weight(candidate.category_id);
        ScoredCandidate {
            score: commission_weight * candidate.discount_percent,
            commission_weight,
            candidate: candidate.clone(),
        }
    }

    /// Total order over the input, highest priority first. Stable: equal
    /// candidates keep their input order.
    pub fn rank(&self, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates.iter().map(|c| self.score(c)).collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(
                    b.candidate
                        .discount_percent
                        .partial_cmp(&a.candidate.discount_percent)
                        .unwrap_or(Ordering::Equal),
                )
                .then(a.candidate.detected_at.cmp(&b.candidate.detected_at))
        });
        scored
    }

    /// Ranked list truncated to the per-cycle batch size.
    pub fn top(&self, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
        let mut ranked = self.rank(candidates);
        ranked.truncate(self.batch_size);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candidate(product_id: &str, category_id: u64, discount: f64) -> Candidate {
        Candidate {
            product_id: product_id.to_string(),
            title: format!("Product {}", product_id),
            current_price: 50.0 * (1.0 - discount / 100.0),
            reference_price: 50.0,
            discount_percent: discount,
            category_id,
            category_name: String::new(),
            brand: None,
            sales_rank: None,
            rating: None,
            review_count: None,
            prime_eligible: false,
            fulfilled_by_platform: false,
            image_url: None,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_commission_weight_dominates() {
        let ranker = Ranker::new(CommissionTable::default(), 10);

        // Beauty (weight 10) at 20% beats electronics (weight 3) at 50%.
        let beauty = candidate("BEAUTY", 11055981, 20.0);
        let electronics = candidate("ELEC", 172282, 50.0);

        let ranked = ranker.rank(&[electronics, beauty]);
        assert_eq!(ranked[0].candidate.product_id, "BEAUTY");
        assert_eq!(ranked[0].score, 200.0);
        assert_eq!(ranked[1].score, 150.0);
    }

    #[test]
    fn test_tie_broken_by_discount_then_age() {
        let ranker = Ranker::new(CommissionTable::default(), 10);
        let now = Utc::now();

        // Same category and score; a's higher discount wins, then earlier
        // detection breaks the remaining tie.
        let mut a = candidate("A", 468642, 40.0);
        let mut b = candidate("B", 468642, 40.0);
        let mut c = candidate("C", 468642, 40.0);
        a.detected_at = now - Duration::minutes(30);
        b.detected_at = now;
        c.detected_at = now - Duration::minutes(10);

        let ranked = ranker.rank(&[b.clone(), c.clone(), a.clone()]);
        assert_eq!(ranked[0].candidate.product_id, "A");
        assert_eq!(ranked[1].candidate.product_id, "C");
        assert_eq!(ranked[2].candidate.product_id, "B");
    }

    #[test]
    fn test_rank_is_deterministic() {
        let ranker = Ranker::new(CommissionTable::default(), 10);
        let input: Vec<Candidate> = (0..20)
            .map(|i| candidate(&format!("P{}", i), 468642, 25.0))
            .collect();

        let first: Vec<String> = ranker
            .rank(&input)
            .into_iter()
            .map(|s| s.candidate.product_id)
            .collect();
        let second: Vec<String> = ranker
            .rank(&input)
            .into_iter()
            .map(|s| s.candidate.product_id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_truncates_to_batch_size() {
        let ranker = Ranker::new(CommissionTable::default(), 10);
        let input: Vec<Candidate> = (0..12)
            .map(|i| candidate(&format!("P{}", i), 468642, 25.0))
            .collect();

        let top = ranker.top(&input);
        assert_eq!(top.len(), 10);
    }
}
