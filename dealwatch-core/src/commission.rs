use std::collections::HashMap;

/// Static per-category priority multipliers. Used only for ranking and
/// fan-out ordering, never for pass/fail filtering.
#[derive(Debug, Clone)]
pub struct CommissionTable {
    weights: HashMap<u64, f64>,
    default_weight: f64,
}

impl CommissionTable {
    pub fn new(weights: HashMap<u64, f64>, default_weight: f64) -> Self {
        Self {
            weights,
            default_weight,
        }
    }

    pub fn weight(&self, category_id: u64) -> f64 {
        self.weights
            .get(&category_id)
            .copied()
            .unwrap_or(self.default_weight)
    }

    pub fn with_weight(mut self, category_id: u64, weight: f64) -> Self {
        self.weights.insert(category_id, weight);
        self
    }
}

impl Default for CommissionTable {
    fn default() -> Self {
        // High-converting affiliate categories, weighted by commission rate.
        let weights = HashMap::from([
            (11055981, 10.0),  // Luxury Beauty & Personal Care
            (3375251, 10.0),   // Beauty Tools & Accessories
            (1055398, 4.0),    // Home & Kitchen
            (7141123011, 4.0), // Women's Fashion
            (7147441011, 4.0), // Men's Fashion
            (16310101, 4.0),   // Devices & Accessories
            (2335752011, 4.0), // Fashion Accessories
            (165796011, 3.0),  // Toys & Games
            (468642, 3.0),     // Video Games
            (172282, 3.0),     // Electronics
        ]);
        Self::new(weights, 2.0)
    }
}
