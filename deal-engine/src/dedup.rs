use chrono::{DateTime, Duration, Utc};
use dealwatch_core::DedupRecord;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Window during which a re-detected product is dropped before persist.
    pub detect_cooldown: Duration,
    /// Window during which a published product is excluded from publishing.
    pub publish_cooldown: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            detect_cooldown: Duration::hours(12),
            publish_cooldown: Duration::hours(24),
        }
    }
}

/// Per-product cooldown tracking. Records are never deleted; expiry is
/// computed from timestamps on lookup. One lock guards the whole map so a
/// check and the subsequent record run against consistent state.
#[derive(Debug)]
pub struct DedupStore {
    config: DedupConfig,
    records: Mutex<HashMap<String, DedupRecord>>,
}

impl DedupStore {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_in_detect_cooldown(&self, product_id: &str, now: DateTime<Utc>) -> bool {
        let records = self.records.lock().unwrap();
        match records.get(product_id) {
            Some(record) => now - record.last_detected_at < self.config.detect_cooldown,
            None => false,
        }
    }

    pub fn is_in_publish_cooldown(&self, product_id: &str, now: DateTime<Utc>) -> bool {
        let records = self.records.lock().unwrap();
        match records.get(product_id).and_then(|r| r.last_published_at) {
            Some(published_at) => now - published_at < self.config.publish_cooldown,
            None => false,
        }
    }

    pub fn record_detected(&self, product_id: &str, now: DateTime<Utc>) {
        let mut records = self.records.lock().unwrap();
        records
            .entry(product_id.to_string())
            .and_modify(|r| r.last_detected_at = now)
            .or_insert(DedupRecord {
                last_detected_at: now,
                last_published_at: None,
                published_post_id: None,
            });
    }

    pub fn record_published(&self, product_id: &str, now: DateTime<Utc>, post_id: &str) {
        debug!("marking {} published as post {}", product_id, post_id);
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(product_id.to_string())
            .or_insert(DedupRecord {
                last_detected_at: now,
                last_published_at: None,
                published_post_id: None,
            });
        record.last_published_at = Some(now);
        record.published_post_id = Some(post_id.to_string());
    }

    pub fn record(&self, product_id: &str) -> Option<DedupRecord> {
        self.records.lock().unwrap().get(product_id).cloned()
    }

    /// Whether the in-memory map has any record for this product. A miss
    /// means persisted history may still hold a live cooldown.
    pub fn is_known(&self, product_id: &str) -> bool {
        self.records.lock().unwrap().contains_key(product_id)
    }

    /// Backfill a record recovered from persisted history. A record written
    /// by this process wins; hydration never overwrites.
    pub fn hydrate(&self, product_id: &str, record: DedupRecord) {
        let mut records = self.records.lock().unwrap();
        records.entry(product_id.to_string()).or_insert_with(|| {
            debug!("recovered cooldown state for {} from storage", product_id);
            record
        });
    }

    /// How far back persisted history matters: the longer of the two windows.
    pub fn lookback(&self) -> Duration {
        std::cmp::max(self.config.detect_cooldown, self.config.publish_cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DedupStore {
        DedupStore::new(DedupConfig::default())
    }

    #[test]
    fn test_unknown_product_not_in_cooldown() {
        let store = store();
        let now = Utc::now();
        assert!(!store.is_in_detect_cooldown("X1", now));
        assert!(!store.is_in_publish_cooldown("X1", now));
    }

    #[test]
    fn test_detect_cooldown_expires() {
        let store = store();
        let now = Utc::now();

        store.record_detected("X1", now);
        assert!(store.is_in_detect_cooldown("X1", now + Duration::hours(11)));
        assert!(!store.is_in_detect_cooldown("X1", now + Duration::hours(13)));
    }

    #[test]
    fn test_cooldown_windows_independent() {
        let store = store();
        let now = Utc::now();

        store.record_detected("X1", now);
        store.record_published("X1", now, "post-1");

        // Detect window (12h) lapses first; publish window (24h) still holds.
        let later = now + Duration::hours(18);
        assert!(!store.is_in_detect_cooldown("X1", later));
        assert!(store.is_in_publish_cooldown("X1", later));
        assert!(!store.is_in_publish_cooldown("X1", now + Duration::hours(25)));
    }

    #[test]
    fn test_redetection_refreshes_detect_window_only() {
        let store = store();
        let now = Utc::now();

        store.record_published("X1", now, "post-1");
        store.record_detected("X1", now + Duration::hours(15));

        let record = store.record("X1").unwrap();
        assert_eq!(record.last_detected_at, now + Duration::hours(15));
        assert_eq!(record.last_published_at, Some(now));
        assert_eq!(record.published_post_id.as_deref(), Some("post-1"));
    }

    #[test]
    fn test_hydrate_fills_gaps_without_overwriting() {
        let store = store();
        let now = Utc::now();

        assert!(!store.is_known("X1"));
        store.hydrate(
            "X1",
            DedupRecord {
                last_detected_at: now - Duration::hours(2),
                last_published_at: Some(now - Duration::hours(2)),
                published_post_id: None,
            },
        );
        assert!(store.is_known("X1"));
        assert!(store.is_in_detect_cooldown("X1", now));
        assert!(store.is_in_publish_cooldown("X1", now));

        // A live record is never replaced by hydration.
        store.record_detected("X2", now);
        store.hydrate(
            "X2",
            DedupRecord {
                last_detected_at: now - Duration::hours(20),
                last_published_at: None,
                published_post_id: None,
            },
        );
        assert_eq!(store.record("X2").unwrap().last_detected_at, now);
    }

    #[test]
    fn test_publish_without_prior_detection() {
        let store = store();
        let now = Utc::now();

        store.record_published("X1", now, "post-9");
        assert!(store.is_in_publish_cooldown("X1", now + Duration::hours(1)));
    }
}
