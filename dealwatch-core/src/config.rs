use std::env;

use crate::error::ConfigError;

/// Application configuration, read from the environment with defaults
/// matching the production posture.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Upstream price-data source
    pub price_api_base_url: String,
    pub price_api_key: String,
    pub tokens_per_minute: u32,
    pub token_buffer: u32,
    pub min_request_interval_ms: u64,

    // Posting target
    pub publishing_enabled: bool,
    pub publisher_base_url: String,
    pub publisher_token: String,
    pub max_posts_per_hour: u32,
    pub min_post_interval_secs: u64,

    // Persistence
    pub database_url: String,

    // General quality gate (persist tier)
    pub min_discount_percent: f64,
    pub min_price_drop: f64,
    pub min_product_price: f64,
    pub max_product_price: f64,
    pub min_review_count: u32,
    pub min_rating: f64,
    pub max_sales_rank: Option<u32>,
    pub require_prime: bool,

    // Niche publish gate
    pub niche_only_publish: bool,
    pub niche_min_discount: f64,
    pub niche_min_price: f64,
    pub niche_max_price: f64,
    pub niche_price_floor: f64,

    // Dedup cooldowns
    pub detect_cooldown_hours: i64,
    pub publish_cooldown_hours: i64,

    // Cycle behavior
    pub batch_size: usize,
    pub fanout_workers: usize,
    pub fanout_top_categories: usize,
    pub inter_request_pause_ms: u64,
    pub cycle_interval_minutes: u64,
    pub fallback_min_discount: f64,
    pub target_categories: Vec<u64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            price_api_base_url: env_or("PRICE_API_BASE_URL", ""),
            price_api_key: env_or("PRICE_API_KEY", ""),
            tokens_per_minute: parse_env("PRICE_API_TOKENS_PER_MINUTE", 1200)?,
            token_buffer: parse_env("PRICE_API_TOKEN_BUFFER", 10)?,
            min_request_interval_ms: parse_env("PRICE_API_MIN_INTERVAL_MS", 50)?,

            publishing_enabled: parse_env("PUBLISHING_ENABLED", true)?,
            publisher_base_url: env_or("PUBLISHER_BASE_URL", ""),
            publisher_token: env_or("PUBLISHER_TOKEN", ""),
            max_posts_per_hour: parse_env("MAX_POSTS_PER_HOUR", 10)?,
            min_post_interval_secs: parse_env("MIN_POST_INTERVAL_SECS", 300)?,

            database_url: env_or("DATABASE_URL", "sqlite://deals.db"),

            min_discount_percent: parse_env("MIN_DISCOUNT_PERCENT", 15.0)?,
            min_price_drop: parse_env("MIN_PRICE_DROP", 5.0)?,
            min_product_price: parse_env("MIN_PRODUCT_PRICE", 15.0)?,
            max_product_price: parse_env("MAX_PRODUCT_PRICE", 300.0)?,
            min_review_count: parse_env("MIN_REVIEW_COUNT", 25)?,
            min_rating: parse_env("MIN_REVIEW_RATING", 3.5)?,
            max_sales_rank: parse_env_opt("MAX_SALES_RANK")?,
            require_prime: parse_env("REQUIRE_PRIME", false)?,

            niche_only_publish: parse_env("NICHE_ONLY_PUBLISH", true)?,
            niche_min_discount: parse_env("NICHE_MIN_DISCOUNT", 20.0)?,
            niche_min_price: parse_env("NICHE_MIN_PRICE", 20.0)?,
            niche_max_price: parse_env("NICHE_MAX_PRICE", 200.0)?,
            niche_price_floor: parse_env("NICHE_PRICE_FLOOR", 15.0)?,

            detect_cooldown_hours: parse_env("DETECT_COOLDOWN_HOURS", 12)?,
            publish_cooldown_hours: parse_env("PUBLISH_COOLDOWN_HOURS", 24)?,

            batch_size: parse_env("DEAL_BATCH_SIZE", 50)?,
            fanout_workers: parse_env("FANOUT_WORKERS", 3)?,
            fanout_top_categories: parse_env("FANOUT_TOP_CATEGORIES", 5)?,
            inter_request_pause_ms: parse_env("INTER_REQUEST_PAUSE_MS", 100)?,
            cycle_interval_minutes: parse_env("CYCLE_INTERVAL_MINUTES", 15)?,
            fallback_min_discount: parse_env("FALLBACK_MIN_DISCOUNT", 10.0)?,
            target_categories: parse_category_list(env_or(
                "TARGET_CATEGORIES",
                "11055981,1055398,7141123011,7147441011,16310101,165796011,172282,468642,2335752011,3375251",
            ))?,
        })
    }

    /// Check that everything a running deployment needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.price_api_base_url.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "PRICE_API_BASE_URL".to_string(),
            });
        }
        if self.price_api_key.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "PRICE_API_KEY".to_string(),
            });
        }
        if self.publishing_enabled {
            if self.publisher_base_url.is_empty() {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: "PUBLISHER_BASE_URL".to_string(),
                });
            }
            if self.publisher_token.is_empty() {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: "PUBLISHER_TOKEN".to_string(),
                });
            }
        }
        if self.min_product_price > self.max_product_price {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "MIN_PRODUCT_PRICE {} exceeds MAX_PRODUCT_PRICE {}",
                    self.min_product_price, self.max_product_price
                ),
            });
        }
        if self.token_buffer >= self.tokens_per_minute {
            return Err(ConfigError::ValidationFailed {
                reason: "token buffer must be smaller than the per-minute budget".to_string(),
            });
        }
        Ok(())
    }

    /// Fan-out only pays off on high-volume token plans.
    pub fn use_fanout(&self) -> bool {
        self.tokens_per_minute >= 1000
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_opt<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_category_list(raw: String) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidValue {
                field: "TARGET_CATEGORIES".to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            price_api_base_url: "https://prices.test".to_string(),
            price_api_key: "key".to_string(),
            tokens_per_minute: 1200,
            token_buffer: 10,
            min_request_interval_ms: 50,
            publishing_enabled: true,
            publisher_base_url: "https://posts.test".to_string(),
            publisher_token: "token".to_string(),
            max_posts_per_hour: 10,
            min_post_interval_secs: 300,
            database_url: "sqlite::memory:".to_string(),
            min_discount_percent: 15.0,
            min_price_drop: 5.0,
            min_product_price: 15.0,
            max_product_price: 300.0,
            min_review_count: 25,
            min_rating: 3.5,
            max_sales_rank: None,
            require_prime: false,
            niche_only_publish: true,
            niche_min_discount: 20.0,
            niche_min_price: 20.0,
            niche_max_price: 200.0,
            niche_price_floor: 15.0,
            detect_cooldown_hours: 12,
            publish_cooldown_hours: 24,
            batch_size: 50,
            fanout_workers: 3,
            fanout_top_categories: 5,
            inter_request_pause_ms: 100,
            cycle_interval_minutes: 15,
            fallback_min_discount: 10.0,
            target_categories: vec![11055981, 172282],
        }
    }

    #[test]
    fn test_validate_requires_api_key() {
        let mut config = base_config();
        config.price_api_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_publisher_optional_when_disabled() {
        let mut config = base_config();
        config.publishing_enabled = false;
        config.publisher_token = String::new();
        config.publisher_base_url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_price_band() {
        let mut config = base_config();
        config.min_product_price = 500.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fanout_selection_by_token_plan() {
        let mut config = base_config();
        assert!(config.use_fanout());
        config.tokens_per_minute = 100;
        assert!(!config.use_fanout());
    }

    #[test]
    fn test_parse_category_list() {
        let parsed = parse_category_list("1, 2,3".to_string()).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
        assert!(parse_category_list("1,abc".to_string()).is_err());
    }
}
