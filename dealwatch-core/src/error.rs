use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Price API error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Publisher error: {0}")]
    Publish(#[from] PublishError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures reaching or understanding the price-data source. Retried at the
/// next scheduled cycle only, never mid-cycle.
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("API quota exhausted. Retry after {retry_after} seconds")]
    QuotaExhausted { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("API endpoint unavailable: {endpoint}")]
    EndpointUnavailable { endpoint: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Transport failure: {details}")]
    Transport { details: String },
}

/// Failures from the social-posting target. Counted and logged; the publish
/// loop continues with the next candidate.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Posting quota exceeded. Retry after {retry_after} seconds")]
    QuotaExceeded { retry_after: u64 },

    #[error("Post rejected: {reason}")]
    Rejected { reason: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Transport failure: {details}")]
    Transport { details: String },
}

/// A raw candidate missing mandatory fields. The candidate is dropped and
/// counted as filtered, never propagated further.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Raw candidate is missing a product identifier")]
    MissingProductId,

    #[error("Candidate {product_id} has an empty title")]
    MissingTitle { product_id: String },

    #[error("Candidate {product_id} has no usable current price")]
    MissingPrice { product_id: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Whether the store should be treated as unreachable, as opposed to a
    /// single statement failing.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            DatabaseError::ConnectionFailed { .. } => true,
            DatabaseError::Sql(sqlx::Error::PoolTimedOut) => true,
            DatabaseError::Sql(sqlx::Error::PoolClosed) => true,
            DatabaseError::Sql(sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}
