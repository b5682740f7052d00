pub mod commission;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use commission::CommissionTable;
pub use config::AppConfig;
pub use error::{
    ConfigError, CoreError, DatabaseError, PublishError, UpstreamError, ValidationError,
};
pub use store::CandidateStore;
pub use types::{Candidate, CycleStats, DedupRecord, ScoredCandidate, StoredDeal};
