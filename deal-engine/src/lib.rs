pub mod dedup;
pub mod filter;
pub mod orchestrator;
pub mod ranker;
pub mod service;

pub use dedup::{DedupConfig, DedupStore};
pub use filter::{FilterChain, FilterConfig, NicheConfig};
pub use orchestrator::{CycleState, EngineConfig, FetchMode, Orchestrator};
pub use ranker::Ranker;
pub use service::{DealService, ServiceConfig};
