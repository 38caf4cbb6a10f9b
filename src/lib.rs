pub mod cli;
pub mod error;
pub mod ingest;
pub mod normalization;
pub mod providers;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use error::{HarvestError, ProviderError, UnknownCardError};
pub use ingest::{CheckpointStore, ConcurrentFetchEngine, EngineConfig, ResultSet, RunSummary};
pub use normalization::{normalize, BattleRecord, CardIndex, Normalized, RawBattle};
pub use providers::{BattleHistoryProvider, CardCatalogProvider};
