pub mod checkpoint;
pub mod engine;
pub mod flush;
pub mod identifiers;
pub mod retry;

pub use checkpoint::{CheckpointStore, ResultSet};
pub use engine::{ConcurrentFetchEngine, EngineConfig, FetchOutcome, RunOutput, RunSummary};
pub use flush::FlushPolicy;
pub use identifiers::{parse_identifiers, read_identifiers, write_identifiers};
pub use retry::{with_retry, RetryPolicy};
