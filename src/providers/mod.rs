//! Collaborators the ingestion engine talks to.
//!
//! The engine only depends on the traits below; `royale_api` and
//! `catalog_file` are the adapters the binary wires in.

pub mod catalog_file;
pub mod royale_api;

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::normalization::{CardDescriptor, RawBattle};

pub use catalog_file::FileCardCatalog;
pub use royale_api::RoyaleApiClient;

/// Source of per-identifier match histories.
#[async_trait]
pub trait BattleHistoryProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Battles for one identifier, in the order the provider returns them.
    async fn fetch_battles(&self, identifier: &str) -> std::result::Result<Vec<RawBattle>, ProviderError>;
}

/// Source of the ordered card catalog snapshot.
#[async_trait]
pub trait CardCatalogProvider: Send + Sync {
    async fn fetch_cards(&self) -> Result<Vec<CardDescriptor>>;
}
