use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::providers::{CardCatalogProvider, FileCardCatalog};
use crate::util::env as env_util;

use super::harvest::{api_client, API_BASE_ENV, API_KEY_ENV};

#[derive(Debug, Clone, Args)]
pub struct CardsArgs {
    /// Where to write the catalog snapshot
    #[arg(long, default_value = "cards.json")]
    pub out: PathBuf,
}

/// Snapshot the live card catalog so later runs can pin it with `--cards-file`.
pub async fn run(args: CardsArgs) -> Result<usize> {
    env_util::preflight_check("cards", &[API_KEY_ENV], &[API_BASE_ENV])?;
    let client = api_client(30)?;
    let cards = client.fetch_cards().await.context("fetching card catalog")?;
    FileCardCatalog::save(&args.out, &cards).await?;
    let evolutions = cards.iter().filter(|c| c.has_evolution).count();
    info!(path = %args.out.display(), cards = cards.len(), evolutions, "card catalog written");
    Ok(cards.len())
}
