use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use indexmap::IndexSet;
use tracing::{info, warn};

use crate::ingest::write_identifiers;
use crate::util::env as env_util;

use super::harvest::{api_client, API_BASE_ENV, API_KEY_ENV};

#[derive(Debug, Clone, Args)]
pub struct ClanTagsArgs {
    /// Clan tags to expand (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub clans: Vec<String>,
    /// Output identifier file
    #[arg(long, default_value = "player_tags.txt")]
    pub out: PathBuf,
}

/// Write the member tags of every listed clan, one per line. A clan that
/// cannot be fetched is skipped.
pub async fn run(args: ClanTagsArgs) -> Result<usize> {
    env_util::preflight_check("clan-tags", &[API_KEY_ENV], &[API_BASE_ENV])?;
    let client = api_client(30)?;

    let mut tags: IndexSet<String> = IndexSet::new();
    for clan in &args.clans {
        match client.clan_member_tags(clan).await {
            Ok(members) => {
                info!(clan = %clan, members = members.len(), "clan roster fetched");
                tags.extend(members);
            }
            Err(err) => warn!(clan = %clan, error = %err, "skipping clan"),
        }
    }

    let tags: Vec<String> = tags.into_iter().collect();
    write_identifiers(&args.out, &tags).await?;
    info!(path = %args.out.display(), identifiers = tags.len(), "identifier file written");
    Ok(tags.len())
}
