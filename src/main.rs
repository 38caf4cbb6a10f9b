use anyhow::Result;
use battle_harvest::cli::{cards, clan_tags, harvest};
use battle_harvest::util::env as env_util;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "battle-harvest",
    version,
    about = "Resumable bulk ingestion of player battle logs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, normalize and checkpoint battle logs for every identifier
    Harvest(harvest::HarvestArgs),
    /// Build an identifier file from clan rosters
    ClanTags(clan_tags::ClanTagsArgs),
    /// Snapshot the card catalog to JSON
    Cards(cards::CardsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    battle_harvest::tracing::init_tracing("info,battle_harvest=info")?;
    let cli = Cli::parse();

    match cli.command {
        Command::Harvest(args) => {
            let summary = harvest::run(args).await?;
            info!(summary = ?summary, "harvest finished");
            println!(
                "harvest complete: succeeded={} failed={} skipped={} records_written={} (new={}, rejected={}, unknown_cards={}, flushes={})",
                summary.succeeded,
                summary.failed,
                summary.skipped,
                summary.records_total,
                summary.records_fetched,
                summary.rejected_battles,
                summary.unknown_card_drops,
                summary.flushes,
            );
        }
        Command::ClanTags(args) => {
            let n = clan_tags::run(args).await?;
            println!("wrote {n} identifiers");
        }
        Command::Cards(args) => {
            let n = cards::run(args).await?;
            println!("wrote {n} cards");
        }
    }
    Ok(())
}
