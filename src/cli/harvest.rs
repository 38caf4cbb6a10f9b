use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use tracing::info;

use crate::error::HarvestError;
use crate::ingest::{
    read_identifiers, CheckpointStore, ConcurrentFetchEngine, EngineConfig, FlushPolicy,
    ResultSet, RetryPolicy, RunSummary,
};
use crate::normalization::{CardIndex, DeckEncoding};
use crate::providers::{CardCatalogProvider, FileCardCatalog, RoyaleApiClient};
use crate::util::env as env_util;

pub const API_KEY_ENV: &str = "CR_API_KEY";
pub const API_BASE_ENV: &str = "CR_API_BASE";
const CONCURRENCY_ENV: &str = "HARVEST_CONCURRENCY";
const FLUSH_COUNT_ENV: &str = "HARVEST_FLUSH_COUNT";
const FLUSH_SECS_ENV: &str = "HARVEST_FLUSH_SECS";
const TIMEOUT_ENV: &str = "HARVEST_REQUEST_TIMEOUT_SECS";
const RETRIES_ENV: &str = "HARVEST_MAX_RETRIES";
const BACKOFF_ENV: &str = "HARVEST_BACKOFF_MS";
const BACKOFF_MAX_ENV: &str = "HARVEST_BACKOFF_MAX_MS";
const RESUME_ENV: &str = "HARVEST_RESUME";

#[derive(Debug, Clone, Args)]
pub struct HarvestArgs {
    /// Newline-delimited file of player identifiers
    #[arg(long, default_value = "player_tags.txt")]
    pub identifiers: PathBuf,
    /// Checkpoint file, rewritten on every flush
    #[arg(long, default_value = "battle_summary.json")]
    pub checkpoint: PathBuf,
    /// Card catalog snapshot (JSON); fetched from the API when omitted
    #[arg(long)]
    pub cards_file: Option<PathBuf>,
    /// Worker count [env: HARVEST_CONCURRENCY, default 20]
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Flush after this many completed identifiers [env: HARVEST_FLUSH_COUNT, default 100]
    #[arg(long)]
    pub flush_count: Option<usize>,
    /// Flush after this many seconds [env: HARVEST_FLUSH_SECS, default 60]
    #[arg(long)]
    pub flush_secs: Option<u64>,
    /// Per-attempt provider timeout [env: HARVEST_REQUEST_TIMEOUT_SECS, default 20]
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
    /// Retries per identifier before it counts as failed [env: HARVEST_MAX_RETRIES, default 3]
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Start from an empty result set and overwrite the checkpoint
    #[arg(long = "fresh", action = ArgAction::SetTrue)]
    pub fresh: bool,
    /// Emit card names instead of integer indices
    #[arg(long = "human-readable", action = ArgAction::SetTrue)]
    pub human_readable: bool,
}

/// Fully resolved settings for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub engine: EngineConfig,
    pub resume: bool,
}

impl HarvestSettings {
    pub fn resolve(args: &HarvestArgs) -> Result<Self, HarvestError> {
        let concurrency = env_util::resolve(args.concurrency, CONCURRENCY_ENV, 20usize);
        if concurrency == 0 {
            return Err(HarvestError::config("concurrency must be at least 1"));
        }
        let flush_count = env_util::resolve(args.flush_count, FLUSH_COUNT_ENV, 100usize);
        if flush_count == 0 {
            return Err(HarvestError::config("flush count must be at least 1"));
        }
        let flush_secs = env_util::resolve(args.flush_secs, FLUSH_SECS_ENV, 60u64);
        let timeout_secs = env_util::resolve(args.request_timeout_secs, TIMEOUT_ENV, 20u64);
        if timeout_secs == 0 {
            return Err(HarvestError::config("request timeout must be at least 1 second"));
        }
        let retry = RetryPolicy {
            max_retries: env_util::resolve(args.max_retries, RETRIES_ENV, 3u32),
            base_delay: Duration::from_millis(env_util::env_parse(BACKOFF_ENV, 500u64)),
            max_delay: Duration::from_millis(env_util::env_parse(BACKOFF_MAX_ENV, 30_000u64)),
        };
        let resume = !args.fresh && env_util::env_flag(RESUME_ENV, true);

        Ok(Self {
            engine: EngineConfig {
                concurrency,
                flush_policy: FlushPolicy::new(flush_count, Duration::from_secs(flush_secs)),
                request_timeout: Duration::from_secs(timeout_secs),
                retry,
                encoding: if args.human_readable {
                    DeckEncoding::HumanReadable
                } else {
                    DeckEncoding::Indexed
                },
            },
            resume,
        })
    }
}

pub fn api_client(timeout_secs: u64) -> Result<RoyaleApiClient> {
    let key = env_util::env_req(API_KEY_ENV)?;
    let base = env_util::env_opt(API_BASE_ENV);
    Ok(RoyaleApiClient::new(key, base.as_deref(), Some(timeout_secs))?)
}

/// Card index for this run: the saved mapping (when resuming) extended with
/// the current catalog, persisted next to the checkpoint.
///
/// Without `resume` the old checkpoint is emptied before the new mapping is
/// written, so integer decks on disk never outlive the mapping they refer to.
pub async fn prepare_card_index(
    catalog: &dyn CardCatalogProvider,
    store: &CheckpointStore,
    resume: bool,
) -> Result<CardIndex> {
    let cards = catalog
        .fetch_cards()
        .await
        .context("loading card catalog")?;
    let saved = if resume {
        store.load_card_names().await.unwrap_or_default()
    } else {
        Vec::new()
    };
    let index = CardIndex::reconcile(&saved, &cards)?;
    if !resume {
        store
            .persist(&ResultSet::new())
            .await
            .context("clearing checkpoint for a fresh run")?;
    }
    info!(
        cards = index.len(),
        saved = saved.len(),
        added = index.len() - saved.len().min(index.len()),
        "card index ready"
    );
    store
        .persist_card_index(&index)
        .await
        .context("writing card index")?;
    Ok(index)
}

pub async fn run(args: HarvestArgs) -> Result<RunSummary> {
    env_util::preflight_check(
        "harvest",
        &[API_KEY_ENV],
        &[
            API_BASE_ENV,
            CONCURRENCY_ENV,
            FLUSH_COUNT_ENV,
            FLUSH_SECS_ENV,
            TIMEOUT_ENV,
            RETRIES_ENV,
            BACKOFF_ENV,
            BACKOFF_MAX_ENV,
            RESUME_ENV,
        ],
    )?;
    let settings = HarvestSettings::resolve(&args)?;
    let client = Arc::new(api_client(settings.engine.request_timeout.as_secs() + 5)?);
    let store = CheckpointStore::new(&args.checkpoint);

    let index = match &args.cards_file {
        Some(path) => {
            prepare_card_index(&FileCardCatalog::new(path), &store, settings.resume).await?
        }
        None => prepare_card_index(client.as_ref(), &store, settings.resume).await?,
    };

    let identifiers = read_identifiers(&args.identifiers).await?;
    let loaded = if settings.resume {
        store.load().await
    } else {
        ResultSet::new()
    };

    let engine = ConcurrentFetchEngine::new(client, Arc::new(index), settings.engine)?;
    let out = engine.run(&identifiers, &store, loaded).await?;
    Ok(out.summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::CardDescriptor;

    fn args() -> HarvestArgs {
        HarvestArgs {
            identifiers: "ids.txt".into(),
            checkpoint: "cp.json".into(),
            cards_file: None,
            concurrency: Some(4),
            flush_count: Some(10),
            flush_secs: Some(5),
            request_timeout_secs: Some(2),
            max_retries: Some(1),
            fresh: false,
            human_readable: true,
        }
    }

    #[test]
    fn cli_values_resolve_into_engine_config() {
        let s = HarvestSettings::resolve(&args()).unwrap();
        assert_eq!(s.engine.concurrency, 4);
        assert_eq!(s.engine.flush_policy.count_threshold(), 10);
        assert_eq!(s.engine.flush_policy.time_threshold(), Duration::from_secs(5));
        assert_eq!(s.engine.request_timeout, Duration::from_secs(2));
        assert_eq!(s.engine.retry.max_retries, 1);
        assert_eq!(s.engine.encoding, DeckEncoding::HumanReadable);

        let mut fresh = args();
        fresh.fresh = true;
        assert!(!HarvestSettings::resolve(&fresh).unwrap().resume);
    }

    #[test]
    fn zero_values_are_configuration_errors() {
        let mut a = args();
        a.concurrency = Some(0);
        assert!(matches!(
            HarvestSettings::resolve(&a),
            Err(HarvestError::Configuration(_))
        ));
        let mut a = args();
        a.request_timeout_secs = Some(0);
        assert!(matches!(
            HarvestSettings::resolve(&a),
            Err(HarvestError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn card_index_extends_saved_mapping_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("battles.json"));
        store
            .persist_card_index(&CardIndex::from_names(["Knight", "Archers"]))
            .await
            .unwrap();

        let catalog_path = dir.path().join("cards.json");
        let cards: Vec<CardDescriptor> = ["Mortar", "Archers", "Knight"]
            .iter()
            .map(|n| CardDescriptor {
                name: n.to_string(),
                icon_url: String::new(),
                has_evolution: false,
                evolution_icon_url: None,
            })
            .collect();
        FileCardCatalog::save(&catalog_path, &cards).await.unwrap();
        let catalog = FileCardCatalog::new(&catalog_path);

        let resumed = prepare_card_index(&catalog, &store, true).await.unwrap();
        assert_eq!(resumed.names(), vec!["Knight", "Archers", "Mortar"]);
        assert_eq!(store.load_card_names().await, Some(resumed.names()));

        let fresh = prepare_card_index(&catalog, &store, false).await.unwrap();
        assert_eq!(fresh.names(), vec!["Mortar", "Archers", "Knight"]);
    }

    #[tokio::test]
    async fn fresh_card_index_never_sits_next_to_old_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("battles.json"));
        let mut old = ResultSet::new();
        old.insert("P1".into(), vec![]);
        store.persist(&old).await.unwrap();
        store
            .persist_card_index(&CardIndex::from_names(["Knight", "Archers"]))
            .await
            .unwrap();

        let catalog_path = dir.path().join("cards.json");
        let cards: Vec<CardDescriptor> = ["Archers", "Knight"]
            .iter()
            .map(|n| CardDescriptor {
                name: n.to_string(),
                icon_url: String::new(),
                has_evolution: false,
                evolution_icon_url: None,
            })
            .collect();
        FileCardCatalog::save(&catalog_path, &cards).await.unwrap();

        let index = prepare_card_index(&FileCardCatalog::new(&catalog_path), &store, false)
            .await
            .unwrap();

        assert_eq!(index.names(), vec!["Archers", "Knight"]);
        assert_eq!(store.load_card_names().await, Some(index.names()));
        // the run may stop before its first flush; resume must not see old entries
        assert!(store.try_load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_catalog_aborts_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("battles.json"));
        let catalog_path = dir.path().join("cards.json");
        FileCardCatalog::save(&catalog_path, &[]).await.unwrap();

        let err = prepare_card_index(&FileCardCatalog::new(&catalog_path), &store, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarvestError>(),
            Some(HarvestError::Configuration(_))
        ));
        assert!(!store.card_index_path().exists());
    }
}
