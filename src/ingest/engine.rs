//! Concurrent fetch / normalize / checkpoint loop.
//!
//! Workers run as tokio tasks bounded by a semaphore and only ever send owned
//! [`FetchOutcome`]s over an mpsc channel. The collector (the `run` future
//! itself) is the single owner of the [`ResultSet`]; it inserts completions as
//! they arrive and persists through the [`CheckpointStore`] whenever the
//! [`FlushPolicy`] says so, plus once unconditionally when the pool drains.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{HarvestError, ProviderError, Result};
use crate::ingest::checkpoint::{CheckpointStore, ResultSet};
use crate::ingest::flush::FlushPolicy;
use crate::ingest::retry::{with_retry, RetryPolicy};
use crate::normalization::{
    normalize, BattleRecord, CardIndex, CardRef, DeckEncoding, Normalized, RawBattle,
};
use crate::providers::BattleHistoryProvider;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub concurrency: usize,
    pub flush_policy: FlushPolicy,
    /// Upper bound on a single provider attempt.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub encoding: DeckEncoding,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            flush_policy: FlushPolicy::default(),
            request_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            encoding: DeckEncoding::Indexed,
        }
    }
}

/// Result of one identifier's task.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched {
        identifier: String,
        records: Vec<BattleRecord>,
        rejected: usize,
        unknown_cards: usize,
    },
    Failed {
        identifier: String,
        error: ProviderError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub requested: usize,
    /// Already present in the loaded checkpoint.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records_fetched: usize,
    /// Records in the checkpoint after the final flush.
    pub records_total: usize,
    pub rejected_battles: usize,
    pub unknown_card_drops: usize,
    pub flushes: usize,
}

impl RunSummary {
    fn new(requested: usize) -> Self {
        Self {
            started_at: Utc::now(),
            requested,
            skipped: 0,
            succeeded: 0,
            failed: 0,
            records_fetched: 0,
            records_total: 0,
            rejected_battles: 0,
            unknown_card_drops: 0,
            flushes: 0,
        }
    }
}

#[derive(Debug)]
pub struct RunOutput {
    pub results: ResultSet,
    pub summary: RunSummary,
}

pub struct ConcurrentFetchEngine {
    provider: Arc<dyn BattleHistoryProvider>,
    index: Arc<CardIndex>,
    config: EngineConfig,
}

fn count_records(results: &ResultSet) -> usize {
    results.values().map(Vec::len).sum()
}

impl ConcurrentFetchEngine {
    pub fn new(
        provider: Arc<dyn BattleHistoryProvider>,
        index: Arc<CardIndex>,
        config: EngineConfig,
    ) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(HarvestError::config("concurrency must be at least 1"));
        }
        if config.request_timeout.is_zero() {
            return Err(HarvestError::config("request timeout must be non-zero"));
        }
        Ok(Self {
            provider,
            index,
            config,
        })
    }

    /// Fetch every identifier not already in `loaded`, persisting through
    /// `checkpoint` as results accumulate.
    ///
    /// Per-identifier failures are counted, never returned. Errors are a
    /// `loaded` set written in another deck encoding, or a failed final flush.
    pub async fn run(
        &self,
        identifiers: &[String],
        checkpoint: &CheckpointStore,
        loaded: ResultSet,
    ) -> Result<RunOutput> {
        ensure_encoding(&loaded, self.config.encoding)?;
        let requested: IndexSet<&String> = identifiers.iter().collect();
        let mut summary = RunSummary::new(requested.len());
        let pending: Vec<String> = requested
            .into_iter()
            .filter(|id| !loaded.contains_key(id.as_str()))
            .cloned()
            .collect();
        summary.skipped = summary.requested - pending.len();

        if pending.is_empty() {
            info!(
                skipped = summary.skipped,
                "nothing pending; checkpoint already covers every identifier"
            );
            summary.records_total = count_records(&loaded);
            return Ok(RunOutput {
                results: loaded,
                summary,
            });
        }

        let total = pending.len();
        info!(
            provider = self.provider.name(),
            pending = total,
            skipped = summary.skipped,
            concurrency = self.config.concurrency,
            "harvest starting"
        );

        let (tx, mut rx) = mpsc::channel::<FetchOutcome>(self.config.concurrency.saturating_mul(2));
        let dispatcher = self.spawn_dispatcher(pending, tx);

        let mut results = loaded;
        let mut completed_since_flush: usize = 0;
        let mut last_flush = Instant::now();
        let mut done: usize = 0;

        while let Some(outcome) = rx.recv().await {
            done += 1;
            match outcome {
                FetchOutcome::Fetched {
                    identifier,
                    records,
                    rejected,
                    unknown_cards,
                } => {
                    summary.succeeded += 1;
                    summary.records_fetched += records.len();
                    summary.rejected_battles += rejected;
                    summary.unknown_card_drops += unknown_cards;
                    info!(identifier = %identifier, records = records.len(), done, total, "fetched");
                    results.insert(identifier, records);
                    completed_since_flush += 1;

                    if self
                        .config
                        .flush_policy
                        .should_flush(completed_since_flush, last_flush.elapsed())
                    {
                        match checkpoint.persist(&results).await {
                            Ok(bytes) => {
                                summary.flushes += 1;
                                debug!(
                                    identifiers = results.len(),
                                    bytes,
                                    completed_since_flush,
                                    "checkpoint flushed"
                                );
                                completed_since_flush = 0;
                                last_flush = Instant::now();
                            }
                            Err(err) => {
                                error!(error = %err, "checkpoint flush failed; will retry on next trigger");
                            }
                        }
                    }
                }
                FetchOutcome::Failed { identifier, error } => {
                    summary.failed += 1;
                    warn!(identifier = %identifier, error = %error, done, total, "fetch failed; left pending for resume");
                }
            }
        }

        if let Err(join_err) = dispatcher.await {
            error!(error = %join_err, "dispatcher task ended abnormally");
        }

        let bytes = checkpoint.persist(&results).await?;
        summary.flushes += 1;
        summary.records_total = count_records(&results);
        info!(
            path = %checkpoint.path().display(),
            bytes,
            identifiers = results.len(),
            "final checkpoint written"
        );

        Ok(RunOutput { results, summary })
    }

    /// Spawn one task per pending identifier, at most `concurrency` at a time.
    /// The channel closes once the last worker drops its sender.
    fn spawn_dispatcher(
        &self,
        pending: Vec<String>,
        tx: mpsc::Sender<FetchOutcome>,
    ) -> tokio::task::JoinHandle<()> {
        let sem = Arc::new(Semaphore::new(self.config.concurrency));
        let provider = self.provider.clone();
        let index = self.index.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            for identifier in pending {
                let Ok(permit) = sem.clone().acquire_owned().await else {
                    break;
                };
                let tx = tx.clone();
                let provider = provider.clone();
                let index = index.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let id = identifier.clone();
                    let task = tokio::spawn(async move {
                        fetch_one(provider.as_ref(), &index, &config, identifier).await
                    });
                    let outcome = match task.await {
                        Ok(outcome) => outcome,
                        Err(join_err) => {
                            error!(identifier = %id, error = %join_err, "worker task aborted");
                            FetchOutcome::Failed {
                                identifier: id,
                                error: ProviderError::Aborted(join_err.to_string()),
                            }
                        }
                    };
                    // receiver only goes away if the collector itself is gone
                    let _ = tx.send(outcome).await;
                });
            }
        })
    }
}

/// A checkpoint holds one deck encoding; refuse to append the other one.
fn ensure_encoding(loaded: &ResultSet, encoding: DeckEncoding) -> Result<()> {
    let mismatch = loaded.iter().find_map(|(identifier, records)| {
        records
            .iter()
            .flat_map(BattleRecord::cards)
            .map(CardRef::encoding)
            .find(|found| *found != encoding)
            .map(|found| (identifier, found))
    });
    match mismatch {
        Some((identifier, found)) => Err(HarvestError::config(format!(
            "checkpoint entry {identifier} holds {found:?} decks but this run writes {encoding:?}; \
             match --human-readable to the checkpoint or start with --fresh"
        ))),
        None => Ok(()),
    }
}

async fn fetch_one(
    provider: &dyn BattleHistoryProvider,
    index: &CardIndex,
    config: &EngineConfig,
    identifier: String,
) -> FetchOutcome {
    let id = identifier.as_str();
    let fetched = with_retry(id, &config.retry, config.request_timeout, move || {
        provider.fetch_battles(id)
    })
    .await;

    match fetched {
        Ok(battles) => {
            let (records, rejected, unknown_cards) =
                normalize_all(&identifier, &battles, index, config.encoding);
            FetchOutcome::Fetched {
                identifier,
                records,
                rejected,
                unknown_cards,
            }
        }
        Err(error) => FetchOutcome::Failed { identifier, error },
    }
}

/// Normalize in provider order. Returns `(records, rejected, unknown_cards)`.
fn normalize_all(
    identifier: &str,
    battles: &[RawBattle],
    index: &CardIndex,
    encoding: DeckEncoding,
) -> (Vec<BattleRecord>, usize, usize) {
    let mut records = Vec::with_capacity(battles.len());
    let mut rejected = 0;
    let mut unknown_cards = 0;
    for raw in battles {
        match normalize(raw, index, encoding) {
            Ok(Normalized::Record(rec)) => records.push(rec),
            Ok(Normalized::Rejected(reason)) => {
                rejected += 1;
                debug!(identifier, %reason, "battle rejected");
            }
            Err(err) => {
                unknown_cards += 1;
                warn!(identifier, card = %err.name, "dropping battle with unknown card");
            }
        }
    }
    (records, rejected, unknown_cards)
}
