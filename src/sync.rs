// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::acquire::{AcquisitionContext, EpisodeAcquirer};
use crate::episode::ListingEntry;
use crate::error::SyncError;
use crate::http::HttpClient;
use crate::listing::ListingScanner;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{EpisodeStore, default_schema};

/// How the store is reconciled with the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Rebuild the store from scratch and acquire every episode
    Full,
    /// Acquire episodes the store has not seen, and retry those never
    /// fully downloaded
    Incremental,
    /// Acquire caller-supplied episodes; the store is not used
    Direct,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Direct => "direct",
        })
    }
}

/// Options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Database holding the episode table
    pub database: String,
    /// Episode table
    pub table: String,
    /// Maximum number of episodes acquired at once
    pub max_concurrent: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            database: "natgeo".to_string(),
            table: "overheard".to_string(),
            max_concurrent: 1,
        }
    }
}

/// An episode that was not fully acquired
#[derive(Debug, Clone, Serialize)]
pub struct FailedEpisode {
    pub title: String,
    pub error: String,
}

/// Result of a sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub mode: SyncMode,
    /// Entries found on the listing
    pub discovered: usize,
    /// Entries not previously recorded
    pub new_episodes: usize,
    /// Recorded entries acquired again because they were never fully downloaded
    pub retried: usize,
    /// Rows written to the store
    pub inserted: usize,
    /// Episodes whose selected resources were all written
    pub complete: usize,
    /// Episodes with at least one failed resource
    pub partial: usize,
    /// Episodes whose page could not be fetched
    pub failed: usize,
    pub failed_episodes: Vec<FailedEpisode>,
}

impl SyncSummary {
    fn empty(mode: SyncMode, discovered: usize) -> Self {
        Self {
            mode,
            discovered,
            new_episodes: 0,
            retried: 0,
            inserted: 0,
            complete: 0,
            partial: 0,
            failed: 0,
            failed_episodes: Vec::new(),
        }
    }

    fn tally(&mut self, entry: &ListingEntry, outcome: EpisodeOutcome) {
        match outcome {
            EpisodeOutcome::Complete { .. } => self.complete += 1,
            EpisodeOutcome::Partial(error) => {
                self.partial += 1;
                self.failed_episodes.push(FailedEpisode {
                    title: entry.title().to_string(),
                    error,
                });
            }
            EpisodeOutcome::Failed(error) => {
                self.failed += 1;
                self.failed_episodes.push(FailedEpisode {
                    title: entry.title().to_string(),
                    error,
                });
            }
        }
    }
}

/// Outcome of one acquisition
enum EpisodeOutcome {
    /// No selected resource failed; `whole` when all three were written
    Complete { whole: bool },
    Partial(String),
    Failed(String),
}

/// Orchestrates scan, store and acquisition
pub struct SyncController<C> {
    scanner: ListingScanner<C>,
    acquirer: EpisodeAcquirer<C>,
    store: EpisodeStore,
    options: SyncOptions,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient + Clone + 'static> SyncController<C> {
    pub fn new(
        scanner: ListingScanner<C>,
        acquirer: EpisodeAcquirer<C>,
        store: EpisodeStore,
        options: SyncOptions,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            scanner,
            acquirer,
            store,
            options,
            reporter,
        }
    }

    /// Rebuild the store from the listing and acquire every episode
    ///
    /// The listing is scanned before anything is dropped, so an unreachable
    /// site leaves the existing store untouched.
    pub async fn full_sync(&self, listing_url: &str) -> Result<SyncSummary, SyncError> {
        let entries = self.scan(listing_url).await?;
        let discovered = entries.len();
        let (database, table) = (&self.options.database, &self.options.table);

        self.reporter.report(ProgressEvent::SyncPlanReady {
            mode: SyncMode::Full,
            total_episodes: discovered,
            new_episodes: discovered,
        });

        self.store.drop_database(database)?;
        self.store.create_database(database)?;
        self.store
            .create_table(database, table, &default_schema(table))?;

        let inserted = self.store.insert_episodes(database, table, &entries)?;
        self.reporter.report(ProgressEvent::EpisodesRecorded {
            table: table.clone(),
            count: inserted,
        });

        let summary = SyncSummary {
            new_episodes: discovered,
            inserted,
            ..SyncSummary::empty(SyncMode::Full, discovered)
        };
        self.acquire_and_record(summary, entries).await
    }

    /// Acquire episodes the store does not know yet
    ///
    /// Recorded episodes still marked as not downloaded are acquired again
    /// without being re-inserted. A missing database or table is created
    /// first, in which case every listed episode is new.
    pub async fn incremental_sync(&self, listing_url: &str) -> Result<SyncSummary, SyncError> {
        let entries = self.scan(listing_url).await?;
        let discovered = entries.len();
        let (database, table) = (&self.options.database, &self.options.table);

        if self.store.create_database(database)? {
            warn!(database = %database, "database missing, bootstrapping");
        }
        if !self.store.table_exists(database, table)? {
            warn!(table = %table, "table missing, bootstrapping");
            self.store
                .create_table(database, table, &default_schema(table))?;
        }

        let delta = self.store.diff_against_store(database, table, &entries)?;
        let pending = self.store.pending_episodes(database, table)?;
        self.reporter.report(ProgressEvent::SyncPlanReady {
            mode: SyncMode::Incremental,
            total_episodes: discovered,
            new_episodes: delta.len(),
        });

        if delta.is_empty() && pending.is_empty() {
            warn!(discovered, "no new episodes, nothing to do");
            self.reporter.report(ProgressEvent::NothingToSync {
                total_episodes: discovered,
            });
            self.reporter.report(ProgressEvent::SyncCompleted {
                complete_count: 0,
                partial_count: 0,
                failed_count: 0,
            });
            return Ok(SyncSummary::empty(SyncMode::Incremental, discovered));
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "retrying episodes not yet downloaded");
        }

        let inserted = self.store.insert_episodes(database, table, &delta)?;
        if inserted > 0 {
            self.reporter.report(ProgressEvent::EpisodesRecorded {
                table: table.clone(),
                count: inserted,
            });
        }

        let summary = SyncSummary {
            new_episodes: delta.len(),
            retried: pending.len(),
            inserted,
            ..SyncSummary::empty(SyncMode::Incremental, discovered)
        };
        let mut queue = pending;
        queue.extend(delta);
        self.acquire_and_record(summary, queue).await
    }

    /// Acquire the given episodes without reading or writing the store
    pub async fn acquire_entries(&self, entries: Vec<ListingEntry>) -> SyncSummary {
        let total = entries.len();
        self.reporter.report(ProgressEvent::SyncPlanReady {
            mode: SyncMode::Direct,
            total_episodes: total,
            new_episodes: total,
        });

        let outcomes = self.acquire_all(&entries).await;

        let mut summary = SyncSummary {
            new_episodes: total,
            ..SyncSummary::empty(SyncMode::Direct, total)
        };
        for (entry, outcome) in entries.iter().zip(outcomes) {
            summary.tally(entry, outcome);
        }
        self.finish(summary)
    }

    async fn scan(&self, listing_url: &str) -> Result<Vec<ListingEntry>, SyncError> {
        self.reporter.report(ProgressEvent::ScanningListing {
            url: listing_url.to_string(),
        });
        let entries = self.scanner.scan(listing_url).await?;
        self.reporter.report(ProgressEvent::ListingScanned {
            url: listing_url.to_string(),
            total_entries: entries.len(),
        });
        Ok(entries)
    }

    /// Acquire `entries`, then mark the whole ones as downloaded
    async fn acquire_and_record(
        &self,
        mut summary: SyncSummary,
        entries: Vec<ListingEntry>,
    ) -> Result<SyncSummary, SyncError> {
        let outcomes = self.acquire_all(&entries).await;

        // Status writes stay on this task, after every acquisition finished
        for (entry, outcome) in entries.iter().zip(outcomes) {
            let whole = matches!(outcome, EpisodeOutcome::Complete { whole: true });
            if whole
                && !self.store.mark_downloaded(
                    &self.options.database,
                    &self.options.table,
                    entry.title(),
                )?
            {
                warn!(title = %entry.title(), "no stored row to mark as downloaded");
            }
            summary.tally(entry, outcome);
        }

        Ok(self.finish(summary))
    }

    fn finish(&self, summary: SyncSummary) -> SyncSummary {
        info!(
            mode = %summary.mode,
            complete = summary.complete,
            partial = summary.partial,
            failed = summary.failed,
            "sync finished"
        );
        self.reporter.report(ProgressEvent::SyncCompleted {
            complete_count: summary.complete,
            partial_count: summary.partial,
            failed_count: summary.failed,
        });
        summary
    }

    /// Acquire episodes through a slot pool; outcomes come back in input order
    async fn acquire_all(&self, entries: &[ListingEntry]) -> Vec<EpisodeOutcome> {
        // A lone episode runs on this task
        if let [entry] = entries {
            let ctx = AcquisitionContext::single();
            return vec![acquire_episode(&self.acquirer, &self.reporter, entry, &ctx).await];
        }

        let max_concurrent = self.options.max_concurrent.max(1);
        let total_to_acquire = entries.len();

        // The slot pool limits concurrency and provides stable slot IDs
        let (slot_tx, mut slot_rx) = tokio::sync::mpsc::channel(max_concurrent);
        for slot in 0..max_concurrent {
            let _ = slot_tx.send(slot).await;
        }

        let mut handles = Vec::with_capacity(entries.len());

        for (episode_index, entry) in entries.iter().cloned().enumerate() {
            // Acquire a slot BEFORE spawning so episodes start in order
            let Some(slot) = slot_rx.recv().await else {
                break;
            };

            let slot_tx = slot_tx.clone();
            let acquirer = self.acquirer.clone();
            let reporter = self.reporter.clone();

            let handle = tokio::spawn(async move {
                let ctx = AcquisitionContext {
                    slot,
                    episode_index,
                    total_to_acquire,
                };
                let outcome = acquire_episode(&acquirer, &reporter, &entry, &ctx).await;

                // Return slot to the pool when done
                let _ = slot_tx.send(slot).await;

                outcome
            });

            handles.push(handle);
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "acquisition task aborted");
                    EpisodeOutcome::Failed(format!("acquisition task aborted: {}", e))
                }
            });
        }
        outcomes
    }
}

async fn acquire_episode<C: HttpClient>(
    acquirer: &EpisodeAcquirer<C>,
    reporter: &SharedProgressReporter,
    entry: &ListingEntry,
    ctx: &AcquisitionContext,
) -> EpisodeOutcome {
    match acquirer.acquire(entry, ctx).await {
        Ok(report) if !report.has_failures() => EpisodeOutcome::Complete {
            whole: report.is_complete(),
        },
        Ok(report) => EpisodeOutcome::Partial(
            report
                .failures()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Err(e) => {
            reporter.report(ProgressEvent::EpisodeFailed {
                slot: ctx.slot,
                episode_title: entry.title().to_string(),
                error: e.to_string(),
            });
            EpisodeOutcome::Failed(e.to_string())
        }
    }
}
