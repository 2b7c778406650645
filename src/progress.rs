// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::acquire::{AcquisitionState, ResourceKind};
use crate::sync::SyncMode;

/// Events emitted during a crawl for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Listing page is being fetched
    ScanningListing { url: String },

    /// Listing has been extracted
    ListingScanned { url: String, total_entries: usize },

    /// The set of episodes to acquire is known
    SyncPlanReady {
        mode: SyncMode,
        total_episodes: usize,
        new_episodes: usize,
    },

    /// Incremental run found nothing new
    NothingToSync { total_episodes: usize },

    /// Entries were written to the store
    EpisodesRecorded { table: String, count: usize },

    /// An episode acquisition is starting
    EpisodeStarting {
        /// Identifies the acquisition slot (0 to max_concurrent-1)
        slot: usize,
        episode_title: String,
        /// Index of this episode in the acquisition queue
        episode_index: usize,
        /// Total number of episodes to acquire
        total_to_acquire: usize,
    },

    /// An acquisition moved to a new state
    EpisodeState {
        slot: usize,
        episode_title: String,
        state: AcquisitionState,
    },

    /// One resource of an episode was written
    ResourceCompleted {
        slot: usize,
        episode_title: String,
        kind: ResourceKind,
    },

    /// One resource of an episode could not be acquired
    ResourceFailed {
        slot: usize,
        episode_title: String,
        kind: ResourceKind,
        error: String,
    },

    /// Audio download progress update
    DownloadProgress {
        slot: usize,
        episode_title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An episode was processed; `complete` when all resources succeeded
    EpisodeFinished {
        slot: usize,
        episode_title: String,
        complete: bool,
    },

    /// The episode page itself could not be fetched
    EpisodeFailed {
        slot: usize,
        episode_title: String,
        error: String,
    },

    /// Sync operation completed
    SyncCompleted {
        complete_count: usize,
        partial_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Reporter that turns events into log lines, for non-interactive output
///
/// Byte-level download progress is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ScanningListing { url } => info!(%url, "scanning listing"),
            ProgressEvent::ListingScanned { url, total_entries } => {
                info!(%url, total_entries, "listing scanned")
            }
            ProgressEvent::SyncPlanReady {
                mode,
                total_episodes,
                new_episodes,
            } => info!(%mode, total_episodes, new_episodes, "sync plan ready"),
            ProgressEvent::NothingToSync { total_episodes } => {
                warn!(total_episodes, "no new episodes")
            }
            ProgressEvent::EpisodesRecorded { table, count } => {
                info!(%table, count, "episodes recorded")
            }
            ProgressEvent::EpisodeStarting {
                episode_title,
                episode_index,
                total_to_acquire,
                ..
            } => info!(
                title = %episode_title,
                "[{}/{}] acquiring",
                episode_index + 1,
                total_to_acquire
            ),
            ProgressEvent::EpisodeState { .. } | ProgressEvent::DownloadProgress { .. } => {}
            ProgressEvent::ResourceCompleted {
                episode_title,
                kind,
                ..
            } => info!(title = %episode_title, %kind, "resource written"),
            ProgressEvent::ResourceFailed {
                episode_title,
                kind,
                error,
                ..
            } => error!(title = %episode_title, %kind, %error, "resource failed"),
            ProgressEvent::EpisodeFinished {
                episode_title,
                complete,
                ..
            } => info!(title = %episode_title, complete, "episode processed"),
            ProgressEvent::EpisodeFailed {
                episode_title,
                error,
                ..
            } => error!(title = %episode_title, %error, "episode failed"),
            ProgressEvent::SyncCompleted {
                complete_count,
                partial_count,
                failed_count,
            } => info!(complete_count, partial_count, failed_count, "sync completed"),
        }
    }
}

/// Reporter that keeps every event, for assertions in tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingReporter {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
