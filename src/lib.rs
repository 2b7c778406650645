// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod acquire;
pub mod cache;
pub mod episode;
pub mod error;
pub mod fetch;
pub mod http;
pub mod listing;
pub mod progress;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use acquire::{
    AcquireOptions, AcquisitionContext, AcquisitionReport, AcquisitionState, AssetResolver,
    EmbedAssetResolver, EpisodeAcquirer, ResourceKind, ResourceOutcome, ResourceSet,
};
pub use episode::{DownloadStatus, ListingEntry, StoredEpisode, sanitize_title};
pub use error::{
    AcquisitionError, DownloadError, ExtractError, FetchError, ResolutionError, ResourceError,
    ScanError, StoreError, SyncError,
};
pub use fetch::{FetchOptions, ResourceFetcher};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use listing::{ListingScanner, MarkupExtractor, SelectorExtractor, SiteSelectors};
pub use progress::{
    NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter, TracingReporter,
};
pub use store::EpisodeStore;
pub use sync::{FailedEpisode, SyncController, SyncMode, SyncOptions, SyncSummary};
