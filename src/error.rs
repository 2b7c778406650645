// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when fetching a single resource over HTTP
#[derive(Error, Debug)]
pub enum FetchError {
    /// The URL could not be used at all; never retried
    #[error("Invalid URL '{url}': {reason}")]
    Invalid { url: String, reason: String },

    /// A single attempt failed (network error or non-200 status)
    #[error("Request to {url} failed: {reason}")]
    Transient { url: String, reason: String },

    /// Every attempt within the retry bound failed
    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors that can occur while streaming a resource to disk
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            Self::StreamFailed { .. } => true,
            Self::FileCreateFailed { .. } | Self::FileWriteFailed { .. } => false,
        }
    }
}

/// Errors that can occur when scanning the episode listing
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Listing {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Listing {url} yielded no episodes")]
    EmptyResult { url: String },
}

/// Errors reported by the episode state store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid {param} '{value}': {reason}")]
    Precondition {
        param: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Failed to open database '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to create database '{name}': {source}")]
    Creation {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to apply schema for table '{table}', rolled back: {source}")]
    SchemaApply {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to write {count} episodes to table '{table}', rolled back: {source}")]
    Write {
        table: String,
        count: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query against table '{table}' failed: {source}")]
    Query {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove database file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from resolving a dynamically loaded media URL
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Resolving media for {page_url} timed out after {after:?}")]
    Timeout { page_url: String, after: Duration },

    #[error("No media source found for {page_url}: {reason}")]
    NotFound { page_url: String, reason: String },
}

/// Cause of a single resource failing during acquisition
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("{0} not present in page markup")]
    Missing(&'static str),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-resource acquisition failure; never fatal to the episode
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Transcript: {0}")]
    Text(#[source] ResourceError),

    #[error("Cover image: {0}")]
    Image(#[source] ResourceError),

    #[error("Audio: {0}")]
    Audio(#[source] ResourceError),
}

/// Errors building a markup extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Top-level errors for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
