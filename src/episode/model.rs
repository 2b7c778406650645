// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::title::sanitize_title;

/// One episode as discovered on the listing page
///
/// Only [`ListingEntry::new`] builds entries, so the title is always in
/// its sanitized key form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    title: String,
    url: String,
}

impl ListingEntry {
    /// Build an entry, sanitizing the raw title
    pub fn new(raw_title: &str, url: impl Into<String>) -> Self {
        Self {
            title: sanitize_title(raw_title),
            url: url.into(),
        }
    }

    /// Sanitized title, the natural key of the episode
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Absolute URL of the episode page
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parses `TITLE=URL`; the first `=` separates the two
impl FromStr for ListingEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (title, url) = s
            .split_once('=')
            .ok_or_else(|| format!("expected TITLE=URL, got '{}'", s))?;
        let (title, url) = (title.trim(), url.trim());
        if title.is_empty() {
            return Err(format!("missing title in '{}'", s));
        }
        if url.is_empty() {
            return Err(format!("missing URL in '{}'", s));
        }
        Ok(Self::new(title, url))
    }
}

/// Download status recorded per episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    Downloaded,
}

impl DownloadStatus {
    /// Column value used by the store
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDownloaded => "NO",
            Self::Downloaded => "YES",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO" => Ok(Self::NotDownloaded),
            "YES" => Ok(Self::Downloaded),
            other => Err(format!("unknown download status '{}'", other)),
        }
    }
}

/// An episode row as recorded in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredEpisode {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    pub status: DownloadStatus,
    pub updated_time: Option<String>,
}
