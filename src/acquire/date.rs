// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate};

/// Label some bylines put in front of the date
const PUBLISHED_PREFIX: &str = "Published";

/// Parse the publish date shown on an episode page
///
/// Accepts the byline form ("Published March 20, 2023"), abbreviated month
/// names, ISO dates and RFC 3339 timestamps.
pub fn parse_publish_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    let text = text.strip_prefix(PUBLISHED_PREFIX).unwrap_or(text).trim();

    let formats = ["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"];
    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Publish date of the episode, or `today` when it cannot be read
///
/// The flag is `true` when the fallback was used.
pub fn resolve_publish_date(raw: Option<&str>, today: NaiveDate) -> (NaiveDate, bool) {
    match raw.and_then(parse_publish_date) {
        Some(date) => (date, false),
        None => (today, true),
    }
}

/// Storage directory for an episode published on `date`: `{root}/{yyyy}/{mm}`
pub fn storage_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
}
