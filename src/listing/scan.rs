// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::cache::cache_page;
use crate::episode::ListingEntry;
use crate::error::ScanError;
use crate::fetch::ResourceFetcher;
use crate::http::HttpClient;

use super::extract::{ListingSection, ListingSections, MarkupExtractor};

/// Subdirectory of the cache holding listing pages
///
/// Episode pages sit directly in the cache directory under their title,
/// and titles never contain a path separator.
const LISTING_CACHE_DIR: &str = "listing";

/// File stem of the cached listing page
const LISTING_CACHE_STEM: &str = "index";

/// Produces the current set of episodes from the listing page
#[derive(Clone)]
pub struct ListingScanner<C> {
    fetcher: ResourceFetcher<C>,
    extractor: Arc<dyn MarkupExtractor>,
    cache_dir: Option<PathBuf>,
}

impl<C: HttpClient> ListingScanner<C> {
    pub fn new(
        fetcher: ResourceFetcher<C>,
        extractor: Arc<dyn MarkupExtractor>,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            cache_dir,
        }
    }

    /// Fetch and extract the listing at `listing_url`
    ///
    /// Entries come back in page order with sanitized titles. A listing
    /// without any entry is reported as [`ScanError::EmptyResult`].
    pub async fn scan(&self, listing_url: &str) -> Result<Vec<ListingEntry>, ScanError> {
        info!(url = %listing_url, "scanning listing");

        let html = self
            .fetcher
            .fetch_text(listing_url)
            .await
            .map_err(|source| ScanError::Unreachable {
                url: listing_url.to_string(),
                source,
            })?;

        let listing_cache = self.cache_dir.as_ref().map(|dir| dir.join(LISTING_CACHE_DIR));
        cache_page(listing_cache.as_deref(), LISTING_CACHE_STEM, &html).await;

        let sections = self.extractor.extract_listing(&html);
        let base = Url::parse(listing_url).ok();
        let entries = merge_sections(base.as_ref(), sections);

        if entries.is_empty() {
            return Err(ScanError::EmptyResult {
                url: listing_url.to_string(),
            });
        }

        info!(count = entries.len(), "listing scanned");
        Ok(entries)
    }
}

/// Merge the latest and regular sections into one ordered entry list
///
/// Duplicate titles follow "last write wins": the entry keeps the position
/// of its first occurrence and takes the URL of its last one, so a regular
/// tile overrides a latest tile with the same title.
pub fn merge_sections(base: Option<&Url>, sections: ListingSections) -> Vec<ListingEntry> {
    let mut entries: Vec<ListingEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (name, section) in [("latest", sections.latest), ("regular", sections.regular)] {
        for (raw_title, href) in zip_section(name, section) {
            let Some(url) = resolve_href(base, &href) else {
                warn!(title = %raw_title, href = %href, "skipping entry with unusable link");
                continue;
            };

            let entry = ListingEntry::new(&raw_title, url);
            match positions.get(entry.title()) {
                Some(&index) => {
                    debug!(title = %entry.title(), "duplicate title, keeping last URL");
                    entries[index] = entry;
                }
                None => {
                    positions.insert(entry.title().to_string(), entries.len());
                    entries.push(entry);
                }
            }
        }
    }

    entries
}

fn zip_section(name: &str, section: ListingSection) -> Vec<(String, String)> {
    if section.titles.len() != section.urls.len() {
        warn!(
            section = name,
            titles = section.titles.len(),
            urls = section.urls.len(),
            "listing section has mismatched titles and links, surplus dropped"
        );
    }

    section
        .titles
        .into_iter()
        .zip(section.urls)
        .map(|(title, url)| (title.trim().to_string(), url.trim().to_string()))
        .filter(|(title, _)| !title.is_empty())
        .collect()
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    if href.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Url::parse(href).ok().map(String::from),
    }
}
