// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

/// Written in place of missing caption fields
const MISSING: &str = "None";

/// URL of the last (largest) candidate in a `srcset` attribute
pub fn pick_srcset_url(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .last()
        .and_then(|candidate| candidate.split_whitespace().next())
}

/// Resolve a possibly relative resource link against the page it came from
pub fn resolve_link(page_url: &str, link: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    base.join(link).ok().map(String::from)
}

/// Render the `_picture_info.txt` sidecar
pub fn render_picture_info(url: Option<&str>, caption: Option<&str>, credit: Option<&str>) -> String {
    format!(
        "{}\n\n[Picture]\n\n{}\n\n{}\n\n",
        url.unwrap_or(MISSING),
        caption.unwrap_or(MISSING),
        credit.unwrap_or(MISSING)
    )
}
