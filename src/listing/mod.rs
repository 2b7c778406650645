// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod extract;
mod scan;

pub use extract::{
    EpisodePage, ListingSection, ListingSections, MarkupExtractor, SelectorExtractor,
    SiteSelectors,
};
pub use scan::{ListingScanner, merge_sections};
