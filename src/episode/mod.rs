// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod model;
mod title;

pub use model::{DownloadStatus, ListingEntry, StoredEpisode};
pub use title::{HAZARD_CHARS, contains_hazard, is_hazard_char, sanitize_title};
