// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Characters that break file names or store identifiers
pub const HAZARD_CHARS: [char; 10] = [':', '/', '\\', '*', '?', '<', '>', '[', ']', '|'];

/// Replacement for every hazard character
const REPLACEMENT: char = '_';

/// Check if a character must not appear in a title key or file name
pub fn is_hazard_char(c: char) -> bool {
    HAZARD_CHARS.contains(&c)
}

/// Whether `s` contains at least one hazard character
pub fn contains_hazard(s: &str) -> bool {
    s.chars().any(is_hazard_char)
}

/// Sanitize an episode title into its key form
///
/// Every hazard character is replaced with `_`; nothing else changes, so
/// the result is used verbatim as the store key and as the file stem of
/// the episode's resource bundle.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if is_hazard_char(c) { REPLACEMENT } else { c })
        .collect()
}
