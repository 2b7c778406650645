// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::episode::{DownloadStatus, contains_hazard};
use crate::error::StoreError;

/// Schema statements for an episode table named `table`
pub fn default_schema(table: &str) -> Vec<String> {
    let table = quote_ident(table);
    vec![
        format!("DROP TABLE IF EXISTS {table}"),
        format!(
            "CREATE TABLE {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                url TEXT,
                download_status TEXT NOT NULL DEFAULT '{status}',
                updated_time TEXT
            )",
            status = DownloadStatus::NotDownloaded.as_str(),
        ),
    ]
}

/// Quote an identifier for splicing into SQL
///
/// Identifiers cannot be bound as parameters; names are validated first and
/// quoted here so that even an unexpected character cannot end the literal.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Reject empty names and names with hazard characters
pub fn validate_name(param: &'static str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Precondition {
            param,
            value: value.to_string(),
            reason: "must not be empty",
        });
    }
    if contains_hazard(value) {
        return Err(StoreError::Precondition {
            param,
            value: value.to_string(),
            reason: "must not contain any of : / \\ * ? < > [ ] |",
        });
    }
    Ok(())
}
