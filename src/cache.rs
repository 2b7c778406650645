// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Keep a copy of a fetched page as `{dir}/{stem}.html`
///
/// Diagnostics only: failures are logged and otherwise ignored.
pub async fn cache_page(dir: Option<&Path>, stem: &str, html: &str) -> Option<PathBuf> {
    let dir = dir?;
    let path = dir.join(format!("{}.html", stem));

    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, html).await
    }
    .await;

    match result {
        Ok(()) => {
            debug!(path = %path.display(), "cached raw page");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to cache raw page");
            None
        }
    }
}
