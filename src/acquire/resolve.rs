// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::{ExtractError, ResolutionError};
use crate::fetch::ResourceFetcher;
use crate::http::HttpClient;

/// Media elements carrying a playable source
const MEDIA_SELECTOR: &str = "audio[src], video[src], source[src]";
/// Embedded player frames
const FRAME_SELECTOR: &str = "iframe[src]";

/// Resolves the URL of media that a page only loads dynamically
///
/// Callers bound each call with their own timeout; implementations do not
/// have to.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve(&self, page_url: &str) -> Result<String, ResolutionError>;
}

/// Resolver that follows the page's embedded player frame
///
/// Looks for a media element on the page itself first, then in the first
/// embedded frame.
pub struct EmbedAssetResolver<C> {
    fetcher: ResourceFetcher<C>,
    media: Selector,
    frame: Selector,
}

impl<C: HttpClient> EmbedAssetResolver<C> {
    pub fn new(fetcher: ResourceFetcher<C>) -> Result<Self, ExtractError> {
        Ok(Self {
            fetcher,
            media: parse(MEDIA_SELECTOR)?,
            frame: parse(FRAME_SELECTOR)?,
        })
    }

    fn find(&self, html: &str, base: &Url, selector: &Selector) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(selector)
            .filter_map(|element| element.value().attr("src"))
            .filter_map(|src| base.join(src.trim()).ok())
            .find(|url| matches!(url.scheme(), "http" | "https"))
            .map(String::from)
    }
}

#[async_trait]
impl<C: HttpClient> AssetResolver for EmbedAssetResolver<C> {
    async fn resolve(&self, page_url: &str) -> Result<String, ResolutionError> {
        let not_found = |reason: String| ResolutionError::NotFound {
            page_url: page_url.to_string(),
            reason,
        };

        let base = Url::parse(page_url).map_err(|e| not_found(e.to_string()))?;
        let page = self
            .fetcher
            .fetch_text(page_url)
            .await
            .map_err(|e| not_found(e.to_string()))?;

        if let Some(media) = self.find(&page, &base, &self.media) {
            return Ok(media);
        }

        let frame_url = self
            .find(&page, &base, &self.frame)
            .ok_or_else(|| not_found("no media element and no embedded player".to_string()))?;
        debug!(%page_url, %frame_url, "following embedded player");

        let frame = self
            .fetcher
            .fetch_text(&frame_url)
            .await
            .map_err(|e| not_found(e.to_string()))?;
        let frame_base = Url::parse(&frame_url).map_err(|e| not_found(e.to_string()))?;

        self.find(&frame, &frame_base, &self.media)
            .ok_or_else(|| not_found(format!("embedded player {} has no media source", frame_url)))
    }
}

fn parse(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHttpClient, fast_fetcher};

    const PAGE: &str = "https://example.com/podcasts/article/ep-1";

    fn resolver(client: MockHttpClient) -> EmbedAssetResolver<MockHttpClient> {
        EmbedAssetResolver::new(fast_fetcher(client)).unwrap()
    }

    #[tokio::test]
    async fn finds_media_on_page() {
        let client = MockHttpClient::new().with_route(
            PAGE,
            200,
            r#"<html><body><audio src="/media/ep-1.mp3"></audio></body></html>"#,
        );

        let url = resolver(client).resolve(PAGE).await.unwrap();

        assert_eq!(url, "https://example.com/media/ep-1.mp3");
    }

    #[tokio::test]
    async fn follows_embedded_player() {
        let client = MockHttpClient::new()
            .with_route(
                PAGE,
                200,
                r#"<html><body><iframe src="https://player.example.net/embed/42"></iframe></body></html>"#,
            )
            .with_route(
                "https://player.example.net/embed/42",
                200,
                r#"<html><body><video src="https://cdn.example.net/42.mp3"></video></body></html>"#,
            );

        let url = resolver(client).resolve(PAGE).await.unwrap();

        assert_eq!(url, "https://cdn.example.net/42.mp3");
    }

    #[tokio::test]
    async fn reports_missing_media() {
        let client = MockHttpClient::new().with_route(PAGE, 200, "<html><body></body></html>");

        let err = resolver(client).resolve(PAGE).await.unwrap_err();

        assert!(matches!(err, ResolutionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn ignores_non_http_sources() {
        let client = MockHttpClient::new().with_route(
            PAGE,
            200,
            r#"<html><body><video src="blob:https://example.com/123"></video></body></html>"#,
        );

        let err = resolver(client).resolve(PAGE).await.unwrap_err();

        assert!(matches!(err, ResolutionError::NotFound { .. }));
    }
}
