// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test doubles shared by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::acquire::AssetResolver;
use crate::error::ResolutionError;
use crate::fetch::{FetchOptions, ResourceFetcher};
use crate::http::{ByteStream, HttpBytes, HttpClient, HttpResponse};

#[derive(Clone)]
struct Route {
    status: u16,
    body: Vec<u8>,
}

/// In-memory HTTP client; unknown URLs answer 404
#[derive(Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.route(url, status, body);
        self
    }

    pub fn route(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route {
                status,
                body: body.into(),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    fn lookup(&self, url: &str) -> Route {
        self.requests.lock().unwrap().push(url.to_string());
        self.routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Route {
                status: 404,
                body: b"Not Found".to_vec(),
            })
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_bytes(&self, url: &str) -> Result<HttpBytes, reqwest::Error> {
        let route = self.lookup(url);
        Ok(HttpBytes {
            status: route.status,
            body: Bytes::from(route.body),
        })
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let route = self.lookup(url);
        let len = route.body.len() as u64;
        let data = route.body;

        let stream: ByteStream =
            Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

        Ok(HttpResponse {
            status: route.status,
            content_length: Some(len),
            body: stream,
        })
    }
}

/// Fetcher with the production retry bound but no delay between attempts
pub fn fast_fetcher(client: MockHttpClient) -> ResourceFetcher<MockHttpClient> {
    ResourceFetcher::with_options(
        client,
        FetchOptions {
            max_attempts: 2,
            retry_delay: Duration::ZERO,
        },
    )
}

/// Resolver answering from a fixed table
#[derive(Clone, Default)]
pub struct StaticResolver {
    media: HashMap<String, String>,
    timeouts: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(mut self, page_url: &str, media_url: &str) -> Self {
        self.media.insert(page_url.to_string(), media_url.to_string());
        self
    }

    pub fn with_timeout(mut self, page_url: &str) -> Self {
        self.timeouts.insert(page_url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetResolver for StaticResolver {
    async fn resolve(&self, page_url: &str) -> Result<String, ResolutionError> {
        self.calls.lock().unwrap().push(page_url.to_string());
        if self.timeouts.contains(page_url) {
            return Err(ResolutionError::Timeout {
                page_url: page_url.to_string(),
                after: Duration::from_secs(20),
            });
        }
        self.media
            .get(page_url)
            .cloned()
            .ok_or_else(|| ResolutionError::NotFound {
                page_url: page_url.to_string(),
                reason: "no media registered".to_string(),
            })
    }
}

/// Listing markup understood by the default selectors
pub fn listing_html(latest: &[(&str, &str)], regular: &[(&str, &str)]) -> String {
    let mut html = String::from("<html><body>");
    for (title, href) in latest {
        html.push_str(&format!(
            r#"<a class="AnchorLink PromoTile__Link" href="{href}"><span>{title}</span></a>"#
        ));
    }
    for (title, href) in regular {
        html.push_str(&format!(
            r#"<a class="AnchorLink RegularStandardPrismTile__ContentLink" href="{href}">{title}</a>"#
        ));
    }
    html.push_str("</body></html>");
    html
}

/// Article markup understood by the default selectors
pub fn episode_html(publish_date: Option<&str>, image_url: Option<&str>) -> String {
    let date = publish_date
        .map(|d| format!(r#"<div class="Byline__Meta Byline__Meta--publishDate">{d}</div>"#))
        .unwrap_or_default();
    let image = image_url
        .map(|u| {
            format!(
                r#"<div class="Image__Wrapper"><picture><source srcset="{u}?w=320 320w, {u} 1600w"></picture></div>"#
            )
        })
        .unwrap_or_default();

    format!(
        r#"<html><body>
{date}
<p class="Article__Headline__Desc">Why we can’t stop talking about “sharks”.</p>
{image}
<span class="RichText">A shark in the deep.</span>
<span class="Caption__Credit">Photograph by Someone</span>
<section class="Article__Content"><div>
<p>Intro paragraph.</p>
<p>Listen on your favourite app.</p>
<p>AMY: Hello there.</p>
<p>It’s a great day.</p>
<p>SHOW NOTES</p>
<p>Not part of the transcript.</p>
</div></section>
</body></html>"#
    )
}
