// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-episode acquisition of transcript, cover image and audio

mod date;
mod image;
mod resolve;
mod text;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

pub use date::{parse_publish_date, resolve_publish_date, storage_dir};
pub use image::{pick_srcset_url, render_picture_info, resolve_link};
pub use resolve::{AssetResolver, EmbedAssetResolver};
pub use text::{normalize_quotes, render_transcript};

use crate::cache::cache_page;
use crate::episode::ListingEntry;
use crate::error::{AcquisitionError, FetchError, ResolutionError, ResourceError};
use crate::fetch::ResourceFetcher;
use crate::http::HttpClient;
use crate::listing::{EpisodePage, MarkupExtractor};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// The three resources acquired per episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Text,
    Image,
    Audio,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "transcript",
            Self::Image => "cover image",
            Self::Audio => "audio",
        })
    }
}

/// Selection of resources an acquisition writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSet {
    text: bool,
    image: bool,
    audio: bool,
}

impl ResourceSet {
    pub fn all() -> Self {
        Self {
            text: true,
            image: true,
            audio: true,
        }
    }

    /// Exactly the listed kinds
    pub fn only(kinds: &[ResourceKind]) -> Self {
        Self {
            text: kinds.contains(&ResourceKind::Text),
            image: kinds.contains(&ResourceKind::Image),
            audio: kinds.contains(&ResourceKind::Audio),
        }
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Text => self.text,
            ResourceKind::Image => self.image,
            ResourceKind::Audio => self.audio,
        }
    }
}

impl Default for ResourceSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Progress of a single episode acquisition
///
/// `TextDone`, `ImageDone` and `AudioDone` are only reported when that
/// resource was written. `Complete` means processing ended; the report
/// tells which resources succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Init,
    UrlFetched,
    DateResolved,
    PathResolved,
    TextDone,
    ImageDone,
    AudioDone,
    Complete,
    Failed,
}

impl AcquisitionState {
    /// The state following `self` on the success path
    ///
    /// `Complete` and `Failed` are terminal.
    pub fn advance(self) -> Self {
        match self {
            Self::Init => Self::UrlFetched,
            Self::UrlFetched => Self::DateResolved,
            Self::DateResolved => Self::PathResolved,
            Self::PathResolved => Self::TextDone,
            Self::TextDone => Self::ImageDone,
            Self::ImageDone => Self::AudioDone,
            Self::AudioDone | Self::Complete => Self::Complete,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Context for tracking an acquisition in concurrent scenarios
#[derive(Debug, Clone)]
pub struct AcquisitionContext {
    /// Slot ID (0 to max_concurrent-1) for progress bar management
    pub slot: usize,
    /// Index of this episode in the acquisition queue
    pub episode_index: usize,
    /// Total number of episodes to acquire
    pub total_to_acquire: usize,
}

impl AcquisitionContext {
    /// Context for a lone acquisition outside the slot pool
    pub fn single() -> Self {
        Self {
            slot: 0,
            episode_index: 0,
            total_to_acquire: 1,
        }
    }
}

/// Where and how episode resources are stored
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Root of the `{yyyy}/{mm}` archive tree
    pub output_root: PathBuf,
    /// Existing directory that replaces the dated archive directory; when
    /// it does not exist the fallback is used and nothing is created
    pub save_dir: Option<PathBuf>,
    /// Used when the storage directory is unusable; `None` means the
    /// current working directory
    pub fallback_dir: Option<PathBuf>,
    /// Raw episode pages are kept here when set
    pub html_cache_dir: Option<PathBuf>,
    /// Credit line written into every transcript
    pub source_credit: String,
    /// Upper bound for resolving the audio URL
    pub audio_timeout: Duration,
    /// Audio source to use instead of resolving one from the page
    pub audio_url: Option<String>,
    pub resources: ResourceSet,
    /// Write the picture and audio info files without downloading media
    pub info_only: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            save_dir: None,
            fallback_dir: None,
            html_cache_dir: None,
            source_credit: "Nat Geo".to_string(),
            audio_timeout: Duration::from_secs(60),
            audio_url: None,
            resources: ResourceSet::all(),
            info_only: false,
        }
    }
}

/// What happened to one resource of an episode
#[derive(Debug)]
pub enum ResourceOutcome {
    /// Written to this path
    Saved(PathBuf),
    /// Not selected for this acquisition
    Skipped,
    Failed(AcquisitionError),
}

impl ResourceOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Saved(path) => Some(path),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AcquisitionError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Result<PathBuf, AcquisitionError>> for ResourceOutcome {
    fn from(result: Result<PathBuf, AcquisitionError>) -> Self {
        match result {
            Ok(path) => Self::Saved(path),
            Err(e) => Self::Failed(e),
        }
    }
}

/// Outcome of acquiring one episode whose page could be fetched
#[derive(Debug)]
pub struct AcquisitionReport {
    pub title: String,
    pub publish_date: NaiveDate,
    /// Publish date could not be read; today's date was used
    pub date_recovered: bool,
    pub save_dir: PathBuf,
    /// Storage directory was unusable; the fallback was used
    pub path_recovered: bool,
    pub text: ResourceOutcome,
    pub image: ResourceOutcome,
    pub audio: ResourceOutcome,
}

impl AcquisitionReport {
    /// All three resources were written
    pub fn is_complete(&self) -> bool {
        self.outcomes().all(ResourceOutcome::is_saved)
    }

    /// At least one selected resource failed
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn failures(&self) -> impl Iterator<Item = &AcquisitionError> {
        self.outcomes().filter_map(ResourceOutcome::error)
    }

    fn outcomes(&self) -> impl Iterator<Item = &ResourceOutcome> {
        [&self.text, &self.image, &self.audio].into_iter()
    }
}

/// File names of one episode inside its storage directory
struct EpisodeFiles {
    text: PathBuf,
    picture_info: PathBuf,
    picture: PathBuf,
    audio_info: PathBuf,
    audio: PathBuf,
}

impl EpisodeFiles {
    fn new(dir: &Path, title: &str) -> Self {
        Self {
            text: dir.join(format!("{}.txt", title)),
            picture_info: dir.join(format!("{}_picture_info.txt", title)),
            picture: dir.join(format!("{}.jpg", title)),
            audio_info: dir.join(format!("{}_audio_info.txt", title)),
            audio: dir.join(format!("{}.mp3", title)),
        }
    }
}

/// Acquires the resources of single episodes
#[derive(Clone)]
pub struct EpisodeAcquirer<C> {
    fetcher: ResourceFetcher<C>,
    extractor: Arc<dyn MarkupExtractor>,
    resolver: Arc<dyn AssetResolver>,
    options: AcquireOptions,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient> EpisodeAcquirer<C> {
    pub fn new(
        fetcher: ResourceFetcher<C>,
        extractor: Arc<dyn MarkupExtractor>,
        resolver: Arc<dyn AssetResolver>,
        options: AcquireOptions,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            resolver,
            options,
            reporter,
        }
    }

    /// Acquire the selected resources of `entry`
    ///
    /// Only a failure to fetch the episode page is returned as an error.
    /// Resource failures are recorded in the report and never stop the
    /// remaining resources.
    pub async fn acquire(
        &self,
        entry: &ListingEntry,
        ctx: &AcquisitionContext,
    ) -> Result<AcquisitionReport, FetchError> {
        info!(title = %entry.title(), url = %entry.url(), "acquiring episode");
        self.reporter.report(ProgressEvent::EpisodeStarting {
            slot: ctx.slot,
            episode_title: entry.title().to_string(),
            episode_index: ctx.episode_index,
            total_to_acquire: ctx.total_to_acquire,
        });

        let mut state = AcquisitionState::Init;

        let html = match self.fetcher.fetch_text(entry.url()).await {
            Ok(html) => html,
            Err(e) => {
                error!(title = %entry.title(), error = %e, "episode page unavailable");
                self.enter(ctx, entry, AcquisitionState::Failed);
                return Err(e);
            }
        };
        cache_page(self.options.html_cache_dir.as_deref(), entry.title(), &html).await;
        let page = self.extractor.extract_episode(&html);
        state = self.step(ctx, entry, state);

        let today = Local::now().date_naive();
        let (publish_date, date_recovered) =
            resolve_publish_date(page.publish_date.as_deref(), today);
        if date_recovered {
            warn!(
                title = %entry.title(),
                raw = ?page.publish_date,
                fallback = %publish_date,
                "publish date unreadable, using today"
            );
        }
        state = self.step(ctx, entry, state);

        let (save_dir, path_recovered) = self.prepare_dir(publish_date).await;
        state = self.step(ctx, entry, state);

        let files = EpisodeFiles::new(&save_dir, entry.title());

        let text = if self.options.resources.contains(ResourceKind::Text) {
            let result = self.write_text(entry, &page, &files).await;
            result.map_err(AcquisitionError::Text).into()
        } else {
            ResourceOutcome::Skipped
        };
        self.finish_resource(ctx, entry, ResourceKind::Text, &text);
        state = self.step_if_saved(ctx, entry, state, &text);

        let image = if self.options.resources.contains(ResourceKind::Image) {
            let result = self.write_image(entry, &page, &files).await;
            result.map_err(AcquisitionError::Image).into()
        } else {
            ResourceOutcome::Skipped
        };
        self.finish_resource(ctx, entry, ResourceKind::Image, &image);
        state = self.step_if_saved(ctx, entry, state, &image);

        let audio = if self.options.resources.contains(ResourceKind::Audio) {
            let result = self.write_audio(entry, ctx, &files).await;
            result.map_err(AcquisitionError::Audio).into()
        } else {
            ResourceOutcome::Skipped
        };
        self.finish_resource(ctx, entry, ResourceKind::Audio, &audio);
        state = self.step_if_saved(ctx, entry, state, &audio);

        self.step(ctx, entry, state);

        let report = AcquisitionReport {
            title: entry.title().to_string(),
            publish_date,
            date_recovered,
            save_dir,
            path_recovered,
            text,
            image,
            audio,
        };

        self.reporter.report(ProgressEvent::EpisodeFinished {
            slot: ctx.slot,
            episode_title: entry.title().to_string(),
            complete: !report.has_failures(),
        });
        Ok(report)
    }

    fn step(
        &self,
        ctx: &AcquisitionContext,
        entry: &ListingEntry,
        state: AcquisitionState,
    ) -> AcquisitionState {
        let next = state.advance();
        self.enter(ctx, entry, next);
        next
    }

    /// Advance past a resource state, reporting it only if the resource was written
    fn step_if_saved(
        &self,
        ctx: &AcquisitionContext,
        entry: &ListingEntry,
        state: AcquisitionState,
        outcome: &ResourceOutcome,
    ) -> AcquisitionState {
        if outcome.is_saved() {
            return self.step(ctx, entry, state);
        }
        let next = state.advance();
        debug!(title = %entry.title(), state = %next, "resource not written, state not reported");
        next
    }

    fn enter(&self, ctx: &AcquisitionContext, entry: &ListingEntry, state: AcquisitionState) {
        debug!(title = %entry.title(), %state, "acquisition state");
        self.reporter.report(ProgressEvent::EpisodeState {
            slot: ctx.slot,
            episode_title: entry.title().to_string(),
            state,
        });
    }

    fn finish_resource(
        &self,
        ctx: &AcquisitionContext,
        entry: &ListingEntry,
        kind: ResourceKind,
        outcome: &ResourceOutcome,
    ) {
        match outcome {
            ResourceOutcome::Saved(path) => {
                info!(title = %entry.title(), %kind, path = %path.display(), "resource saved");
                self.reporter.report(ProgressEvent::ResourceCompleted {
                    slot: ctx.slot,
                    episode_title: entry.title().to_string(),
                    kind,
                });
            }
            ResourceOutcome::Skipped => {
                debug!(title = %entry.title(), %kind, "resource not selected");
            }
            ResourceOutcome::Failed(e) => {
                error!(title = %entry.title(), %kind, error = %e, "resource failed");
                self.reporter.report(ProgressEvent::ResourceFailed {
                    slot: ctx.slot,
                    episode_title: entry.title().to_string(),
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Pick the storage directory, or fall back
    ///
    /// An explicit save directory must already exist. The dated archive
    /// directory is created on demand.
    async fn prepare_dir(&self, publish_date: NaiveDate) -> (PathBuf, bool) {
        if let Some(dir) = &self.options.save_dir {
            let is_dir = tokio::fs::metadata(dir)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if is_dir {
                return (dir.clone(), false);
            }
            let fallback = self.fallback_dir().await;
            warn!(
                path = %dir.display(),
                fallback = %fallback.display(),
                "save directory does not exist, using fallback"
            );
            return (fallback, true);
        }

        let dir = storage_dir(&self.options.output_root, publish_date);
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => (dir, false),
            Err(e) => {
                let fallback = self.fallback_dir().await;
                warn!(
                    path = %dir.display(),
                    fallback = %fallback.display(),
                    error = %e,
                    "cannot create storage directory, using fallback"
                );
                (fallback, true)
            }
        }
    }

    async fn fallback_dir(&self) -> PathBuf {
        match &self.options.fallback_dir {
            Some(dir) => {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    warn!(path = %dir.display(), error = %e, "cannot create fallback directory");
                }
                dir.clone()
            }
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    async fn write_text(
        &self,
        entry: &ListingEntry,
        page: &EpisodePage,
        files: &EpisodeFiles,
    ) -> Result<PathBuf, ResourceError> {
        let transcript =
            render_transcript(entry.url(), entry.title(), &self.options.source_credit, page);
        write_file(&files.text, &transcript).await?;
        Ok(files.text.clone())
    }

    /// Caption metadata is written even when the image itself is missing
    async fn write_image(
        &self,
        entry: &ListingEntry,
        page: &EpisodePage,
        files: &EpisodeFiles,
    ) -> Result<PathBuf, ResourceError> {
        let image_url = page
            .image_srcset
            .as_deref()
            .and_then(pick_srcset_url)
            .and_then(|link| resolve_link(entry.url(), link));

        let info = render_picture_info(
            image_url.as_deref(),
            page.image_caption.as_deref(),
            page.image_credit.as_deref(),
        );
        write_file(&files.picture_info, &info).await?;
        if self.options.info_only {
            return Ok(files.picture_info.clone());
        }

        let image_url = image_url.ok_or(ResourceError::Missing("cover image"))?;
        self.fetcher
            .download_to(&image_url, &files.picture, |_, _| {})
            .await?;
        Ok(files.picture.clone())
    }

    async fn write_audio(
        &self,
        entry: &ListingEntry,
        ctx: &AcquisitionContext,
        files: &EpisodeFiles,
    ) -> Result<PathBuf, ResourceError> {
        let audio_url = match &self.options.audio_url {
            Some(url) => {
                info!(title = %entry.title(), url = %url, "using supplied audio source");
                url.clone()
            }
            None => {
                let timeout = self.options.audio_timeout;
                let url = tokio::time::timeout(timeout, self.resolver.resolve(entry.url()))
                    .await
                    .map_err(|_| ResolutionError::Timeout {
                        page_url: entry.url().to_string(),
                        after: timeout,
                    })??;
                info!(title = %entry.title(), url = %url, "audio source resolved");
                url
            }
        };

        write_file(&files.audio_info, &audio_url).await?;
        if self.options.info_only {
            return Ok(files.audio_info.clone());
        }

        let reporter = self.reporter.clone();
        let slot = ctx.slot;
        let title = entry.title().to_string();
        self.fetcher
            .download_to(&audio_url, &files.audio, move |bytes_downloaded, total_bytes| {
                reporter.report(ProgressEvent::DownloadProgress {
                    slot,
                    episode_title: title.clone(),
                    bytes_downloaded,
                    total_bytes,
                });
            })
            .await?;
        Ok(files.audio.clone())
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), ResourceError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::listing::{SelectorExtractor, SiteSelectors};
    use crate::progress::{NoopReporter, RecordingReporter};
    use crate::testing::{MockHttpClient, StaticResolver, episode_html, fast_fetcher};

    const PAGE: &str = "https://example.com/podcasts/article/sharks";
    const IMAGE: &str = "https://images.example.com/sharks.jpg";
    const AUDIO: &str = "https://cdn.example.com/sharks.mp3";

    fn entry() -> ListingEntry {
        ListingEntry::new("Sharks", PAGE)
    }

    fn options(root: &Path) -> AcquireOptions {
        AcquireOptions {
            output_root: root.join("archive"),
            fallback_dir: Some(root.join("fallback")),
            ..Default::default()
        }
    }

    fn acquirer(
        client: MockHttpClient,
        resolver: Arc<dyn AssetResolver>,
        options: AcquireOptions,
        reporter: SharedProgressReporter,
    ) -> EpisodeAcquirer<MockHttpClient> {
        let extractor = Arc::new(SelectorExtractor::new(&SiteSelectors::default()).unwrap());
        EpisodeAcquirer::new(fast_fetcher(client), extractor, resolver, options, reporter)
    }

    fn full_client(publish_date: Option<&str>) -> MockHttpClient {
        MockHttpClient::new()
            .with_route(PAGE, 200, episode_html(publish_date, Some(IMAGE)))
            .with_route(IMAGE, 200, b"jpeg bytes".to_vec())
            .with_route(AUDIO, 200, b"mp3 bytes".to_vec())
    }

    #[test]
    fn state_machine_advances_to_complete() {
        let mut state = AcquisitionState::Init;
        let mut seen = vec![state];
        while !state.is_terminal() {
            state = state.advance();
            seen.push(state);
        }

        assert_eq!(
            seen,
            vec![
                AcquisitionState::Init,
                AcquisitionState::UrlFetched,
                AcquisitionState::DateResolved,
                AcquisitionState::PathResolved,
                AcquisitionState::TextDone,
                AcquisitionState::ImageDone,
                AcquisitionState::AudioDone,
                AcquisitionState::Complete,
            ]
        );
        assert_eq!(AcquisitionState::Failed.advance(), AcquisitionState::Failed);
    }

    #[tokio::test]
    async fn acquires_all_resources_into_dated_directory() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options(dir.path()),
            NoopReporter::shared(),
        );

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert!(!report.date_recovered);
        assert!(!report.path_recovered);

        let month = dir.path().join("archive/2023/03");
        assert_eq!(report.save_dir, month);

        let transcript = std::fs::read_to_string(month.join("Sharks.txt")).unwrap();
        assert!(transcript.starts_with(&format!("{}\n\nSharks\n\nNat Geo\n\n", PAGE)));
        assert!(transcript.contains("[Preface]\nIntro paragraph."));
        assert!(transcript.contains("\n\nAMY:\nHello there.\nIt's a great day.\n"));
        assert!(!transcript.contains("Not part of the transcript."));

        let picture_info = std::fs::read_to_string(month.join("Sharks_picture_info.txt")).unwrap();
        assert_eq!(
            picture_info,
            format!(
                "{}\n\n[Picture]\n\nA shark in the deep.\n\nPhotograph by Someone\n\n",
                IMAGE
            )
        );
        assert_eq!(std::fs::read(month.join("Sharks.jpg")).unwrap(), b"jpeg bytes");
        assert_eq!(
            std::fs::read_to_string(month.join("Sharks_audio_info.txt")).unwrap(),
            AUDIO
        );
        assert_eq!(std::fs::read(month.join("Sharks.mp3")).unwrap(), b"mp3 bytes");
    }

    #[tokio::test]
    async fn malformed_date_falls_back_to_today() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let acquirer = acquirer(
            full_client(Some("Published sometime last spring")),
            resolver,
            options(dir.path()),
            NoopReporter::shared(),
        );

        let before = Local::now().date_naive();
        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();
        let after = Local::now().date_naive();

        assert!(report.date_recovered);
        assert!(report.publish_date == before || report.publish_date == after);
        assert_eq!(
            report.save_dir,
            storage_dir(&dir.path().join("archive"), report.publish_date)
        );
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn uncreatable_directory_uses_fallback() {
        let dir = tempdir().unwrap();
        let mut options = options(dir.path());
        // A regular file where the archive root should be
        std::fs::write(&options.output_root, b"not a directory").unwrap();
        options.html_cache_dir = Some(dir.path().join("html"));

        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options,
            NoopReporter::shared(),
        );

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        let fallback = dir.path().join("fallback");
        assert!(report.path_recovered);
        assert_eq!(report.save_dir, fallback);
        assert!(report.is_complete());
        assert!(fallback.join("Sharks.txt").exists());
        assert!(fallback.join("Sharks.mp3").exists());
        assert!(dir.path().join("html/Sharks.html").exists());
    }

    #[tokio::test]
    async fn audio_resolution_failure_keeps_text_and_image() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(StaticResolver::new().with_timeout(PAGE));
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options(dir.path()),
            NoopReporter::shared(),
        );

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(report.text.is_saved());
        assert!(report.image.is_saved());
        assert!(matches!(
            report.audio,
            ResourceOutcome::Failed(AcquisitionError::Audio(ResourceError::Resolution(
                ResolutionError::Timeout { .. }
            )))
        ));
        assert!(!report.is_complete());
        assert_eq!(report.failures().count(), 1);
        assert!(!dir.path().join("archive/2023/03/Sharks_audio_info.txt").exists());
    }

    struct HangingResolver;

    #[async_trait]
    impl AssetResolver for HangingResolver {
        async fn resolve(&self, _page_url: &str) -> Result<String, ResolutionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn audio_resolution_is_bounded_by_timeout() {
        let dir = tempdir().unwrap();
        let mut options = options(dir.path());
        options.audio_timeout = Duration::from_millis(20);

        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            Arc::new(HangingResolver),
            options,
            NoopReporter::shared(),
        );

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(report.text.is_saved());
        assert!(matches!(
            report.audio,
            ResourceOutcome::Failed(AcquisitionError::Audio(ResourceError::Resolution(
                ResolutionError::Timeout { .. }
            )))
        ));
    }

    #[tokio::test]
    async fn missing_image_still_writes_caption() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new()
            .with_route(PAGE, 200, episode_html(Some("Published March 20, 2023"), None))
            .with_route(AUDIO, 200, b"mp3 bytes".to_vec());
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let acquirer = acquirer(client, resolver, options(dir.path()), NoopReporter::shared());

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(matches!(
            report.image,
            ResourceOutcome::Failed(AcquisitionError::Image(ResourceError::Missing(_)))
        ));
        assert!(report.audio.is_saved());
        let info = std::fs::read_to_string(
            dir.path().join("archive/2023/03/Sharks_picture_info.txt"),
        )
        .unwrap();
        assert!(info.starts_with("None\n\n[Picture]"));
    }

    #[tokio::test]
    async fn page_fetch_failure_attempts_no_resources() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::new();
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let reporter = Arc::new(RecordingReporter::default());
        let acquirer = acquirer(
            client.clone(),
            resolver.clone(),
            options(dir.path()),
            reporter.clone(),
        );

        let err = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 2, .. }));
        assert_eq!(client.requests(), vec![PAGE.to_string(), PAGE.to_string()]);
        assert!(resolver.calls().is_empty());
        assert!(!dir.path().join("archive").exists());
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            ProgressEvent::EpisodeState {
                state: AcquisitionState::Failed,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn reports_states_in_order() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let reporter = Arc::new(RecordingReporter::default());
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options(dir.path()),
            reporter.clone(),
        );

        acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        let states = recorded_states(&reporter);
        assert_eq!(states.first(), Some(&AcquisitionState::UrlFetched));
        assert_eq!(states.last(), Some(&AcquisitionState::Complete));
        assert_eq!(states.len(), 7);
    }
    fn recorded_states(reporter: &RecordingReporter) -> Vec<AcquisitionState> {
        reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::EpisodeState { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn failed_resource_state_is_not_reported() {
        let dir = tempdir().unwrap();
        let resolver = Arc::new(StaticResolver::new().with_timeout(PAGE));
        let reporter = Arc::new(RecordingReporter::default());
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options(dir.path()),
            reporter.clone(),
        );

        acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        let states = recorded_states(&reporter);
        assert!(states.contains(&AcquisitionState::TextDone));
        assert!(states.contains(&AcquisitionState::ImageDone));
        assert!(!states.contains(&AcquisitionState::AudioDone));
        assert_eq!(states.last(), Some(&AcquisitionState::Complete));
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            ProgressEvent::EpisodeFinished {
                complete: false,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn existing_save_dir_replaces_dated_directory() {
        let dir = tempdir().unwrap();
        let save_dir = dir.path().join("picked");
        std::fs::create_dir(&save_dir).unwrap();
        let mut options = options(dir.path());
        options.save_dir = Some(save_dir.clone());

        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options,
            NoopReporter::shared(),
        );

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert_eq!(report.save_dir, save_dir);
        assert!(!report.path_recovered);
        assert!(save_dir.join("Sharks.txt").exists());
        assert!(save_dir.join("Sharks.mp3").exists());
        assert!(!dir.path().join("archive").exists());
    }

    #[tokio::test]
    async fn missing_save_dir_uses_fallback_without_creating_it() {
        let dir = tempdir().unwrap();
        let save_dir = dir.path().join("not-there");
        let mut options = options(dir.path());
        options.save_dir = Some(save_dir.clone());

        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let acquirer = acquirer(
            full_client(Some("Published March 20, 2023")),
            resolver,
            options,
            NoopReporter::shared(),
        );

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(report.path_recovered);
        assert_eq!(report.save_dir, dir.path().join("fallback"));
        assert!(!save_dir.exists());
        assert!(dir.path().join("fallback/Sharks.txt").exists());
    }

    #[tokio::test]
    async fn supplied_audio_url_skips_resolution() {
        let dir = tempdir().unwrap();
        let supplied = "https://mirror.example.com/sharks-hq.mp3";
        let client = full_client(Some("Published March 20, 2023"))
            .with_route(supplied, 200, b"hq bytes".to_vec());
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let mut options = options(dir.path());
        options.audio_url = Some(supplied.to_string());

        let acquirer = acquirer(client.clone(), resolver.clone(), options, NoopReporter::shared());

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert!(resolver.calls().is_empty());
        assert_eq!(client.requests_for(AUDIO), 0);
        let month = dir.path().join("archive/2023/03");
        assert_eq!(
            std::fs::read_to_string(month.join("Sharks_audio_info.txt")).unwrap(),
            supplied
        );
        assert_eq!(std::fs::read(month.join("Sharks.mp3")).unwrap(), b"hq bytes");
    }

    #[tokio::test]
    async fn unselected_resources_are_skipped() {
        let dir = tempdir().unwrap();
        let client = full_client(Some("Published March 20, 2023"));
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let reporter = Arc::new(RecordingReporter::default());
        let mut options = options(dir.path());
        options.resources = ResourceSet::only(&[ResourceKind::Text]);

        let acquirer = acquirer(client.clone(), resolver.clone(), options, reporter.clone());

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        assert!(report.text.is_saved());
        assert!(matches!(report.image, ResourceOutcome::Skipped));
        assert!(matches!(report.audio, ResourceOutcome::Skipped));
        assert!(!report.has_failures());
        assert!(!report.is_complete());

        let month = dir.path().join("archive/2023/03");
        assert!(month.join("Sharks.txt").exists());
        assert!(!month.join("Sharks_picture_info.txt").exists());
        assert!(!month.join("Sharks_audio_info.txt").exists());
        assert_eq!(client.requests(), vec![PAGE.to_string()]);
        assert!(resolver.calls().is_empty());
        assert!(!recorded_states(&reporter).contains(&AcquisitionState::ImageDone));
    }

    #[tokio::test]
    async fn info_only_writes_metadata_without_media() {
        let dir = tempdir().unwrap();
        let client = full_client(Some("Published March 20, 2023"));
        let resolver = Arc::new(StaticResolver::new().with_media(PAGE, AUDIO));
        let mut options = options(dir.path());
        options.resources = ResourceSet::only(&[ResourceKind::Image, ResourceKind::Audio]);
        options.info_only = true;

        let acquirer = acquirer(client.clone(), resolver, options, NoopReporter::shared());

        let report = acquirer
            .acquire(&entry(), &AcquisitionContext::single())
            .await
            .unwrap();

        let month = dir.path().join("archive/2023/03");
        assert_eq!(
            report.image.path(),
            Some(month.join("Sharks_picture_info.txt").as_path())
        );
        assert_eq!(
            report.audio.path(),
            Some(month.join("Sharks_audio_info.txt").as_path())
        );
        assert_eq!(
            std::fs::read_to_string(month.join("Sharks_audio_info.txt")).unwrap(),
            AUDIO
        );
        assert!(!month.join("Sharks.jpg").exists());
        assert!(!month.join("Sharks.mp3").exists());
        assert_eq!(client.requests_for(IMAGE), 0);
        assert_eq!(client.requests_for(AUDIO), 0);
    }

    #[test]
    fn resource_set_selects_kinds() {
        let set = ResourceSet::only(&[ResourceKind::Audio]);
        assert!(set.contains(ResourceKind::Audio));
        assert!(!set.contains(ResourceKind::Text));
        assert!(!set.contains(ResourceKind::Image));
        assert_eq!(ResourceSet::default(), ResourceSet::all());
    }
}
