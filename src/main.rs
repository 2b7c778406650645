// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use podcrawl::{
    AcquireOptions, DownloadStatus, EmbedAssetResolver, EpisodeAcquirer, EpisodeStore,
    ListingEntry, ListingScanner, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient,
    ResourceFetcher, ResourceKind, ResourceSet, SelectorExtractor, SharedProgressReporter,
    SiteSelectors, SyncController, SyncMode, SyncOptions, SyncSummary, TracingReporter,
};

// Emoji with fallback for terminals without Unicode support
static SPIDER: Emoji<'_, '_> = Emoji("🕷️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static PARTIAL: Emoji<'_, '_> = Emoji("⚠️  ", "[?] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

const DEFAULT_LISTING: &str = "https://www.nationalgeographic.com/podcasts/overheard/";
const USER_AGENT: &str = concat!("podcrawl/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Crawl a podcast site into a local archive of transcripts, covers and audio
#[derive(Parser, Debug)]
#[command(name = "podcrawl")]
#[command(about = "Crawl a podcast site into a local archive of transcripts, covers and audio")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Listing page enumerating the episodes
    #[arg(long, env = "PODCRAWL_LISTING", default_value = DEFAULT_LISTING, global = true)]
    listing: String,

    /// Directory holding the episode databases
    #[arg(long, env = "PODCRAWL_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Database name
    #[arg(long, env = "PODCRAWL_DATABASE", default_value = "natgeo", global = true)]
    database: String,

    /// Episode table name
    #[arg(long, env = "PODCRAWL_TABLE", default_value = "overheard", global = true)]
    table: String,

    /// Root of the {year}/{month} archive tree
    #[arg(short, long, env = "PODCRAWL_OUTPUT", default_value = "Overheard", global = true)]
    output: PathBuf,

    /// Keep raw HTML of every fetched page in this directory
    #[arg(long, env = "PODCRAWL_HTML_CACHE", default_value = "HTMLs", global = true)]
    html_cache: PathBuf,

    /// Maximum number of episodes acquired at once
    #[arg(short = 'c', long, env = "PODCRAWL_CONCURRENT", default_value = "1", global = true)]
    concurrent: usize,

    /// Seconds to wait for an episode's audio source to be resolved
    #[arg(long, env = "PODCRAWL_AUDIO_TIMEOUT", default_value = "60", global = true)]
    audio_timeout: u64,

    /// Quiet mode - suppress progress output
    #[arg(short, long, env = "PODCRAWL_QUIET", global = true)]
    quiet: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, env = "PODCRAWL_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Print the result as JSON on stdout
    #[arg(long, env = "PODCRAWL_JSON", global = true)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Rebuild the episode store and acquire every listed episode
    Full,
    /// Acquire episodes not yet in the store and retry unfinished ones
    Update,
    /// Show the episodes recorded in the store
    Status,
    /// Acquire the given episodes without touching the store
    #[command(alias = "acquire")]
    Get(GetArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct GetArgs {
    /// Episodes as TITLE=URL pairs
    #[arg(required = true, value_name = "TITLE=URL")]
    episodes: Vec<ListingEntry>,

    /// Existing directory to save into instead of the dated archive tree
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Audio source to download instead of resolving it (one episode only)
    #[arg(long)]
    audio_url: Option<String>,

    /// Acquire only these resources
    #[arg(long, value_enum, value_delimiter = ',')]
    only: Vec<ResourceArg>,

    /// Write picture and audio info files without downloading the media
    #[arg(long)]
    info_only: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceArg {
    Text,
    Image,
    Audio,
}

impl From<ResourceArg> for ResourceKind {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Text => Self::Text,
            ResourceArg::Image => Self::Image,
            ResourceArg::Audio => Self::Audio,
        }
    }
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Result<Self> {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .context("Invalid progress template")?;

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Ok(Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        })
    }

    fn get_or_create_bar(&self, slot: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = bars.get(&slot) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(&format!(
            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        )) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bars.insert(slot, bar.clone());
        bar
    }

    fn finish_bar(&self, slot: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = bars.remove(&slot) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ScanningListing { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Scanning listing: {}", url.cyan()));
            }

            ProgressEvent::ListingScanned { total_entries, .. } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} episodes listed",
                    total_entries.to_string().cyan()
                ));
            }

            ProgressEvent::SyncPlanReady {
                mode,
                total_episodes,
                new_episodes,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} sync • {} episodes listed, {} to acquire",
                    mode.to_string().bold().green(),
                    total_episodes.to_string().cyan(),
                    new_episodes.to_string().yellow()
                ));
            }

            ProgressEvent::NothingToSync { total_episodes } => {
                self.main_bar.set_message(format!(
                    "{SUCCESS}All {} listed episodes are already recorded",
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::EpisodesRecorded { .. } | ProgressEvent::EpisodeState { .. } => {}

            ProgressEvent::EpisodeStarting {
                slot,
                episode_title,
                episode_index,
                total_to_acquire,
            } => {
                let bar = self.get_or_create_bar(slot);
                bar.set_length(0);
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_acquire.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::ResourceCompleted { .. } => {}

            ProgressEvent::ResourceFailed {
                episode_title,
                kind,
                error,
                ..
            } => {
                self.multi
                    .println(format!(
                        "  {FAILURE}{} {} - {}",
                        truncate_title(&episode_title, 30).yellow(),
                        kind_label(kind),
                        error.dimmed()
                    ))
                    .ok();
            }

            ProgressEvent::DownloadProgress {
                slot,
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(slot);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::EpisodeFinished {
                slot,
                episode_title,
                complete,
            } => {
                let line = if complete {
                    format!("  {SUCCESS}{}", truncate_title(&episode_title, 40).green())
                } else {
                    format!("  {PARTIAL}{}", truncate_title(&episode_title, 40).yellow())
                };
                self.multi.println(line).ok();
                self.finish_bar(slot);
            }

            ProgressEvent::EpisodeFailed {
                slot,
                episode_title,
                error,
            } => {
                let bar = self.get_or_create_bar(slot);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
                self.finish_bar(slot);
            }

            ProgressEvent::SyncCompleted {
                complete_count,
                partial_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} complete, {} partial, {} failed",
                    "Sync complete:".bold().green(),
                    complete_count.to_string().green().bold(),
                    partial_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn kind_label(kind: ResourceKind) -> colored::ColoredString {
    kind.to_string().red()
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Install the tracing subscriber: stderr plus an optional log file
///
/// `RUST_LOG` wins over the level derived from the flags.
fn init_logging(args: &Args, interactive: bool) -> Result<Option<PathBuf>> {
    let level = match (args.quiet, args.verbose) {
        (_, 2..) => "trace",
        (_, 1) => "debug",
        (true, 0) => "error",
        (false, 0) if interactive => "warn",
        (false, 0) => "info",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)))
        .context("Failed to create tracing filter")?;

    let (file_layer, log_path) = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(format!(
                "podcrawl-{}.log",
                chrono::Local::now().format("%Y%m%d-%H%M%S")
            ));
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(log_path)
}

/// Acquisition options from the global flags and, for `get`, its own flags
fn acquire_options(args: &Args, get: Option<&GetArgs>) -> Result<AcquireOptions> {
    let mut options = AcquireOptions {
        output_root: args.output.clone(),
        html_cache_dir: Some(args.html_cache.clone()),
        audio_timeout: Duration::from_secs(args.audio_timeout),
        ..Default::default()
    };

    let Some(get) = get else {
        return Ok(options);
    };

    if let Some(audio_url) = &get.audio_url {
        if get.episodes.len() != 1 {
            bail!("--audio-url needs exactly one episode, got {}", get.episodes.len());
        }
        let parsed = url::Url::parse(audio_url)
            .with_context(|| format!("Invalid audio URL: {}", audio_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("Audio URL must be http or https: {}", audio_url);
        }
        options.audio_url = Some(audio_url.clone());
    }

    if !get.only.is_empty() {
        let kinds: Vec<ResourceKind> = get.only.iter().copied().map(Into::into).collect();
        options.resources = ResourceSet::only(&kinds);
    }
    options.save_dir = get.save_dir.clone();
    options.info_only = get.info_only;

    Ok(options)
}

fn build_controller(
    args: &Args,
    options: AcquireOptions,
    reporter: SharedProgressReporter,
) -> Result<SyncController<ReqwestClient>> {
    let client = ReqwestClient::with_user_agent(USER_AGENT, CONNECT_TIMEOUT)
        .context("Failed to build HTTP client")?;
    let fetcher = ResourceFetcher::new(client);

    let extractor = Arc::new(
        SelectorExtractor::new(&SiteSelectors::default()).context("Invalid site selectors")?,
    );
    let resolver = Arc::new(
        EmbedAssetResolver::new(fetcher.clone()).context("Invalid media selectors")?,
    );

    let scanner = ListingScanner::new(
        fetcher.clone(),
        extractor.clone(),
        Some(args.html_cache.clone()),
    );
    let acquirer = EpisodeAcquirer::new(fetcher, extractor, resolver, options, reporter.clone());

    Ok(SyncController::new(
        scanner,
        acquirer,
        EpisodeStore::new(&args.data_dir),
        SyncOptions {
            database: args.database.clone(),
            table: args.table.clone(),
            max_concurrent: args.concurrent,
        },
        reporter,
    ))
}

async fn run_sync(
    args: &Args,
    mode: SyncMode,
    reporter: SharedProgressReporter,
) -> Result<SyncSummary> {
    let controller = build_controller(args, acquire_options(args, None)?, reporter)?;

    let result = match mode {
        SyncMode::Full => controller.full_sync(&args.listing).await,
        SyncMode::Incremental => controller.incremental_sync(&args.listing).await,
        SyncMode::Direct => bail!("direct acquisition takes episodes, not a listing"),
    };
    let summary =
        result.with_context(|| format!("Failed to run {} sync of {}", mode, args.listing))?;

    Ok(summary)
}

async fn run_get(
    args: &Args,
    get: &GetArgs,
    reporter: SharedProgressReporter,
) -> Result<SyncSummary> {
    let options = acquire_options(args, Some(get))?;
    let controller = build_controller(args, options, reporter)?;
    Ok(controller.acquire_entries(get.episodes.clone()).await)
}

/// Print the banner and pick the progress reporter
fn start(args: &Args, interactive: bool) -> Result<SharedProgressReporter> {
    if interactive {
        println!(
            "\n{}{} {}\n",
            SPIDER,
            "podcrawl".bold().magenta(),
            "- Podcast Archiver".dimmed()
        );
    }

    let reporter: SharedProgressReporter = if args.quiet || args.json {
        NoopReporter::shared()
    } else if interactive {
        Arc::new(IndicatifReporter::new()?)
    } else {
        TracingReporter::shared()
    };
    Ok(reporter)
}

fn print_summary(args: &Args, summary: &SyncSummary) {
    if !summary.failed_episodes.is_empty() {
        println!("\n{}", "Incomplete episodes:".red().bold());
        for failed in &summary.failed_episodes {
            println!(
                "  {}{} - {}",
                CROSS,
                failed.title.yellow(),
                failed.error.dimmed()
            );
        }
    }

    let output = match &args.command {
        Command::Get(GetArgs {
            save_dir: Some(dir),
            ..
        }) => dir,
        _ => &args.output,
    };
    println!("\n{FOLDER}Output: {}\n", output.display().to_string().cyan());
}

fn show_status(args: &Args) -> Result<()> {
    let store = EpisodeStore::new(&args.data_dir);
    if !store.table_exists(&args.database, &args.table)? {
        if args.json {
            println!("[]");
        } else {
            println!(
                "No table '{}' in database '{}' under {}",
                args.table,
                args.database,
                args.data_dir.display()
            );
        }
        return Ok(());
    }

    let episodes = store
        .episodes(&args.database, &args.table)
        .context("Failed to read stored episodes")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&episodes)?);
        return Ok(());
    }

    let downloaded = episodes
        .iter()
        .filter(|e| e.status == DownloadStatus::Downloaded)
        .count();
    for episode in &episodes {
        let marker = match episode.status {
            DownloadStatus::Downloaded => format!("{SUCCESS}"),
            DownloadStatus::NotDownloaded => format!("{CROSS}"),
        };
        println!(
            "{}{} {}",
            marker,
            episode.title,
            episode.updated_time.as_deref().unwrap_or("").dimmed()
        );
    }
    println!(
        "\n{} episodes, {} downloaded",
        episodes.len().to_string().cyan(),
        downloaded.to_string().green()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let interactive = !args.quiet && !args.json && std::io::stderr().is_terminal();
    if let Some(path) = init_logging(&args, interactive)? {
        tracing::info!(path = %path.display(), "writing log file");
    }

    let summary = match &args.command {
        Command::Status => return show_status(&args),
        Command::Full => run_sync(&args, SyncMode::Full, start(&args, interactive)?).await?,
        Command::Update => {
            run_sync(&args, SyncMode::Incremental, start(&args, interactive)?).await?
        }
        Command::Get(get) => run_get(&args, get, start(&args, interactive)?).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !args.quiet {
        print_summary(&args, &summary);
    }

    if summary.failed > 0 && summary.complete == 0 && summary.partial == 0 {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("podcrawl").chain(argv.iter().copied())).unwrap()
    }

    fn get_args(args: &Args) -> &GetArgs {
        match &args.command {
            Command::Get(get) => get,
            other => panic!("expected get, got {:?}", other),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn html_cache_defaults_to_htmls() {
        let args = parse(&["full"]);
        assert_eq!(args.html_cache, PathBuf::from("HTMLs"));

        let options = acquire_options(&args, None).unwrap();
        assert_eq!(options.html_cache_dir, Some(PathBuf::from("HTMLs")));
    }

    #[test]
    fn get_takes_title_url_pairs_and_options() {
        let args = parse(&[
            "get",
            "Ep: One=https://example.com/a",
            "--save-dir",
            "picked",
            "--audio-url",
            "https://cdn.example.com/a.mp3",
            "--only",
            "text,audio",
        ]);
        let get = get_args(&args);
        assert_eq!(get.episodes[0].title(), "Ep_ One");
        assert_eq!(get.episodes[0].url(), "https://example.com/a");

        let options = acquire_options(&args, Some(get)).unwrap();
        assert_eq!(options.save_dir, Some(PathBuf::from("picked")));
        assert_eq!(options.audio_url.as_deref(), Some("https://cdn.example.com/a.mp3"));
        assert_eq!(
            options.resources,
            ResourceSet::only(&[ResourceKind::Text, ResourceKind::Audio])
        );
        assert!(!options.info_only);
    }

    #[test]
    fn acquire_is_an_alias_for_get() {
        let args = parse(&["acquire", "Ep=https://example.com/a", "--info-only"]);
        let get = get_args(&args);
        let options = acquire_options(&args, Some(get)).unwrap();
        assert!(options.info_only);
        assert_eq!(options.resources, ResourceSet::all());
    }

    #[test]
    fn get_rejects_malformed_episodes() {
        assert!(Args::try_parse_from(["podcrawl", "get", "no separator"]).is_err());
        assert!(Args::try_parse_from(["podcrawl", "get"]).is_err());
    }

    #[test]
    fn audio_url_needs_a_single_episode() {
        let args = parse(&[
            "get",
            "A=https://example.com/a",
            "B=https://example.com/b",
            "--audio-url",
            "https://cdn.example.com/a.mp3",
        ]);
        assert!(acquire_options(&args, Some(get_args(&args))).is_err());

        let args = parse(&["get", "A=https://example.com/a", "--audio-url", "ftp://x/a.mp3"]);
        assert!(acquire_options(&args, Some(get_args(&args))).is_err());
    }
}
