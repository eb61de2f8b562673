use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use questbind::api::{ChunkSource, FictionLiveClient, StoryRef};
use questbind::book::{download_sections, partition_story, ProgressSink, SectionKind};
use questbind::config::AppConfig;
use questbind::epub;
use questbind::render::{RenderContext, RenderOptions, WinnerPolicy};
use questbind::Error;

#[derive(Parser)]
#[command(name = "questbind")]
#[command(about = "fiction.live story downloader and EPUB binder", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download stories and bind each one into an EPUB
    Get {
        /// Story URLs, https://fiction.live/stories/<slug>/<id>
        #[arg(required = true)]
        urls: Vec<String>,
        /// Output directory for the books
        #[arg(long)]
        out: Option<PathBuf>,
        /// Replace an existing file instead of suffixing the new one
        #[arg(long)]
        overwrite: bool,
        /// Minimum gap between API requests, in milliseconds
        #[arg(long)]
        delay: Option<u64>,
        /// Include reader post bodies, not just their dice rolls
        #[arg(long)]
        include_reader_posts: bool,
        /// List spoiler tags on the title page and in the package metadata
        #[arg(long)]
        include_spoiler_tags: bool,
        /// How the winner rows of a closed vote are chosen
        #[arg(long, value_enum)]
        winner_policy: Option<WinnerPolicy>,
    },
    /// Rewrite malformed URL identifiers in existing books
    Fix {
        /// An .epub file, or a directory to scan recursively
        path: PathBuf,
    },
}

struct GetOptions {
    out_dir: PathBuf,
    overwrite: bool,
    include_spoiler_tags: bool,
    render: RenderOptions,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load();

    match cli.command {
        Commands::Get {
            urls,
            out,
            overwrite,
            delay,
            include_reader_posts,
            include_spoiler_tags,
            winner_policy,
        } => {
            let delay =
                Duration::from_millis(delay.unwrap_or(config.download.request_delay_ms));
            let options = GetOptions {
                out_dir: out.unwrap_or_else(|| config.out_dir()),
                overwrite: overwrite || config.output.overwrite,
                include_spoiler_tags: include_spoiler_tags
                    || config.render.include_spoiler_tags,
                render: RenderOptions {
                    include_reader_posts: include_reader_posts
                        || config.render.include_reader_posts,
                    winner_policy: winner_policy.unwrap_or(config.render.winner_policy),
                },
            };
            run_get(&urls, delay, &options).await
        }
        Commands::Fix { path } => run_fix(&path),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("questbind=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_get(urls: &[String], delay: Duration, options: &GetOptions) -> ExitCode {
    let client = match FictionLiveClient::new(delay) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut had_failures = false;

    // Each story is converted independently; one bad URL or vanished story
    // must not take the rest of the batch down with it.
    for url in urls {
        match bind_story(&client, url, options).await {
            Ok(path) => {
                println!(
                    "EPUB file written to {}\n",
                    style(path.display()).green()
                );
            }
            Err(e @ (Error::StoryNotFound { .. } | Error::InvalidStoryUrl(_))) => {
                warn!(%url, "story skipped");
                eprintln!("{}", style(&e).yellow());
                had_failures = true;
            }
            Err(e) => {
                error!(%url, error = %e, "conversion failed");
                eprintln!("{}", style(format!("Error: {e}")).red());
                had_failures = true;
            }
        }
    }

    if had_failures {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn bind_story(
    client: &FictionLiveClient,
    url: &str,
    options: &GetOptions,
) -> questbind::Result<PathBuf> {
    let story_ref = StoryRef::parse(url)?;
    println!("Downloading story metadata...");
    let story = client.story_metadata(&story_ref).await?;
    println!(
        "\n{} by {}",
        style(story.display_title()).cyan().bold(),
        story.author_name()
    );

    let map = partition_story(&story);
    let ctx = RenderContext::new(story.achievement_table(), options.render);
    let progress = ConsoleProgress::default();
    let sections = download_sections(client, &story, &map, &ctx, &progress).await?;

    std::fs::create_dir_all(&options.out_dir)?;
    let file_name = epub::book_filename(story.display_title());
    let path = epub::unique_path(&options.out_dir, &file_name, options.overwrite);
    println!("\nWriting EPUB file...");
    epub::write_book(&story, &map, &sections, options.include_spoiler_tags, &path)?;
    Ok(path)
}

fn run_fix(path: &Path) -> ExitCode {
    match epub::fix_path(path) {
        Ok(outcomes) => {
            let fixed = outcomes
                .iter()
                .filter(|(_, outcome)| *outcome == epub::FixOutcome::Fixed)
                .count();
            println!("{fixed} of {} books needed an identifier fix.", outcomes.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fix failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Console Progress
// ============================================================================

/// One reusable bar, reconfigured per section group.
struct ConsoleProgress {
    bar: ProgressBar,
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

fn group_label(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Chapter => "Chapters",
        SectionKind::Appendix => "Appendices",
        SectionKind::Route => "Routes",
    }
}

impl ProgressSink for ConsoleProgress {
    fn begin_group(&self, kind: SectionKind, total: usize) {
        println!("\nDownloading {}...", group_label(kind));
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | ETA: {eta}")
                .unwrap()
                .progress_chars("=>-"),
        );
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
    }

    fn section_done(&self, _kind: SectionKind, position: usize, total: usize) {
        self.bar.inc(1);
        if position == total {
            self.bar.finish_and_clear();
        }
    }
}
