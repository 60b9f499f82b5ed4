use crate::git::{resolve_range, GitRepo};
use crate::ingest::{ensure_store, IngestOptions, DEFAULT_BATCH_SIZE};
use crate::model::{ContributorFilter, DateWindow, MetricSelector};
use crate::render::{self, Format};
use crate::query::QueryService;
use crate::util::store_path;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repovis")]
#[command(about = "Build and query a per-path, per-contributor activity model of a git repository")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[arg(long, global = true, default_value = "info", help = "Log level (error, warn, info, debug, trace)")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Path to git repository")]
    pub repo: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory holding store files (default: <repo>/.repovis)")]
    pub cache: Option<PathBuf>,

    #[arg(long, global = true, help = "Only ingest commits from this date (RFC3339, YYYY-MM-DD, or 'N days ago')")]
    pub since: Option<String>,

    #[arg(long, global = true, help = "Only ingest commits up to this date (RFC3339, YYYY-MM-DD, or 'N days ago')")]
    pub until: Option<String>,
}

#[derive(Args, Clone, Copy)]
pub struct OutputArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,

    #[arg(long, help = "Output as NDJSON")]
    pub ndjson: bool,
}

impl OutputArgs {
    fn format(self) -> Format {
        if self.json {
            Format::Json
        } else if self.ndjson {
            Format::Ndjson
        } else {
            Format::Table
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the store, reusing an existing one unless --rebuild is given
    Build {
        #[arg(long, help = "Discard any existing store and rebuild from history")]
        rebuild: bool,

        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, help = "Commits processed between flushes")]
        batch_size: usize,

        #[clap(flatten)]
        output: OutputArgs,
    },
    /// File tree with metrics summed over a date window
    Tree {
        #[arg(long, help = "Window start (YYYY-MM-DD)")]
        start: Option<String>,

        #[arg(long, help = "Window end (YYYY-MM-DD)")]
        end: Option<String>,

        #[arg(long, help = "Comma-separated contributor ids to include")]
        contributors: Option<String>,

        #[arg(long, help = "Comma-separated contributor ids to exclude")]
        exclude_contributors: Option<String>,

        #[arg(long, help = "commit_count, lines_added, or lines_deleted")]
        metric: Option<String>,

        #[clap(flatten)]
        output: OutputArgs,
    },
    /// Commits per day
    Timeline {
        #[arg(long, help = "Window start (YYYY-MM-DD)")]
        start: Option<String>,

        #[arg(long, help = "Window end (YYYY-MM-DD)")]
        end: Option<String>,

        #[clap(flatten)]
        output: OutputArgs,
    },
    /// All contributors ordered by name
    Contributors {
        #[clap(flatten)]
        output: OutputArgs,
    },
    /// One node and its top contributors
    File {
        #[arg(help = "Node id")]
        id: i64,

        #[clap(flatten)]
        output: OutputArgs,
    },
    /// Facts recorded at build time
    Metadata {
        #[clap(flatten)]
        output: OutputArgs,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        let repo = GitRepo::open(self.common.repo.as_ref()).context("Failed to open git repository")?;
        let range = resolve_range(self.common.since.as_deref(), self.common.until.as_deref())
            .context("Failed to resolve date range")?;
        let target = store_path(self.common.cache.as_deref(), repo.path(), range.since, range.until);

        let open = || {
            QueryService::open(&target)
                .with_context(|| format!("No store for {}; run `repovis build` first", repo.path().display()))
        };

        match self.command {
            Commands::Build { rebuild, batch_size, output } => {
                let format = output.format();
                let options = IngestOptions {
                    batch_size,
                    range,
                    progress: format == Format::Table,
                };
                let outcome = ensure_store(&repo, &target, rebuild, options).context("Failed to build store")?;
                render::build(&outcome, format)
            }
            Commands::Tree { start, end, contributors, exclude_contributors, metric, output } => {
                let window = DateWindow::parse(start.as_deref(), end.as_deref())?;
                let filter = ContributorFilter::parse(contributors.as_deref(), exclude_contributors.as_deref())?;
                let selector = MetricSelector::from_name(metric.as_deref());
                let tree = open()?.get_tree(&window, &filter, selector).context("Tree query failed")?;
                render::tree(&tree, output.format())
            }
            Commands::Timeline { start, end, output } => {
                let window = DateWindow::parse(start.as_deref(), end.as_deref())?;
                let timeline = open()?.get_timeline(&window).context("Timeline query failed")?;
                render::timeline(&timeline, output.format())
            }
            Commands::Contributors { output } => {
                let contributors = open()?.get_contributors().context("Contributors query failed")?;
                render::contributors(&contributors, output.format())
            }
            Commands::File { id, output } => {
                let detail = open()?.get_file_detail(id)?;
                render::file_detail(&detail, output.format())
            }
            Commands::Metadata { output } => {
                let metadata = open()?.get_metadata().context("Metadata query failed")?;
                render::metadata(&metadata, output.format())
            }
        }
    }
}
