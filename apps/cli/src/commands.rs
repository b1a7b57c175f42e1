//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use foaintel_core::{ExportPaths, FoaPipeline, PipelineConfig, ProgressReporter, export_all};
use foaintel_shared::{AppConfig, FoaRecord, SemanticTag, Source, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// FOA Intel: funding opportunity ingestion and semantic tagging.
#[derive(Parser)]
#[command(
    name = "foa-intel",
    version,
    about = "Ingest funding opportunity announcements, tag them against a research ontology, and export JSON/CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ingest a single opportunity by URL.
    Ingest {
        /// Opportunity URL (grants.gov detail page or NSF award page).
        url: String,

        /// Output directory (defaults to `[defaults].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also run the embedding tagger.
        #[arg(long)]
        use_embeddings: bool,
    },

    /// Search a source by keyword and ingest the results.
    Search {
        /// Search keyword.
        keyword: String,

        /// Source to search: grants_gov or nsf.
        #[arg(short, long)]
        source: Option<Source>,

        /// Maximum number of opportunities to ingest.
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Output directory (defaults to `[defaults].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also run the embedding tagger.
        #[arg(long)]
        use_embeddings: bool,
    },

    /// Tag free text without fetching anything.
    Tag {
        /// Opportunity title.
        #[arg(long)]
        title: String,

        /// Program description.
        #[arg(short, long, default_value = "")]
        description: String,

        /// Also run the embedding tagger.
        #[arg(long)]
        use_embeddings: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "foaintel=info",
        1 => "foaintel=debug",
        _ => "foaintel=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest {
            url,
            out,
            use_embeddings,
        } => cmd_ingest(&url, out, use_embeddings).await,
        Command::Search {
            keyword,
            source,
            max_results,
            out,
            use_embeddings,
        } => cmd_search(&keyword, source, max_results, out, use_embeddings).await,
        Command::Tag {
            title,
            description,
            use_embeddings,
        } => cmd_tag(&title, &description, use_embeddings).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Build a ready pipeline from the config file plus CLI overrides.
async fn build_pipeline(config: &AppConfig, use_embeddings: bool) -> Result<FoaPipeline> {
    let mut pipeline_config = PipelineConfig::from(config);
    pipeline_config.tagging.use_embeddings = use_embeddings;

    let mut pipeline = FoaPipeline::new(pipeline_config)?;
    pipeline.prepare().await;
    if use_embeddings && !pipeline.embeddings_enabled() {
        eprintln!("  Embedding tagger unavailable; using rule-based tags only.");
    }
    Ok(pipeline)
}

fn output_dir(config: &AppConfig, out: Option<PathBuf>) -> PathBuf {
    out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir))
}

async fn cmd_ingest(url: &str, out: Option<PathBuf>, use_embeddings: bool) -> Result<()> {
    let config = load_config()?;
    let out_dir = output_dir(&config, out);
    let pipeline = build_pipeline(&config, use_embeddings).await?;

    info!(url, out = %out_dir.display(), "ingesting opportunity");
    let start = Instant::now();

    let reporter = CliProgress::new();
    let record = pipeline.process_url(url, &reporter).await;
    reporter.finish();
    let record = record?;

    let records = [record];
    let paths = export_all(&records, &out_dir)?;

    let record = &records[0];
    println!();
    println!("  Opportunity ingested.");
    println!("  ID:      {}", record.foa_id);
    println!("  Title:   {}", record.title);
    println!("  Agency:  {}", record.agency);
    println!("  Source:  {}", record.source);
    println!("  Tags:    {}", record.semantic_tags.len());
    print_tags(&record.semantic_tags);
    print_exports(&paths);
    println!("  Time:    {:.1}s", start.elapsed().as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_search(
    keyword: &str,
    source: Option<Source>,
    max_results: Option<usize>,
    out: Option<PathBuf>,
    use_embeddings: bool,
) -> Result<()> {
    let config = load_config()?;
    let source = source.unwrap_or(config.defaults.source);
    let max_results = max_results.unwrap_or(config.defaults.max_results);
    if max_results == 0 {
        return Err(eyre!("--max-results must be at least 1"));
    }
    let out_dir = output_dir(&config, out);
    let pipeline = build_pipeline(&config, use_embeddings).await?;

    info!(keyword, %source, max_results, "searching");
    let start = Instant::now();

    let reporter = CliProgress::new();
    let records = pipeline.process_search(keyword, source, max_results, &reporter).await;
    reporter.finish();
    let records = records?;

    if records.is_empty() {
        println!("No opportunities found for '{keyword}' in {source}.");
        return Ok(());
    }

    let paths = export_all(&records, &out_dir)?;

    println!();
    println!("  Ingested {} opportunities from {source}.", records.len());
    for record in &records {
        println!("  - [{}] {}", record.foa_id, record.title);
        if let Some(top) = record.semantic_tags.first() {
            println!("      top tag: {} ({:.2}, {})", top.tag, top.confidence, top.method);
        }
    }
    print_exports(&paths);
    println!("  Time:    {:.1}s", start.elapsed().as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_tag(title: &str, description: &str, use_embeddings: bool) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config, use_embeddings).await?;

    let tags = pipeline.apply_tags(title, description).await;
    if tags.is_empty() {
        println!("No tags matched.");
        return Ok(());
    }
    print_tags(&tags);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_tags(tags: &[SemanticTag]) {
    for tag in tags {
        println!("    {:<50} {:.2}  {}", tag.tag, tag.confidence, tag.method);
    }
}

fn print_exports(paths: &ExportPaths) {
    println!("  JSON:    {}", paths.json.display());
    if let Some(csv) = &paths.csv {
        println!("  CSV:     {}", csv.display());
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    /// Clear the spinner, whether or not the pipeline reached `done`.
    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_processed(&self, title: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("Tagged [{current}/{total}] {title}"));
    }

    fn item_skipped(&self, reason: &str, current: usize, total: usize) {
        self.spinner.println(format!("  skipped [{current}/{total}]: {reason}"));
    }

    fn done(&self, _records: &[FoaRecord]) {
        self.spinner.finish_and_clear();
    }
}
