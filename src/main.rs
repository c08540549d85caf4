use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use wikirefs::batch::{load_articles, run_batch};
use wikirefs::config::ExtractorConfig;
use wikirefs::storage::{write_storage_csv, KnowledgeBase};
use wikirefs::ExtractorState;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikirefs")]
#[command(about = "Extract, classify and hash citations from Wikipedia wikitext")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print reference statistics for one article as JSON
    Extract(ExtractArgs),
    /// Extract every article in a directory
    Batch(BatchArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file
    #[arg(long)]
    config: Option<String>,

    /// Knowledge base URL hashes are namespaced to
    #[arg(long)]
    kb_url: Option<String>,

    /// Reference-like section heading (repeatable, replaces the defaults)
    #[arg(long = "heading")]
    headings: Vec<String>,
}

impl ConfigArgs {
    fn load(&self) -> Result<ExtractorConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractorConfig::from_json_file(path)?,
            None => ExtractorConfig::default(),
        };
        if let Some(url) = &self.kb_url {
            config.knowledge_base = KnowledgeBase::new(url.clone());
        }
        if !self.headings.is_empty() {
            config.reference_headings = self.headings.clone();
        }
        Ok(config)
    }
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to a wikitext file
    #[arg(short, long)]
    input: String,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// Directory of .wiki/.wikitext/.txt files, one article each
    #[arg(short, long)]
    input: String,

    /// Write hashed references to this CSV file
    #[arg(long)]
    export: Option<String>,

    /// Limit number of articles to process (for testing)
    #[arg(long)]
    limit: Option<usize>,

    #[command(flatten)]
    config: ConfigArgs,
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let config = args.config.load()?;
    let wikitext = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read article: {}", args.input))?;

    let state = ExtractorState::extract(&wikitext, &config)
        .with_context(|| format!("Failed to extract references from {}", args.input))?;
    let title = std::path::Path::new(&args.input)
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    let statistics = state.statistics().with_title(title);

    let json = if args.pretty {
        serde_json::to_string_pretty(&statistics)?
    } else {
        serde_json::to_string(&statistics)?
    };
    println!("{json}");
    Ok(())
}

fn run_batch_command(args: BatchArgs) -> Result<()> {
    let config = args.config.load()?;

    let start_loading = Instant::now();
    let articles = load_articles(&args.input, args.limit)?;
    info!(
        articles = articles.len(),
        duration_secs = start_loading.elapsed().as_secs_f64(),
        "Loaded articles"
    );

    let start_extracting = Instant::now();
    let outcome = run_batch(&articles, &config, true);
    let extraction_duration = start_extracting.elapsed();

    let plan = outcome.storage_plan();
    if let Some(path) = &args.export {
        write_storage_csv(path, &plan)?;
    }

    let summary = outcome.summary;
    println!();
    println!("=== Summary ===");
    println!(
        "Extraction time:      {:.2}s",
        extraction_duration.as_secs_f64()
    );
    println!();
    println!("Articles processed:   {}", summary.articles_processed);
    println!("Articles failed:      {}", summary.articles_failed);
    println!("With references:      {}", summary.articles_with_references);
    println!("References found:     {}", summary.references_found);
    println!("Named references:     {}", summary.named_references);
    println!("Hashed references:    {}", summary.hashed_references);
    println!("Unique hashes:        {}", plan.entries.len());
    println!("Unterminated <ref>:   {}", summary.unterminated_tags);
    for (title, reason) in &outcome.failed {
        println!("  FAILED: {title}: {reason}");
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Batch(args) => run_batch_command(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
