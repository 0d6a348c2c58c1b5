//! EEAT Lens CLI
//!
//! E-E-A-T content-quality scoring with an LLM judge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use eeat_agents::{
    create_anthropic_backend, create_backend, AnthropicConfig, OpenAIBackendConfig,
    PromptRegistry, SharedBackend, DEFAULT_LLM_TIMEOUT_SECS,
};
use eeat_core::{PrunePolicy, ResultCache};
use eeat_runtime::{PageStatus, Pipeline, PipelineConfig, RunReport};
use eeat_web::HttpFetcher;

#[derive(Parser)]
#[command(name = "eeat")]
#[command(author, version, about = "EEAT Lens: E-E-A-T content-quality scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one or more pages
    Score(ScoreArgs),

    /// Inspect or prune the result cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// List the active prompt templates and their versions
    Prompts {
        /// Directory of prompt TOML files overriding the embedded ones
        #[arg(long)]
        prompts_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ScoreArgs {
    /// Page URL (repeatable)
    #[arg(short, long = "url")]
    urls: Vec<String>,

    /// File with one URL per line (`#` starts a comment)
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Run configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ask for ready-to-insert draft text with each recommendation
    #[arg(long)]
    draft: bool,

    /// Pages processed concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-page time budget in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Force the content language (FR, DE, ES, EN, JA, PT-BR)
    #[arg(long)]
    language: Option<String>,

    /// Result cache directory
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,

    /// Keep results in memory for this run only
    #[arg(long)]
    no_cache: bool,

    /// Directory of prompt TOML files overriding the embedded ones
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// JSON report path (default: eeat_report_<timestamp>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a Markdown summary here
    #[arg(long)]
    markdown: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args)]
struct ProviderArgs {
    /// LLM model to use
    #[arg(short, long, default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Seconds before a single judge HTTP request is abandoned
    #[arg(long, default_value_t = DEFAULT_LLM_TIMEOUT_SECS)]
    llm_timeout: u64,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_key: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenRouter API key (or set OPENROUTER_API_KEY env var)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_key: Option<String>,

    /// Use OpenAI instead of Anthropic
    #[arg(long)]
    openai: bool,

    /// Use OpenRouter instead of Anthropic
    #[arg(long, conflicts_with = "openai")]
    openrouter: bool,

    /// Use a local OpenAI-compatible server at this base URL
    #[arg(long, conflicts_with_all = ["openai", "openrouter"])]
    local: Option<String>,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show entry count and age range
    Stats {
        #[arg(long, default_value = ".eeat-cache")]
        dir: PathBuf,
    },

    /// Evict old entries, oldest first
    Prune {
        #[arg(long, default_value = ".eeat-cache")]
        dir: PathBuf,

        /// Remove entries older than this many days
        #[arg(long)]
        max_age_days: Option<i64>,

        /// Keep at most this many entries
        #[arg(long)]
        max_entries: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Score(args) => run_score(args).await?,
        Commands::Cache { action } => run_cache(action)?,
        Commands::Prompts { prompts_dir } => list_prompts(prompts_dir.as_deref())?,
    }

    Ok(())
}

fn create_judge_backend(args: &ProviderArgs) -> Result<(SharedBackend, &'static str)> {
    let model = args.model.as_str();
    let timeout = args.llm_timeout;

    // Default: Anthropic
    let selected = if let Some(base_url) = &args.local {
        (
            create_backend(OpenAIBackendConfig::local(base_url, model).with_timeout(timeout))?,
            "local",
        )
    } else if args.openrouter {
        let key = args.openrouter_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("OpenRouter API key required. Set OPENROUTER_API_KEY or use --openrouter-key")
        })?;
        (
            create_backend(OpenAIBackendConfig::openrouter(key, model).with_timeout(timeout))?,
            "OpenRouter",
        )
    } else if args.openai {
        let key = args.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("OpenAI API key required. Set OPENAI_API_KEY or use --api-key")
        })?;
        (
            create_backend(OpenAIBackendConfig::openai(key, model).with_timeout(timeout))?,
            "OpenAI",
        )
    } else {
        let key = args.anthropic_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("Anthropic API key required. Set ANTHROPIC_API_KEY or use --anthropic-key")
        })?;
        (
            create_anthropic_backend(AnthropicConfig::new(key, model).with_timeout(timeout))?,
            "Anthropic",
        )
    };

    Ok(selected)
}

fn load_registry(dir: Option<&Path>) -> Result<PromptRegistry> {
    let registry = PromptRegistry::load_embedded()?;
    match dir {
        Some(dir) => registry
            .with_overrides_from_dir(dir)
            .with_context(|| format!("loading prompts from {}", dir.display())),
        None => Ok(registry),
    }
}

fn read_urls(args: &ScoreArgs) -> Result<Vec<String>> {
    let mut urls = args.urls.clone();

    if let Some(path) = &args.urls_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading URL list {}", path.display()))?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    if urls.is_empty() {
        bail!("No URLs given. Use --url or --urls-file");
    }
    Ok(urls)
}

fn build_config(args: &ScoreArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    // Flags override the file
    if args.draft {
        config.with_draft = true;
    }
    if let Some(n) = args.concurrency {
        config.fan_out = n;
    }
    if let Some(secs) = args.timeout {
        config.page_timeout_secs = secs;
    }
    if let Some(language) = &args.language {
        config.forced_language = Some(language.to_uppercase());
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(dir) = &args.prompts_dir {
        config.prompts_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run_score(args: ScoreArgs) -> Result<()> {
    println!("🔎 EEAT Lens - E-E-A-T content scoring\n");

    let urls = read_urls(&args)?;
    let config = build_config(&args)?;
    let registry = load_registry(config.prompts_dir.as_deref())?;
    let (backend, provider) = create_judge_backend(&args.provider)?;
    let fetcher = Arc::new(HttpFetcher::new(config.fetch.to_fetch_config())?);
    let cache = config.cache.open()?;

    println!("📡 Provider: {} | Model: {}", provider, args.provider.model);
    println!(
        "📄 Pages: {} | Concurrency: {} | Timeout: {}s | Drafts: {}",
        urls.len(),
        config.fan_out,
        config.page_timeout_secs,
        if config.with_draft { "on" } else { "off" }
    );
    if config.cache.enabled {
        println!("🗄️  Cache: {}\n", config.cache.dir.display());
    } else {
        println!("🗄️  Cache: in-memory (this run only)\n");
    }

    let pipeline = Pipeline::with_backend(config, fetcher, backend, &registry, cache)?;
    let report = pipeline.run(&urls).await?;

    print_summary(&report);

    let output_path = args.output.unwrap_or_else(|| {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
        PathBuf::from(format!("eeat_report_{}.json", timestamp))
    });
    report.write_json(&output_path)?;
    println!("\n📄 Report saved to: {}", output_path.display());

    if let Some(path) = args.markdown {
        report.write_markdown(&path)?;
        println!("📝 Markdown saved to: {}", path.display());
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(60));
    for page in &report.pages {
        match (&page.status, &page.report) {
            (PageStatus::Succeeded, Some(r)) => {
                println!(
                    "✅ {}\n   global {:.1} | adjusted {:.1} | composite {:.1} | {} weakness(es) | {} recommendation(s)",
                    page.url,
                    r.score_card.eeat.global,
                    r.score_card.adjusted_global,
                    r.score_card.composite,
                    r.score_card.weaknesses.len(),
                    r.recommendations.len()
                );
            }
            (PageStatus::Failed { reason }, _) => println!("❌ {}\n   {}", page.url, reason),
            (status, _) => println!("⏱️  {}\n   {}", page.url, status.as_str()),
        }
    }
    println!("{}", "=".repeat(60));
    println!(
        "📊 {} page(s): {} succeeded, {} failed, {} timed out",
        report.summary.total,
        report.summary.succeeded,
        report.summary.failed,
        report.summary.timed_out
    );
}

fn run_cache(action: CacheCommand) -> Result<()> {
    match action {
        CacheCommand::Stats { dir } => {
            let cache = ResultCache::open_dir(&dir)?;
            let stats = cache.stats()?;
            println!("🗄️  Cache: {}", dir.display());
            println!("   Entries: {}", stats.entries);
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!("   Oldest:  {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
                println!("   Newest:  {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        CacheCommand::Prune {
            dir,
            max_age_days,
            max_entries,
        } => {
            if max_age_days.is_none() && max_entries.is_none() {
                bail!("Nothing to prune. Use --max-age-days and/or --max-entries");
            }
            let cache = ResultCache::open_dir(&dir)?;
            let report = cache.prune(PrunePolicy {
                max_age: max_age_days.map(chrono::Duration::days),
                max_entries,
            })?;
            println!(
                "🧹 Removed {} entr(ies), kept {} ({} pinned skipped)",
                report.removed, report.kept, report.skipped_pinned
            );
        }
    }
    Ok(())
}

fn list_prompts(dir: Option<&Path>) -> Result<()> {
    let registry = load_registry(dir)?;
    for template in registry.list() {
        println!(
            "{:<12} {:<10} {}",
            template.prompt.id, template.prompt.version, template.prompt.name
        );
    }
    Ok(())
}
