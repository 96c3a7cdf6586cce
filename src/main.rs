use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use aicrawler::config::{self, Config};
use aicrawler::db::{self, Store};
use aicrawler::error::{AppError, Result};
use aicrawler::pipeline::{resolve_period, Pipeline};
use aicrawler::server;

#[derive(Parser)]
#[command(
    name = "aicrawler",
    version,
    about = "Daily AI news briefings",
    long_about = "AICrawler collects, triages, clusters, and narrates AI developments into daily briefings."
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize configuration in ~/.config/aicrawler/
    Init,
    /// Show database and system status
    Status,
    /// Print version
    Version,
    /// Collect articles from configured sources
    Collect,
    /// Run the full pipeline: collect -> fetch -> triage -> cluster -> synthesize -> compose
    Run {
        /// Override lookback window (days)
        #[arg(long)]
        days_back: Option<i64>,

        /// Show what would be done without executing
        #[arg(long)]
        dry_run: bool,
    },
    /// Start the local web server
    Serve {
        /// Port to run server on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage research priorities
    Priorities {
        #[command(subcommand)]
        cmd: PrioritiesCommand,
    },
}

#[derive(Subcommand)]
enum PrioritiesCommand {
    /// List all research priorities
    List,
    /// Add a new research priority
    Add {
        title: String,
        description: Option<String>,
    },
    /// Remove a research priority
    Remove { id: i64 },
    /// Toggle a priority's active state
    Toggle { id: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::UserAbort) => {
            println!("Aborted.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    // init and version work without a config file.
    match &cli.cmd {
        Command::Init => {
            init_tracing(cli.verbose, None);
            return cmd_init();
        }
        Command::Version => {
            println!("aicrawler {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let config_path = config::resolve_config_path(cli.config.as_deref())?;
    let cfg = Config::load(&config_path)?;
    init_tracing(cli.verbose, Some(&cfg.logging.level));

    match cli.cmd {
        Command::Init | Command::Version => unreachable!(),
        Command::Status => cmd_status(&cfg).await,
        Command::Collect => cmd_collect(&cfg).await,
        Command::Run { days_back, dry_run } => cmd_run(&cfg, days_back, dry_run).await,
        Command::Serve { port } => cmd_serve(&cfg, port).await,
        Command::Priorities { cmd } => cmd_priorities(&cfg, cmd).await,
    }
}

fn init_tracing(verbose: bool, config_level: Option<&str>) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config_level.map(|l| l.to_lowercase()).unwrap_or_else(|| "warn".to_string())
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_init() -> Result<()> {
    let target = config::config_dir().join("config.yaml");
    if target.exists() {
        println!("Config already exists: {}", target.display());
        return Ok(());
    }

    std::fs::create_dir_all(config::config_dir())?;
    std::fs::write(&target, config::DEFAULT_CONFIG_YAML)?;

    println!("Created config: {}", target.display());
    println!("Edit it to configure feeds, API keys, and LLM provider.");
    Ok(())
}

async fn open_store(cfg: &Config) -> Result<Store> {
    Store::open(&cfg.db_path()).await
}

async fn cmd_status(cfg: &Config) -> Result<()> {
    let store = open_store(cfg).await?;
    let stats = store.stats().await?;

    println!("Today: {}\n", db::today());
    println!("Articles:");
    println!("  Total collected: {}", stats.total_articles);
    println!("  Triaged: {}", stats.triaged_articles);
    println!("  Relevant: {}", stats.relevant_articles);
    println!("\nOutput:");
    println!("  Storylines: {}", stats.storylines);
    println!("  Briefings: {}", stats.briefings);
    println!("  Days with data: {}", stats.periods_with_articles);
    println!("\nResearch Priorities:");
    println!("  Total: {}", stats.total_priorities);
    println!("  Active: {}", stats.active_priorities);
    Ok(())
}

async fn cmd_collect(cfg: &Config) -> Result<()> {
    let store = open_store(cfg).await?;
    let period_id = db::today();

    println!("Collecting articles from sources...");
    let collector = aicrawler::pipeline::collect::Collector::new(cfg, &store, 1);
    let result = collector.collect(&period_id).await?;

    println!("\nCollection complete:");
    println!("  Total found: {}", result.total_found);
    println!("  New articles: {}", result.new_articles);
    println!("  Duplicates skipped: {}", result.duplicates);

    if !result.sources.is_empty() {
        println!("\nArticles by source:");
        let mut sorted: Vec<_> = result.sources.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1));
        for (source, count) in sorted {
            println!("  {}: {}", source, count);
        }
    }
    Ok(())
}

async fn cmd_run(cfg: &Config, days_back: Option<i64>, dry_run: bool) -> Result<()> {
    let store = open_store(cfg).await?;
    let today = db::today();

    let (period_id, effective_days_back) =
        resolve_period(&store, &today, days_back, prompt_catchup_consent).await?;

    let pipeline = Pipeline::new(cfg.clone(), store).await;
    let result = if dry_run {
        pipeline.dry_run(&period_id).await
    } else {
        pipeline.run(&period_id, effective_days_back).await
    };

    for (i, step) in result.steps.iter().enumerate() {
        println!("\nStep {}/6: {}", i + 1, step.name);
        match &step.err {
            Some(e) => println!("  Error: {e}"),
            None => println!("  {}", step.summary),
        }
    }

    if !dry_run {
        println!("\nPipeline complete! Run 'aicrawler serve' to view the briefing.");
    }
    Ok(())
}

/// Stdin y/N prompt for multi-day catch-ups.
fn prompt_catchup_consent(missed_days: i64, period_id: &str) -> bool {
    println!("Last run was {} days ago.", missed_days);
    print!(
        "Catch up {} days ({})? This will use more API calls [y/N]: ",
        missed_days, period_id
    );
    io::stdout().flush().ok();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

async fn cmd_serve(cfg: &Config, port: Option<u16>) -> Result<()> {
    let store = open_store(cfg).await?;
    let port = port.unwrap_or(cfg.server.port);

    println!("Starting server at http://localhost:{}", port);
    println!("Press Ctrl+C to stop");
    server::serve(store, port).await
}

async fn cmd_priorities(cfg: &Config, cmd: PrioritiesCommand) -> Result<()> {
    let store = open_store(cfg).await?;

    match cmd {
        PrioritiesCommand::List => {
            let items = store.all_priorities().await?;
            if items.is_empty() {
                println!("No priorities defined. Add one with: aicrawler priorities add");
                return Ok(());
            }

            println!("Research Priorities:\n");
            for p in items {
                let icon = if p.is_active { "*" } else { " " };
                println!("  [{}] {} {}", p.id, icon, p.title);
                if let Some(desc) = p.description.as_deref().filter(|d| !d.is_empty()) {
                    let desc = if desc.chars().count() > 60 {
                        let truncated: String = desc.chars().take(60).collect();
                        format!("{truncated}...")
                    } else {
                        desc.to_string()
                    };
                    println!("        {}", desc);
                }
            }
        }
        PrioritiesCommand::Add { title, description } => {
            let id = store
                .insert_priority(title.clone(), description.unwrap_or_default(), Vec::new())
                .await?;
            println!("Added priority [{}]: {}", id, title);
        }
        PrioritiesCommand::Remove { id } => {
            let priority = store
                .priority(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("priority {id}")))?;
            store.delete_priority(id).await?;
            println!("Removed priority [{}]: {}", id, priority.title);
        }
        PrioritiesCommand::Toggle { id } => {
            let priority = store
                .priority(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("priority {id}")))?;
            store.toggle_priority(id).await?;
            let new_state = if priority.is_active { "disabled" } else { "enabled" };
            println!("Priority [{}] {}: {}", id, priority.title, new_state);
        }
    }
    Ok(())
}
