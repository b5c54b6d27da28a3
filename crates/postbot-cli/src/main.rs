use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use postbot::db::job_repo::JobFilter;
use postbot::{load_config, Config, Database, JobId, JobStatus, JobStore};

#[derive(Parser)]
#[command(name = "postbot")]
#[command(about = "Inspect and maintain the postbot job store")]
struct Cli {
    /// Job database path. Falls back to the config file, then ~/.postbot/data/postbot.db
    #[arg(long, global = true, env = "POSTBOT_DB")]
    db: Option<PathBuf>,

    /// Config file used to locate the database
    #[arg(long, short, global = true, env = "POSTBOT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply pending migrations
    Migrate,

    /// List jobs, newest first
    List {
        #[arg(long)]
        owner: Option<String>,
        /// One of new, needs_text, needs_image, ready_to_publish, complete, failed
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print one job as JSON
    Show { id: i64 },

    /// Count jobs per status
    Stats {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Config file tools
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate a config file against the schema and semantic rules
    Check { path: PathBuf },
}

fn init_logging(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = matches!(format, LogFormat::Json);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)));

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    tracing_log::LogTracer::init().context("Failed to forward log records")?;
    Ok(())
}

fn database_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.db {
        return Ok(path.clone());
    }
    if let Some(path) = &cli.config {
        let config = load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        return Ok(config.database_path());
    }
    postbot::db::default_database_path().ok_or_else(|| anyhow!("No home directory; pass --db"))
}

/// Inspection never migrates or writes, so it can run beside live bots.
fn open_store(path: &Path) -> Result<JobStore> {
    let db = Database::open_read_only(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(JobStore::new(db))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    match &cli.command {
        Commands::Config {
            action: ConfigCommands::Check { path },
        } => check_config(path),
        Commands::Migrate => {
            let path = database_path(&cli)?;
            let db = Database::open(&path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            println!(
                "Database ready at {} (schema v{})",
                path.display(),
                db.schema_version()?
            );
            Ok(())
        }
        Commands::List {
            owner,
            status,
            limit,
            json,
        } => {
            let store = open_store(&database_path(&cli)?)?;
            let filter = JobFilter {
                owner: owner.clone(),
                status: *status,
                limit: Some(*limit),
                ..Default::default()
            };
            let (jobs, total) = store.list(&filter)?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
                return Ok(());
            }

            println!(
                "{:>6}  {:<20}  {:<16}  {:<14}  {:<17}  {:>5}",
                "ID", "CREATED", "OWNER", "SOURCE", "STATUS", "T/I/P"
            );
            for job in &jobs {
                println!(
                    "{:>6}  {:<20}  {:<16}  {:<14}  {:<17}  {:>5}",
                    job.id,
                    job.created_at.format("%Y-%m-%d %H:%M:%S"),
                    job.owner,
                    job.source_id.to_string(),
                    job.status().as_str(),
                    format!("{}/{}/{}", job.text_attempts, job.image_attempts, job.post_attempts)
                );
            }
            println!("{} of {} jobs", jobs.len(), total);
            Ok(())
        }
        Commands::Show { id } => {
            let store = open_store(&database_path(&cli)?)?;
            let job = store
                .find(JobId(*id))?
                .ok_or_else(|| anyhow!("Job {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Commands::Stats { owner } => {
            let store = open_store(&database_path(&cli)?)?;
            let counts = store.status_counts(owner.as_deref())?;
            let total: u64 = counts.iter().map(|c| c.count).sum();
            for count in &counts {
                println!("{:<17} {:>8}", count.status.as_str(), count.count);
            }
            println!("{:<17} {:>8}", "total", total);
            Ok(())
        }
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config: Config =
        load_config(path).with_context(|| format!("Invalid config {}", path.display()))?;

    println!("Config {} is valid (version {})", path.display(), config.version);
    println!("Database: {}", config.database_path().display());
    for bot in &config.bots {
        let scorer = match bot.reply_probability {
            Some(p) => format!("fixed reply probability {:.2}", p),
            None => "heuristic reply probability".to_string(),
        };
        println!(
            "  {}: {} subject(s), {} scheduled, {}",
            bot.username,
            bot.subjects.len(),
            bot.new_post_schedule.len(),
            scorer
        );
    }
    Ok(())
}
