use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roaming_insights::agent::transcript::log_turns;
use roaming_insights::agent::AnswerService;
use roaming_insights::catalog::SchemaCatalog;
use roaming_insights::config::AppConfig;
use roaming_insights::exemplars::default_exemplars;
use roaming_insights::logging::init_logging;
use roaming_insights::prompt::{compose_instructions, SQLITE_DIALECT};
use roaming_insights::storage::ingest::ingest_csv;
use roaming_insights::storage::{SqlBackend, UsageStore};
use roaming_insights::RoamingError;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Business questions used by `batch` when no file is given.
const DEFAULT_BATCH_QUESTIONS: [&str; 5] = [
    "What is the average downloaded data volume for NON-IOT devices on 2G/3G networks?",
    "What percentage of roaming users used 4G/5G networks versus 2G/3G?",
    "Which visited network (vmcc/vmnc) had the highest number of active roamers?",
    "List the top 5 IMSIs with the highest data outbound uploads.",
    "What is the ratio of data upload to download for inbound sessions?",
];

#[derive(Parser)]
#[command(name = "roaming-insights")]
#[command(about = "Ask natural-language questions about telecom roaming usage")]
struct Cli {
    /// Path to the SQLite usage database (or set ROAMING_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Maximum rows a query may return unless the question asks for more
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Step budget for one question
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Chat model name (or set LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// API key (or set GOOGLE_API_KEY / LLM_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Directory for dated log files (or set LOG_DIR)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question
    Ask {
        question: String,
        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer a list of questions, one fresh run each
    Batch {
        /// File with one question per line (defaults to the built-in set)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Load a CSV export of the usage spreadsheet into the database
    Ingest {
        csv: PathBuf,
        #[arg(long)]
        table: Option<String>,
    },
    /// List tables and their schema
    Tables,
    /// Dry-run a query against the database
    Check { sql: String },
    /// Print the composed agent instructions
    Prompt,
}

impl Cli {
    fn config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::from_env()?;
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(top_k) = self.top_k {
            anyhow::ensure!(top_k > 0, "--top-k must be at least 1");
            config.loop_settings.top_k = top_k;
        }
        if let Some(max_steps) = self.max_steps {
            anyhow::ensure!(max_steps > 0, "--max-steps must be at least 1");
            config.loop_settings.max_steps = max_steps;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(key) = &self.api_key {
            config.llm.api_key = Some(key.clone());
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        Ok(config)
    }
}

fn log_partial_transcript(err: &RoamingError) {
    if let Some(turns) = err.partial_transcript() {
        warn!("Partial transcript ({} turns):", turns.len());
        log_turns(turns);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = cli.config()?;
    init_logging(&config.log_dir, "app")?;

    match cli.command {
        Command::Ask { question, json } => {
            let service = AnswerService::from_config(&config)?;
            let answer = match service.answer(&question).await {
                Ok(answer) => answer,
                Err(e) => {
                    log_partial_transcript(&e);
                    return Err(e.into());
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.answer);
                if let Some(insight) = &answer.insight {
                    println!("\nInsight: {}", insight);
                }
                if let Some(sql) = &answer.sql {
                    println!("\nSQL:\n{}", sql);
                }
            }
        }
        Command::Batch { file } => {
            let questions: Vec<String> = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect(),
                None => DEFAULT_BATCH_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            };
            let service = AnswerService::from_config(&config)?;
            let mut passed = 0;
            for (i, question) in questions.iter().enumerate() {
                info!("--- Query {} ---", i + 1);
                info!("Input prompt: {}", question);
                match service.answer(question).await {
                    Ok(answer) => {
                        passed += 1;
                        match &answer.sql {
                            Some(sql) => info!("Generated SQL:\n{}", sql),
                            None => info!("Generated SQL: none executed"),
                        }
                        info!("Query result:\n{}", answer.answer);
                        if let Some(insight) = &answer.insight {
                            info!("Insight summary:\n{}", insight);
                        }
                    }
                    Err(e) => {
                        error!("Query {} failed: {}", i + 1, e);
                        log_partial_transcript(&e);
                    }
                }
            }
            info!("Batch finished: {}/{} questions answered", passed, questions.len());
            println!("{}/{} questions answered", passed, questions.len());
        }
        Command::Ingest { csv, table } => {
            let report = ingest_csv(&csv, &config.db_path, table.as_deref())
                .with_context(|| format!("ingesting {}", csv.display()))?;
            println!(
                "Loaded {} rows into {} ({} blank rows skipped, {} rejected)",
                report.inserted,
                report.table,
                report.skipped_blank,
                report.rejected.len()
            );
            for rejected in &report.rejected {
                println!("  line {}: {}", rejected.line, rejected.reason);
            }
        }
        Command::Tables => {
            let store = UsageStore::open_read_only(&config.db_path)?;
            let tables = store.list_tables()?;
            for description in store.describe_schema(&tables)? {
                println!("{}\n", description.render());
            }
        }
        Command::Check { sql } => {
            let store = UsageStore::open_read_only(&config.db_path)?;
            match store.validate_query(&sql) {
                Ok(()) => println!("OK"),
                Err(e) => {
                    println!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Prompt => {
            let text = compose_instructions(
                SQLITE_DIALECT,
                config.loop_settings.top_k,
                &SchemaCatalog::roaming(),
                &default_exemplars(),
            );
            println!("{}", text);
        }
    }

    Ok(())
}
