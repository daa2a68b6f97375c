mod ai;
mod answerer;
mod answers;
mod apply;
mod browser;
mod config;
mod db;
mod documents;
mod extractor;
mod filter;
mod manager;
mod models;
mod navigator;
mod outcomes;
#[cfg(test)]
mod testing;
mod wait;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use answerer::LlmAnswerer;
use answers::AnswerStore;
use apply::Applier;
use browser::{Browser, WebDriverBrowser};
use config::AppConfig;
use db::Ledger;
use documents::ConfiguredDocuments;
use filter::JobFilter;
use manager::JobManager;
use models::FieldType;
use navigator::build_search_url;
use outcomes::OutcomeLog;
use wait::Waiter;

#[derive(Parser)]
#[command(name = "easy-apply")]
#[command(about = "Search LinkedIn and work through Easy Apply forms")]
struct Cli {
    /// Path to the YAML config (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample config and create the output directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Search, filter and apply
    Run {
        /// Filter and score jobs without opening the application form
        #[arg(long)]
        dry_run: bool,

        /// WebDriver endpoint (a running chromedriver)
        #[arg(long, default_value = "http://localhost:9515")]
        driver_url: String,

        /// Chrome user-data-dir holding a logged-in session
        #[arg(long)]
        profile_dir: Option<PathBuf>,

        /// Run Chrome without a window
        #[arg(long)]
        headless: bool,
    },

    /// Print the first results page URL for every configured search
    Urls,

    /// Inspect the job ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },

    /// Manage stored form answers
    Answers {
        #[command(subcommand)]
        command: AnswerCommands,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Show the flags recorded for one job link
    Show {
        link: String,
    },

    /// Count jobs per flag
    Stats,

    /// List the most recently seen jobs
    Recent {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum AnswerCommands {
    /// List stored answers
    List {
        /// Only this field type (text, numeric, textarea, radio, dropdown, checkbox, typeahead, date)
        #[arg(short = 't', long = "type")]
        field_type: Option<String>,
    },

    /// Store or replace an answer
    Set {
        field_type: String,
        question: String,
        answer: String,
    },

    /// Remove a stored answer
    Forget {
        field_type: String,
        question: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "easy_apply=debug" } else { "easy_apply=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn parse_field_type(s: &str) -> Result<FieldType> {
    FieldType::parse(s).ok_or_else(|| {
        anyhow!(
            "Unknown field type '{}'. Use text, numeric, textarea, radio, dropdown, checkbox, typeahead or date",
            s
        )
    })
}

fn load_config(path: &Option<PathBuf>) -> Result<AppConfig> {
    let path = path.clone().unwrap_or_else(AppConfig::default_path);
    if !path.exists() {
        return Err(anyhow!(
            "No config at {}. Run `easy-apply init` first.",
            path.display()
        ));
    }
    AppConfig::load(&path)
}

fn read_profile(config: &AppConfig) -> Result<String> {
    match &config.profile.resume_summary {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read resume summary {}", path.display())),
        None => {
            warn!("no profile.resume_summary configured, answers will be generic");
            Ok(String::new())
        }
    }
}

async fn run(config: AppConfig, dry_run: bool, driver_url: &str, profile_dir: Option<PathBuf>, headless: bool) -> Result<()> {
    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let ledger = Arc::new(Ledger::open(&Ledger::default_path(&output_dir))?);
    if ledger.is_degraded() {
        warn!("ledger unavailable, every job will look new this run");
    }
    let answers = AnswerStore::load(&AnswerStore::default_path(&output_dir))?;
    let outcomes = OutcomeLog::new(&output_dir)?;

    let model = ai::resolve_model(&config.profile.model)?;
    let provider = ai::create_provider(&model)?;
    let backend = Arc::new(
        LlmAnswerer::new(provider, read_profile(&config)?)
            .with_salary_expectation(config.apply.salary_expectation),
    );
    let renderer = Arc::new(ConfiguredDocuments::new(
        config.profile.resume_pdf.clone(),
        config.profile.cover_letter_pdf.clone(),
        &output_dir,
    ));

    let driver = Arc::new(WebDriverBrowser::connect(driver_url, profile_dir.as_deref(), headless).await?);
    let browser: Arc<dyn Browser> = driver.clone();
    let waiter = Waiter::new(config.timing.wait(), config.timing.poll());

    let applier = Applier::new(
        browser.clone(),
        backend,
        renderer,
        ledger.clone(),
        answers,
        config.apply.clone(),
        config.search.applicants.clone(),
        waiter,
        output_dir.clone(),
    )
    .with_filter(JobFilter::new(&config.search))
    .dry_run(dry_run);

    let mut manager = JobManager::new(
        browser,
        config.search.clone(),
        ledger,
        outcomes,
        Box::new(applier),
        waiter,
        output_dir.clone(),
    );
    info!(model = %model.short_name, dry_run, output = %output_dir.display(), "starting");
    let summary = manager.run().await;
    drop(manager);

    println!("Done: {}", summary);
    println!("Outcome logs in {}", output_dir.display());

    match Arc::try_unwrap(driver) {
        Ok(driver) => driver.quit().await?,
        Err(_) => warn!("browser still in use, leaving session open"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
            if path.exists() && !force {
                println!("Config already exists at {}", path.display());
            } else {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, serde_yaml::to_string(&AppConfig::sample())?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote sample config to {}", path.display());
            }

            let config = AppConfig::load(&path)?;
            let output_dir = config.output_dir();
            fs::create_dir_all(&output_dir)?;
            let ledger = Ledger::open(&Ledger::default_path(&output_dir))?;
            println!("Ledger ready at {}", ledger.path().display());
        }

        Commands::Run {
            dry_run,
            driver_url,
            profile_dir,
            headless,
        } => {
            let config = load_config(&cli.config)?;
            run(config, dry_run, &driver_url, profile_dir, headless).await?;
        }

        Commands::Urls => {
            let config = load_config(&cli.config)?;
            for term in &config.search.searches {
                for position in &term.positions {
                    println!("{}", build_search_url(&config.search, position, &term.location, 0));
                }
            }
        }

        Commands::Ledger { command } => {
            let config = load_config(&cli.config)?;
            let ledger = Ledger::open(&Ledger::default_path(&config.output_dir()))?;
            if ledger.is_degraded() {
                return Err(anyhow!("Ledger at {} could not be opened", ledger.path().display()));
            }
            match command {
                LedgerCommands::Show { link } => match ledger.entry(&link)? {
                    Some(entry) => {
                        println!("Link: {}", entry.link);
                        println!("First seen: {}", entry.first_seen_at);
                        let flags: Vec<&str> = entry.flags().iter().map(|f| f.label()).collect();
                        println!("Flags: {}", if flags.is_empty() { "-".to_string() } else { flags.join(", ") });
                        if let Some(score) = ledger.cached_score(&link) {
                            println!("Score: {:.1}", score);
                        }
                        if let Some(salary) = ledger.cached_salary(&link) {
                            println!("Salary estimate: {:.0}", salary);
                        }
                    }
                    None => println!("{} is not in the ledger.", link),
                },

                LedgerCommands::Stats => {
                    println!("{:<12} {:>8}", "FLAG", "JOBS");
                    println!("{}", "-".repeat(21));
                    for (flag, count) in ledger.stats()? {
                        println!("{:<12} {:>8}", flag.label(), count);
                    }
                }

                LedgerCommands::Recent { limit } => {
                    let entries = ledger.recent(limit)?;
                    if entries.is_empty() {
                        println!("Ledger is empty.");
                    } else {
                        println!("{:<20} {:<28} {:<50}", "FIRST SEEN", "FLAGS", "LINK");
                        println!("{}", "-".repeat(100));
                        for entry in entries {
                            let flags: Vec<&str> = entry.flags().iter().map(|f| f.label()).collect();
                            println!(
                                "{:<20} {:<28} {:<50}",
                                truncate(&entry.first_seen_at, 19),
                                truncate(&flags.join(","), 27),
                                entry.link
                            );
                        }
                    }
                }
            }
        }

        Commands::Answers { command } => {
            let config = load_config(&cli.config)?;
            let mut store = AnswerStore::load(&AnswerStore::default_path(&config.output_dir()))?;
            match command {
                AnswerCommands::List { field_type } => {
                    let wanted = field_type.as_deref().map(parse_field_type).transpose()?;
                    let records: Vec<_> = store
                        .records()
                        .iter()
                        .filter(|r| wanted.is_none_or(|t| r.field_type == t))
                        .collect();
                    if records.is_empty() {
                        println!("No stored answers.");
                    } else {
                        println!("{:<10} {:<60} {:<30}", "TYPE", "QUESTION", "ANSWER");
                        println!("{}", "-".repeat(100));
                        for record in records {
                            println!(
                                "{:<10} {:<60} {:<30}",
                                record.field_type,
                                truncate(&record.question, 58),
                                truncate(&record.answer, 28)
                            );
                        }
                    }
                }

                AnswerCommands::Set {
                    field_type,
                    question,
                    answer,
                } => {
                    let field_type = parse_field_type(&field_type)?;
                    store.put(&question, field_type, &answer)?;
                    println!("Stored {} answer for '{}'.", field_type, question);
                }

                AnswerCommands::Forget { field_type, question } => {
                    let field_type = parse_field_type(&field_type)?;
                    if store.forget(&question, field_type)? {
                        println!("Forgot {} answer for '{}'.", field_type, question);
                    } else {
                        println!("No {} answer stored for '{}'.", field_type, question);
                    }
                }
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Développeur Rust senior", 10), "Dévelop...");
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from(["easy-apply", "-v", "answers", "set", "radio", "Relocate?", "Yes"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Answers {
                command: AnswerCommands::Set { field_type, .. },
            } => assert_eq!(field_type, "radio"),
            _ => panic!("wrong command"),
        }
        assert!(parse_field_type("bogus").is_err());
        assert_eq!(parse_field_type("Dropdown").unwrap(), FieldType::Dropdown);
    }
}
