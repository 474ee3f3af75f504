//! Spellbee application binary - composition root.
//!
//! Ties the Spellbee crates into a single executable:
//! 1. Parse the CLI and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Open storage (SQLite documents + filesystem blobs) on demand
//! 4. Run one subcommand against the current spelling week

mod cli;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use spellbee_core::clock::{Clock, SystemClock};
use spellbee_core::config::SpellbeeConfig;
use spellbee_core::error::{Result, SpellbeeError};
use spellbee_core::score::evaluate;
use spellbee_core::types::{parse_word_list, SpellingList};
use spellbee_core::week::WeekClock;
use spellbee_storage::{
    cleanup_stale_audio, Database, FsBlobStore, PracticeLedger, SpellingRepository,
    SqliteKeyValueStore,
};

use cli::{ChildrenAction, CliArgs, Command};

const TIMESTAMP_FORMAT: &str = "%a %d %b %Y %H:%M";

fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();
}

/// Load the config file, installing tracing once the log level is known.
fn load_config(args: &CliArgs) -> SpellbeeConfig {
    let config_file = args.resolve_config_path();
    let config_level = SpellbeeConfig::load(&config_file)
        .map(|config| config.general.log_level)
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&args.resolve_log_level(&config_level));

    let mut config = if config_file.exists() {
        SpellbeeConfig::load_or_default(&config_file)
    } else {
        tracing::debug!(path = %config_file.display(), "No config file, using defaults");
        SpellbeeConfig::default()
    };

    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config
}

fn open_repository(config: &SpellbeeConfig) -> Result<SpellingRepository> {
    let db = Database::new(&config.database_path())?;
    let kv = SqliteKeyValueStore::new(Arc::new(db));
    Ok(SpellingRepository::new(Arc::new(kv)))
}

fn parse_instant(at: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SpellbeeError::InvalidInput(format!("Invalid timestamp '{}': {}", at, e)))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_list(list: &SpellingList) {
    println!("{} - week {}", list.group, list.week_id);
    println!("{}", list.week_id.release_label());
    println!("Created {}", list.created_at.format(TIMESTAMP_FORMAT));
    println!();
    for (i, word) in list.words.iter().enumerate() {
        match list.sentence(word) {
            Some(sentence) => println!("{:>3}. {:<16} {}", i + 1, word, sentence),
            None => println!("{:>3}. {}", i + 1, word),
        }
    }
    if !list.story.is_empty() {
        println!();
        println!("Story: {}", list.story);
    }

    let missing = list.missing_assets();
    if !missing.is_empty() {
        println!();
        println!("{} audio clip(s) missing, spoken on device instead:", missing.len());
        for key in missing {
            println!("  {}", key);
        }
    }
}

async fn run(args: &CliArgs, config: &SpellbeeConfig) -> Result<()> {
    let clock = SystemClock;
    let week_clock = WeekClock::new(config.week.zone()?);

    match &args.command {
        Command::Week { at } => {
            let now = match at {
                Some(at) => parse_instant(at)?,
                None => clock.now(),
            };
            let window = week_clock.window(now);
            if args.json {
                return print_json(&serde_json::json!({
                    "weekId": window.week_id,
                    "start": window.start,
                    "end": window.end,
                    "zone": window.zone.to_string(),
                    "label": window.week_id.release_label(),
                }));
            }
            println!("Week:   {}", window.week_id);
            println!(
                "Window: {} to {} ({})",
                window.start.format(TIMESTAMP_FORMAT),
                window.end.format(TIMESTAMP_FORMAT),
                window.zone
            );
            println!("{}", window.week_id.release_label());
        }

        Command::Words { text } => {
            let words = parse_word_list(text);
            if args.json {
                return print_json(&words);
            }
            for word in &words {
                println!("{}", word);
            }
            println!("{} word(s)", words.len());
        }

        Command::Score { score, total } => {
            let evaluation = evaluate(*score, *total);
            if args.json {
                return print_json(&evaluation);
            }
            println!("{}/{} - {}", score.min(total), total, evaluation.tier);
            println!("{}", evaluation.message);
            if evaluation.celebrate {
                println!("Time to celebrate!");
            }
        }

        Command::Groups { set } => {
            let repo = open_repository(config)?;
            let groups = match set {
                Some(set) => {
                    let names: Vec<String> = set.split(',').map(str::to_string).collect();
                    repo.save_groups(&names).await?
                }
                None => repo.groups().await,
            };
            if args.json {
                return print_json(&groups);
            }
            if groups.is_empty() {
                println!("No groups configured");
            }
            for group in groups {
                println!("{}", group);
            }
        }

        Command::Children { action } => {
            let repo = open_repository(config)?;
            match action {
                ChildrenAction::List => {
                    let children = repo.children().await;
                    if args.json {
                        return print_json(&children);
                    }
                    if children.is_empty() {
                        println!("No children yet");
                    }
                    for child in children {
                        println!("{}", child);
                    }
                }
                ChildrenAction::Add { name } => {
                    if repo.add_child(name).await? {
                        println!("Added {}", name.trim());
                    } else {
                        println!("{} is already known", name.trim());
                    }
                }
                ChildrenAction::Remove { name } => {
                    if repo.remove_child(name).await? {
                        println!("Removed {}", name.trim());
                    } else {
                        println!("{} was not known", name.trim());
                    }
                }
            }
        }

        Command::List { group } => {
            let repo = open_repository(config)?;
            let week_id = week_clock.week_id(clock.now());
            match repo.spelling_list(group.trim(), week_id).await? {
                Some(list) if args.json => return print_json(&list),
                Some(list) => print_list(&list),
                None => println!("No spelling list for {} in week {}", group.trim(), week_id),
            }
        }

        Command::Practice { group } => {
            let repo = open_repository(config)?;
            let ledger = PracticeLedger::new(repo, Arc::new(clock));
            let week_id = week_clock.week_id(clock.now());
            let record = ledger.summary(group.trim(), week_id).await?;
            if args.json {
                return print_json(&record);
            }
            println!("{} - week {}", record.group, record.week_id);
            if record.children.is_empty() {
                println!("No practice logged yet");
            }
            for (child, practice) in &record.children {
                let last = practice
                    .last_practice_at
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<16} {:>3} attempt(s), last {}", child, practice.attempts, last);
            }
        }

        Command::Record {
            group,
            child,
            score,
            total,
        } => {
            let repo = open_repository(config)?;
            let ledger = PracticeLedger::new(repo, Arc::new(clock));
            let week_id = week_clock.week_id(clock.now());
            let attempts = ledger
                .record(group.trim(), week_id, child, *score, *total)
                .await?;
            let evaluation = evaluate(*score, *total);
            println!(
                "{} has practised {} time(s) this week. {}",
                child.trim(),
                attempts,
                evaluation.message
            );
        }

        Command::Cleanup => {
            let blobs = FsBlobStore::new(config.blob_root());
            let week_id = week_clock.week_id(clock.now());
            let report = cleanup_stale_audio(&blobs, week_id).await?;
            println!(
                "Removed {} week folder(s), deleted {} file(s), {} failure(s)",
                report.weeks_removed.len(),
                report.blobs_deleted,
                report.failures
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = load_config(&args);
    config.validate()?;

    tracing::debug!(
        data_dir = %config.data_dir().display(),
        zone = %config.week.reference_zone,
        "Starting Spellbee v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&args, &config).await {
        tracing::error!(error = %e, "Command failed");
        return Err(e.into());
    }
    Ok(())
}
