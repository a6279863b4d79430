//! Tagging CLI: tag records and inspect the registry from the shell.
//!
//! Usage:
//!   tagging tag ticket:42 "billing, urgent" [--department sales]
//!   tagging find ticket --all billing --any urgent,vip
//!   tagging reconcile [--db path]

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tagging::{
    OpenStore, RecordQuery, RecordRef, Settings, SqliteStore, StaticPrincipal, Tag, TagNames,
    TaggingConfig, TaggingEngine, TaggingResult,
};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "tagging",
    version,
    about = "Tag records and keep per-tag usage counts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Act with the right to create tags in the default department
    #[arg(long, global = true)]
    elevated: bool,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach tags to a record
    Tag {
        /// Record as type:id
        record: String,
        /// Comma-separated tag names
        tags: String,
        #[arg(long)]
        department: Option<String>,
    },
    /// Detach tags from a record (all tags when none are given)
    Untag {
        /// Record as type:id
        record: String,
        /// Comma-separated tag names
        tags: Option<String>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Replace a record's tags
    Retag {
        /// Record as type:id
        record: String,
        /// Comma-separated tag names (empty string clears)
        tags: String,
        #[arg(long)]
        department: Option<String>,
    },
    /// Run the delete cascade for a record
    Forget {
        /// Record as type:id
        record: String,
    },
    /// Show a record's tags
    Show {
        /// Record as type:id
        record: String,
    },
    /// Tags in use by a record type
    Existing {
        record_type: String,
    },
    /// Find records of a type by tag
    Find {
        record_type: String,
        /// Record must have every one of these tags (repeatable)
        #[arg(long)]
        all: Vec<String>,
        /// Record must have at least one of these tags (repeatable)
        #[arg(long)]
        any: Vec<String>,
    },
    /// Flag a tag as suggested
    Suggest {
        name: String,
        #[arg(long)]
        department: Option<String>,
    },
    /// Clear a tag's suggested flag
    Unsuggest {
        name: String,
        #[arg(long)]
        department: Option<String>,
    },
    /// List suggested tags
    Suggested,
    /// List registry tags
    Tags {
        #[arg(long)]
        department: Option<String>,
    },
    /// Recount associations and repair drifted counters
    Reconcile,
}

/// Get the default database path (~/.local/share/tagging/tagging.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let tagging_dir = data_dir.join("tagging");
    std::fs::create_dir_all(&tagging_dir).ok();
    tagging_dir.join("tagging.db")
}

/// Explicit --config, else ~/.config/tagging/config.yaml when present
fn load_settings(path: Option<PathBuf>) -> Result<Settings, String> {
    let path = path.or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("tagging").join("config.yaml"))
            .filter(|p| p.exists())
    });
    match path {
        Some(path) => Settings::load(&path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e)),
        None => Ok(Settings::default()),
    }
}

fn open_engine(db: Option<PathBuf>, config: Option<PathBuf>) -> Result<TaggingEngine, String> {
    let settings = load_settings(config)?;
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    tracing::debug!(db = %db_path.display(), "opened tag store");
    Ok(TaggingEngine::new(Arc::new(store), TaggingConfig::new(settings)))
}

fn parse_record(text: &str) -> Result<RecordRef, String> {
    match text.split_once(':') {
        Some((record_type, id)) if !record_type.is_empty() && !id.is_empty() => {
            Ok(RecordRef::new(record_type, id))
        }
        _ => Err(format!("invalid record '{}': expected type:id", text)),
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Unwrap a result or print the error and bail out with exit code 1
macro_rules! try_or_exit {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    };
}

fn cmd_tag(engine: &TaggingEngine, principal: &StaticPrincipal, record: &str, tags: &str, department: Option<&str>) -> i32 {
    let record = try_or_exit!(parse_record(record));
    try_or_exit!(engine.tag(&record, tags, department, principal));
    println!("Tagged {}: {}", record, try_or_exit!(engine.tag_names(&record)).join(", "));
    0
}

fn cmd_untag(engine: &TaggingEngine, record: &str, tags: Option<&str>, department: Option<&str>) -> i32 {
    let record = try_or_exit!(parse_record(record));
    let removed = try_or_exit!(engine.untag(&record, tags.map(TagNames::from), department));
    println!("Removed {} tag(s) from {}", removed, record);
    0
}

fn cmd_retag(engine: &TaggingEngine, principal: &StaticPrincipal, record: &str, tags: &str, department: Option<&str>) -> i32 {
    let record = try_or_exit!(parse_record(record));
    try_or_exit!(engine.retag(&record, tags, department, principal));
    println!("Retagged {}: {}", record, try_or_exit!(engine.tag_names(&record)).join(", "));
    0
}

fn cmd_forget(engine: &TaggingEngine, record: &str) -> i32 {
    let record = try_or_exit!(parse_record(record));
    if try_or_exit!(engine.before_delete(&record)) {
        println!("Untagged {}", record);
    } else {
        println!("Kept tags of {} (untag_on_delete is off)", record);
    }
    0
}

fn cmd_show(engine: &TaggingEngine, json: bool, record: &str) -> i32 {
    let record = try_or_exit!(parse_record(record));
    let associations = try_or_exit!(engine.associations(&record));
    if json {
        return print_json(&associations);
    }
    if associations.is_empty() {
        println!("{} has no tags.", record);
        return 0;
    }
    println!("{:<24}  {:<24}  {:<12}  {}", "NAME", "SLUG", "DEPARTMENT", "TAGGED AT");
    println!("{}", "-".repeat(88));
    for a in associations {
        println!(
            "{:<24}  {:<24}  {:<12}  {}",
            a.tag_name,
            a.tag_slug,
            a.department,
            a.tagged_at.to_rfc3339()
        );
    }
    0
}

fn cmd_existing(engine: &TaggingEngine, json: bool, record_type: &str) -> i32 {
    let existing = try_or_exit!(engine.existing_tags(record_type));
    if json {
        return print_json(&existing);
    }
    if existing.is_empty() {
        println!("No tags in use for '{}'.", record_type);
        return 0;
    }
    println!("{:<24}  {:<24}  {:>7}", "SLUG", "NAME", "COUNT");
    println!("{}", "-".repeat(59));
    for tag in existing {
        println!("{:<24}  {:<24}  {:>7}", tag.slug, tag.name, tag.count);
    }
    0
}

fn cmd_find(engine: &TaggingEngine, json: bool, record_type: &str, all: &[String], any: &[String]) -> i32 {
    let mut query = RecordQuery::new(record_type);
    for list in all {
        query = query.with_all_tags(list.as_str());
    }
    for list in any {
        query = query.with_any_tag(list.as_str());
    }
    let records = try_or_exit!(engine.find(&query));
    if json {
        return print_json(&records);
    }
    for record in &records {
        println!("{}", record);
    }
    if records.is_empty() {
        println!("No matching records.");
    }
    0
}

fn cmd_set_suggested(engine: &TaggingEngine, name: &str, department: Option<&str>, suggested: bool) -> i32 {
    match engine.registry().set_suggested(name, department, suggested) {
        Ok(true) => {
            let verb = if suggested { "Suggested" } else { "Unsuggested" };
            println!("{} tag '{}'", verb, name);
            0
        }
        Ok(false) => {
            eprintln!("Error: tag '{}' not found", name);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_tags(json: bool, tags: TaggingResult<Vec<Tag>>) -> i32 {
    let tags = try_or_exit!(tags);
    if json {
        return print_json(&tags);
    }
    if tags.is_empty() {
        println!("No tags defined.");
        return 0;
    }
    println!("{:<12}  {:<24}  {:<24}  {:>7}  {}", "DEPARTMENT", "SLUG", "NAME", "COUNT", "SUGGESTED");
    println!("{}", "-".repeat(84));
    for tag in tags {
        println!(
            "{:<12}  {:<24}  {:<24}  {:>7}  {}",
            tag.department,
            tag.slug,
            tag.name,
            tag.count,
            if tag.suggested { "yes" } else { "" }
        );
    }
    0
}

fn cmd_reconcile(engine: &TaggingEngine, json: bool) -> i32 {
    let corrections = try_or_exit!(engine.registry().reconcile());
    if json {
        return print_json(&corrections);
    }
    if corrections.is_empty() {
        println!("All counters match.");
        return 0;
    }
    for c in &corrections {
        println!("{}/{}: {} -> {}", c.department, c.slug, c.previous, c.actual);
    }
    println!("Corrected {} counter(s)", corrections.len());
    0
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let engine = match open_engine(cli.db, cli.config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let user = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
    let principal = StaticPrincipal::new(user, cli.elevated);
    let json = cli.json;

    let code = match cli.command {
        Commands::Tag { record, tags, department } => {
            cmd_tag(&engine, &principal, &record, &tags, department.as_deref())
        }
        Commands::Untag { record, tags, department } => {
            cmd_untag(&engine, &record, tags.as_deref(), department.as_deref())
        }
        Commands::Retag { record, tags, department } => {
            cmd_retag(&engine, &principal, &record, &tags, department.as_deref())
        }
        Commands::Forget { record } => cmd_forget(&engine, &record),
        Commands::Show { record } => cmd_show(&engine, json, &record),
        Commands::Existing { record_type } => cmd_existing(&engine, json, &record_type),
        Commands::Find { record_type, all, any } => cmd_find(&engine, json, &record_type, &all, &any),
        Commands::Suggest { name, department } => {
            cmd_set_suggested(&engine, &name, department.as_deref(), true)
        }
        Commands::Unsuggest { name, department } => {
            cmd_set_suggested(&engine, &name, department.as_deref(), false)
        }
        Commands::Suggested => print_tags(json, engine.registry().suggested()),
        Commands::Tags { department } => {
            print_tags(json, engine.registry().list(department.as_deref()))
        }
        Commands::Reconcile => cmd_reconcile(&engine, json),
    };
    std::process::exit(code);
}
