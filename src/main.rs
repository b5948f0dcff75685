use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{error, info, warn, Level};

use artifact_explorer::database::catalog::{QueryCatalog, ResultTable};
use artifact_explorer::error::{CommitError, PipelineError};
use artifact_explorer::ingest::fetcher::PageFetcher;
use artifact_explorer::ingest::http::HttpPageSource;
use artifact_explorer::pipeline::orchestrator::Orchestrator;
use artifact_explorer::utils::config::{save_to_env, Overrides, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Harvard Art Museums API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[arg(long, global = true)]
    api_url: Option<String>,

    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Minimum object count for a classification to be listed
    #[arg(long, global = true)]
    min_objects: Option<i64>,

    /// Object pages to request per classification
    #[arg(long, global = true)]
    pages: Option<u32>,

    #[arg(long, global = true)]
    page_size: Option<u32>,

    /// Request pages concurrently (`--parallel=false` to turn off)
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    parallel: Option<bool>,

    /// Fail a fetch that returns fewer records than the API reports
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    strict_totals: Option<bool>,

    /// JSON file replacing the built-in query catalog
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List classifications with enough objects to be worth ingesting
    Classifications {
        #[arg(long)]
        json: bool,
    },
    /// Fetch and normalize a classification without storing it
    Fetch {
        classification: String,
        /// Rows of each table to print
        #[arg(long, default_value_t = 10)]
        preview: usize,
    },
    /// Fetch, normalize and store a classification
    Ingest { classification: String },
    /// Show the classifications already stored
    Status,
    /// List the query catalog
    Queries,
    /// Run a catalog query by name or position
    Query {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved configuration
    Config {
        /// Write it to the env file for later runs
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let overrides = Overrides {
        api_key: args.api_key.clone(),
        api_url: args.api_url.clone(),
        db_path: args.db.clone(),
        min_object_count: args.min_objects,
        object_pages: args.pages,
        object_page_size: args.page_size,
        parallel: args.parallel,
        strict_totals: args.strict_totals,
        catalog_path: args.catalog.clone(),
    };
    let settings = Settings::resolve(&overrides, &args.env_file)?;

    run(args.command, &settings, &args.env_file)
}

fn run(command: Command, settings: &Settings, env_file: &Path) -> Result<()> {
    let catalog = match &settings.catalog_path {
        Some(path) => QueryCatalog::from_json_file(path)?,
        None => QueryCatalog::default(),
    };
    let needs_api = matches!(
        command,
        Command::Classifications { .. } | Command::Fetch { .. } | Command::Ingest { .. }
    );
    let api_key = if needs_api {
        settings.require_api_key()?
    } else {
        ""
    };
    let source = HttpPageSource::new(&settings.api_url, api_key);
    let fetcher = PageFetcher::new(source, settings.fetch_plan()).with_progress(progress_bar()?);
    let orchestrator = Orchestrator::new(fetcher, settings.db_path.clone(), catalog);

    match command {
        Command::Classifications { json } => {
            let classes = orchestrator
                .list_eligible_classifications(settings.min_object_count)
                .context("Failed to fetch classifications")?;
            let table = ResultTable::from_rows(&classes)?;
            print_table(&table, json)?;
        }
        Command::Fetch {
            classification,
            preview,
        } => {
            let batch = orchestrator
                .fetch_and_normalize(&classification)
                .with_context(|| format!("Failed to fetch '{classification}'"))?;
            println!(
                "{}: {} metadata, {} media, {} color rows",
                batch.classification,
                batch.metadata.len(),
                batch.media.len(),
                batch.colors.len()
            );
            let metadata = &batch.metadata[..preview.min(batch.metadata.len())];
            let media = &batch.media[..preview.min(batch.media.len())];
            let colors = &batch.colors[..preview.min(batch.colors.len())];
            println!("\nMetadata\n{}", ResultTable::from_rows(metadata)?);
            println!("\nMedia\n{}", ResultTable::from_rows(media)?);
            println!("\nColors\n{}", ResultTable::from_rows(colors)?);
        }
        Command::Ingest { classification } => match orchestrator.ingest(&classification) {
            Ok(counts) => println!(
                "Stored '{classification}': {} metadata, {} media, {} color rows",
                counts.metadata, counts.media, counts.colors
            ),
            Err(PipelineError::Commit(CommitError::AlreadyCommitted(name))) => {
                warn!("'{name}' is already stored; nothing was written");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Ingest of '{classification}' aborted"));
            }
        },
        Command::Status => {
            info!("Reading {:?}", orchestrator.db_path());
            let stored = orchestrator
                .stored_classifications()
                .context("Failed to read the store")?;
            if stored.is_empty() {
                println!("No classifications stored yet.");
            }
            for entry in stored {
                println!(
                    "{}: {} metadata, {} media, {} color rows",
                    entry.name, entry.rows.metadata, entry.rows.media, entry.rows.colors
                );
            }
        }
        Command::Queries => {
            for (position, query) in orchestrator.catalog().queries().iter().enumerate() {
                println!("{:>3}. {}", position + 1, query.name);
            }
        }
        Command::Query { name, json } => match orchestrator.run_catalog_query(&name) {
            Ok(table) => print_table(&table, json)?,
            Err(err) => error!("{err}"),
        },
        Command::Config { save } => show_config(settings, env_file, save)?,
    }

    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} pages",
    )?);
    Ok(bar)
}

fn print_table(table: &ResultTable, json: bool) -> Result<()> {
    if json {
        let rows: Vec<Value> = table
            .rows
            .iter()
            .map(|row| {
                Value::Object(
                    table
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect(),
                )
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("{table}");
    }
    Ok(())
}

fn show_config(settings: &Settings, env_file: &Path, save: bool) -> Result<()> {
    let masked = match &settings.api_key {
        Some(key) if key.chars().count() > 4 => {
            format!("{}…", key.chars().take(4).collect::<String>())
        }
        Some(_) => "set".to_string(),
        None => "not set".to_string(),
    };
    println!("api key: {masked}");
    println!("{}", serde_json::to_string_pretty(settings)?);
    if save {
        save_to_env(env_file, settings)?;
        info!("Saved settings to {:?}", env_file);
    }
    Ok(())
}
