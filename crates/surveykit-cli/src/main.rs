mod wizard;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use surveykit_config::{AppConfig, ConfigLoader};
use surveykit_db::{ImageStore, SurveyStore, TableSnapshot, schema};
use surveykit_media::ImgbbClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surveykit", version, about = "Site equipment survey data platform")]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all schema migration steps and report what changed
    Migrate,
    /// Print the current column/index layout of a table
    Snapshot { table: String },
    /// Manage site rows
    Sites {
        #[command(subcommand)]
        action: SitesAction,
    },
    /// Upload an image to ImgBB and record it in the database
    Upload {
        file: PathBuf,
        /// Attach the uploaded image to this GTB module id
        #[arg(long)]
        module: Option<String>,
    },
    /// Interactive survey entry with draft resume
    Wizard,
}

#[derive(Subcommand)]
enum SitesAction {
    List,
    Add {
        name: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        client: Option<String>,
    },
    Rm {
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new(cli.config.clone()).load()?;

    match cli.command {
        Command::Migrate => cmd_migrate(&config),
        Command::Snapshot { table } => cmd_snapshot(&config, &table),
        Command::Sites { action } => cmd_sites(&config, action),
        Command::Upload { file, module } => cmd_upload(&config, &file, module.as_deref()).await,
        Command::Wizard => {
            let store = SurveyStore::open(&config.database.path)?;
            let draft_path = wizard::default_draft_path(&config.database.path);
            wizard::run_wizard(&store, &draft_path)
        }
    }
}

/// Open one connection, run every step, and print a per-table diff. The
/// connection drops at the end of this scope on success and failure alike.
fn cmd_migrate(config: &AppConfig) -> Result<()> {
    let conn = Connection::open(&config.database.path).with_context(|| {
        format!("failed to open database {}", config.database.path.display())
    })?;

    // Tables may not exist yet on a first run, hence the Option.
    let before: Vec<(&str, Option<TableSnapshot>)> = schema::TABLES
        .iter()
        .map(|t| (*t, TableSnapshot::capture(&conn, t).ok()))
        .collect();

    let report = schema::apply(&conn)?;
    println!(
        "migration finished: {} applied, {} skipped as already applied",
        report.applied(),
        report.skipped()
    );

    for (table, old) in before {
        let new = TableSnapshot::capture(&conn, table)
            .with_context(|| format!("table {table} missing after migration"))?;
        match old {
            None => println!("  {table}: created ({} columns)", new.columns.len()),
            Some(old) => {
                let diff = old.diff(&new);
                if diff.is_empty() {
                    continue;
                }
                for c in &diff.added_columns {
                    println!("  {table}: +column {c}");
                }
                for c in &diff.removed_columns {
                    println!("  {table}: -column {c}");
                }
                for i in &diff.added_indexes {
                    println!("  {table}: +index {i}");
                }
                for i in &diff.removed_indexes {
                    println!("  {table}: -index {i}");
                }
            }
        }
    }

    Ok(())
}

fn cmd_snapshot(config: &AppConfig, table: &str) -> Result<()> {
    let conn = Connection::open(&config.database.path).with_context(|| {
        format!("failed to open database {}", config.database.path.display())
    })?;
    let snapshot = TableSnapshot::capture(&conn, table)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_sites(config: &AppConfig, action: SitesAction) -> Result<()> {
    let store = SurveyStore::open(&config.database.path)?;
    match action {
        SitesAction::List => {
            let sites = store.list_sites()?;
            if sites.is_empty() {
                println!("no sites recorded");
                return Ok(());
            }
            for site in sites {
                let surveyed = site.surveyed_at.as_deref().unwrap_or("not surveyed");
                println!(
                    "{}  {}  {}  [{}]",
                    site.id,
                    site.name,
                    site.client.as_deref().unwrap_or("-"),
                    surveyed
                );
            }
        }
        SitesAction::Add {
            name,
            address,
            client,
        } => {
            let id = store.create_site(&name, address.as_deref(), client.as_deref())?;
            println!("{id}");
        }
        SitesAction::Rm { id } => {
            store.delete_site(&id)?;
            println!("removed {id}");
        }
    }
    Ok(())
}

async fn cmd_upload(config: &AppConfig, file: &Path, module: Option<&str>) -> Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let client = ImgbbClient::new(&config.imgbb)?;
    let uploaded = client.upload(filename, &bytes).await?;

    let images = ImageStore::open(&config.database.path)?;
    let image_id = images.insert_image(
        filename,
        &uploaded.url,
        uploaded.delete_url.as_deref(),
        uploaded.width,
        uploaded.height,
    )?;
    println!("{image_id}  {}", uploaded.url);

    if let Some(module_id) = module {
        let store = SurveyStore::open(&config.database.path)?;
        store.set_gtb_module_image(module_id, &image_id)?;
        println!("attached to gtb module {module_id}");
    }

    Ok(())
}
