mod sites;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use sitegen_bucket::S3BucketStore;
use sitegen_core::config::Settings;
use sitegen_core::publish::Uploader;
use sitegen_repository::PostgresRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sitegen administrative tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a business profile (and optional markup) as a new site
    Import(ImportArgs),
    /// Replace a site's markup, keeping the previous version as a revision
    Override(OverrideArgs),
    /// Delete sites, their revisions and optionally their bucket objects
    Purge(PurgeArgs),
    /// Show sites in a table
    List(ListArgs),
    /// Publish markup that appears under an output directory
    Watch(WatchArgs),
    /// Apply embedded database migrations
    Migrate(MigrateArgs),
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[arg(long)]
    owner_id: String,
    /// Business profile JSON
    #[arg(long)]
    file: PathBuf,
    /// Initial markup for the site
    #[arg(long)]
    html: Option<PathBuf>,
    /// Apply changes instead of running in dry-run mode
    #[arg(long)]
    execute: bool,
    /// Skip running migrations before touching the database
    #[arg(long)]
    skip_migrations: bool,
}

#[derive(Args, Debug)]
struct OverrideArgs {
    #[arg(long)]
    site_id: Uuid,
    /// Replacement markup
    #[arg(long)]
    file: PathBuf,
    #[arg(long)]
    note: Option<String>,
    /// Also publish the markup to the bucket
    #[arg(long)]
    upload: bool,
    #[arg(long)]
    execute: bool,
    #[arg(long)]
    skip_migrations: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["site_id", "owner_id"])))]
struct PurgeArgs {
    #[arg(long)]
    site_id: Option<Uuid>,
    #[arg(long)]
    owner_id: Option<String>,
    /// Also delete every bucket object under each site's slug
    #[arg(long)]
    delete_objects: bool,
    #[arg(long)]
    execute: bool,
    #[arg(long)]
    skip_migrations: bool,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    owner_id: Option<String>,
    #[arg(long)]
    skip_migrations: bool,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Defaults to SITEGEN_OUTPUT_ROOT
    #[arg(long)]
    dir: Option<PathBuf>,
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,
    /// Upload new files instead of only reporting them
    #[arg(long)]
    execute: bool,
}

#[derive(Args, Debug)]
struct MigrateArgs {
    #[arg(long)]
    execute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Import(args) => sites::handle_import(&settings, args).await,
        Command::Override(args) => sites::handle_override(&settings, args).await,
        Command::Purge(args) => sites::handle_purge(&settings, args).await,
        Command::List(args) => sites::handle_list(&settings, args).await,
        Command::Watch(args) => watch::handle_watch(&settings, args).await,
        Command::Migrate(args) => handle_migrate(&settings, args).await,
    }
}

async fn handle_migrate(settings: &Settings, args: MigrateArgs) -> Result<()> {
    let migrations = sitegen_repository::embedded_migrations();
    for (version, description) in &migrations {
        println!("  {version:>4}  {description}");
    }

    if !args.execute {
        println!(
            "Dry run: {} embedded migrations. Re-run with --execute to apply.",
            migrations.len()
        );
        return Ok(());
    }

    connect_repository(settings, false).await?;
    println!("Migrations applied.");
    Ok(())
}

pub(crate) async fn connect_repository(
    settings: &Settings,
    skip_migrations: bool,
) -> Result<PostgresRepository> {
    let database_url = settings.require_database_url()?;
    let repo = PostgresRepository::connect(database_url, 5)
        .await
        .context("failed to connect to database")?;

    if skip_migrations {
        info!("Skipping migrations at user request");
    } else {
        repo.run_migrations().await?;
    }

    Ok(repo)
}

pub(crate) async fn connect_uploader(settings: &Settings) -> Result<Uploader> {
    let config = settings.require_storage()?.clone();
    let store = S3BucketStore::new(config)
        .await
        .context("failed to configure bucket store")?;
    Ok(Uploader::new(Arc::new(store)))
}
