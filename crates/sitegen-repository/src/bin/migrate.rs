use anyhow::{Context, Result};
use sitegen_repository::PostgresRepository;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let database_url = env::var("DATABASE_URL")
        .or_else(|_| env::var("SITEGEN_DATABASE_URL"))
        .context("DATABASE_URL (or SITEGEN_DATABASE_URL) must be set")?;
    let repo = PostgresRepository::connect(&database_url, 5).await?;
    repo.run_migrations().await?;
    Ok(())
}
