//! Postgres storage for administered sites and their markup revisions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitegen_core::BusinessRecord;
use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteRecord {
    pub site_id: Uuid,
    pub owner_id: String,
    pub slug: String,
    pub business_name: String,
    pub category: String,
    pub city: String,
    pub state: String,
    pub profile: Value,
    pub html: Option<String>,
    pub storage_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionRecord {
    pub revision_id: Uuid,
    pub site_id: Uuid,
    pub html: String,
    pub content_hash: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`SiteRepository::insert_site`].
#[derive(Debug, Clone)]
pub struct NewSite {
    pub owner_id: String,
    pub record: BusinessRecord,
    pub html: Option<String>,
    pub storage_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionOutcome {
    /// Markup matched the latest revision; nothing was written.
    Unchanged,
    Recorded(RevisionRecord),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("profile serialization error: {0}")]
    Profile(#[from] serde_json::Error),

    #[error("site not found: {0}")]
    NotFound(Uuid),
}

/// Hex blake3 digest used to detect identical markup.
pub fn content_hash(html: &str) -> String {
    blake3::hash(html.as_bytes()).to_hex().to_string()
}

#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn insert_site(&self, site: &NewSite) -> Result<SiteRecord, RepositoryError>;
    async fn fetch_site(&self, site_id: Uuid) -> Result<SiteRecord, RepositoryError>;
    async fn list_sites(&self, owner_id: Option<&str>) -> Result<Vec<SiteRecord>, RepositoryError>;
    async fn latest_revision(
        &self,
        site_id: Uuid,
    ) -> Result<Option<RevisionRecord>, RepositoryError>;
    /// Snapshot `html` as a new revision and make it the site's current markup.
    async fn record_revision(
        &self,
        site_id: Uuid,
        html: &str,
        note: Option<&str>,
        storage_path: Option<&str>,
    ) -> Result<RevisionOutcome, RepositoryError>;
    async fn delete_site(&self, site_id: Uuid) -> Result<Option<SiteRecord>, RepositoryError>;
    async fn delete_owner_sites(&self, owner_id: &str)
        -> Result<Vec<SiteRecord>, RepositoryError>;
    async fn slug_in_use(&self, slug: &str) -> Result<bool, RepositoryError>;
}

#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

const SITE_COLUMNS: &str = "site_id, owner_id, slug, business_name, category, city, state, \
     profile, html, storage_path, created_at, updated_at";

impl PostgresRepository {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Version and description of every migration compiled into this crate.
pub fn embedded_migrations() -> Vec<(i64, String)> {
    sqlx::migrate!("./migrations")
        .iter()
        .map(|migration| (migration.version, migration.description.to_string()))
        .collect()
}

fn site_from_row(row: &PgRow) -> Result<SiteRecord, sqlx::Error> {
    Ok(SiteRecord {
        site_id: row.try_get("site_id")?,
        owner_id: row.try_get("owner_id")?,
        slug: row.try_get("slug")?,
        business_name: row.try_get("business_name")?,
        category: row.try_get("category")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        profile: row.try_get("profile")?,
        html: row.try_get("html")?,
        storage_path: row.try_get("storage_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn revision_from_row(row: &PgRow) -> Result<RevisionRecord, sqlx::Error> {
    Ok(RevisionRecord {
        revision_id: row.try_get("revision_id")?,
        site_id: row.try_get("site_id")?,
        html: row.try_get("html")?,
        content_hash: row.try_get("content_hash")?,
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SiteRepository for PostgresRepository {
    async fn insert_site(&self, site: &NewSite) -> Result<SiteRecord, RepositoryError> {
        let profile = serde_json::to_value(&site.record)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sites (
                site_id, owner_id, slug, business_name, category, city, state,
                profile, html, storage_path
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&site.owner_id)
        .bind(site.record.slug())
        .bind(&site.record.business_name)
        .bind(&site.record.category)
        .bind(&site.record.city)
        .bind(&site.record.state)
        .bind(profile)
        .bind(&site.html)
        .bind(&site.storage_path)
        .fetch_one(&mut *tx)
        .await?;
        let record = site_from_row(&row)?;

        if let Some(html) = &site.html {
            sqlx::query(
                r#"
                INSERT INTO site_revisions (revision_id, site_id, html, content_hash, note)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(record.site_id)
            .bind(html)
            .bind(content_hash(html))
            .bind("initial import")
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    async fn fetch_site(&self, site_id: Uuid) -> Result<SiteRecord, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE site_id = $1"))
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(site_from_row(&row)?),
            None => Err(RepositoryError::NotFound(site_id)),
        }
    }

    async fn list_sites(&self, owner_id: Option<&str>) -> Result<Vec<SiteRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SITE_COLUMNS}
            FROM sites
            WHERE $1::TEXT IS NULL OR owner_id = $1
            ORDER BY created_at, site_id
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(site_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn latest_revision(
        &self,
        site_id: Uuid,
    ) -> Result<Option<RevisionRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT revision_id, site_id, html, content_hash, note, created_at
            FROM site_revisions
            WHERE site_id = $1
            ORDER BY created_at DESC, revision_id DESC
            LIMIT 1
            "#,
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(revision_from_row).transpose()?)
    }

    async fn record_revision(
        &self,
        site_id: Uuid,
        html: &str,
        note: Option<&str>,
        storage_path: Option<&str>,
    ) -> Result<RevisionOutcome, RepositoryError> {
        let hash = content_hash(html);
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent overrides of the same site.
        let exists = sqlx::query("SELECT site_id FROM sites WHERE site_id = $1 FOR UPDATE")
            .bind(site_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(site_id));
        }

        let latest_hash: Option<String> = sqlx::query_scalar(
            r#"
            SELECT content_hash FROM site_revisions
            WHERE site_id = $1
            ORDER BY created_at DESC, revision_id DESC
            LIMIT 1
            "#,
        )
        .bind(site_id)
        .fetch_optional(&mut *tx)
        .await?;
        if latest_hash.as_deref() == Some(hash.as_str()) {
            tx.rollback().await?;
            return Ok(RevisionOutcome::Unchanged);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO site_revisions (revision_id, site_id, html, content_hash, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING revision_id, site_id, html, content_hash, note, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(site_id)
        .bind(html)
        .bind(&hash)
        .bind(note)
        .fetch_one(&mut *tx)
        .await?;
        let revision = revision_from_row(&row)?;

        sqlx::query(
            r#"
            UPDATE sites
            SET html = $1,
                storage_path = COALESCE($2, storage_path),
                updated_at = now()
            WHERE site_id = $3
            "#,
        )
        .bind(html)
        .bind(storage_path)
        .bind(site_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RevisionOutcome::Recorded(revision))
    }

    async fn delete_site(&self, site_id: Uuid) -> Result<Option<SiteRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "DELETE FROM sites WHERE site_id = $1 RETURNING {SITE_COLUMNS}"
        ))
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(site_from_row).transpose()?)
    }

    async fn delete_owner_sites(
        &self,
        owner_id: &str,
    ) -> Result<Vec<SiteRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "DELETE FROM sites WHERE owner_id = $1 RETURNING {SITE_COLUMNS}"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(site_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn slug_in_use(&self, slug: &str) -> Result<bool, RepositoryError> {
        let in_use: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sites WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(in_use)
    }
}
