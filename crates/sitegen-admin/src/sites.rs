use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde_json::Value;
use sitegen_core::config::Settings;
use sitegen_core::markup::has_doctype;
use sitegen_core::publish::{slug_prefix, Uploader};
use sitegen_core::validation::validate;
use sitegen_repository::{content_hash, NewSite, RevisionOutcome, SiteRecord, SiteRepository};
use tracing::{info, warn};

use crate::{
    connect_repository, connect_uploader, ImportArgs, ListArgs, OverrideArgs, PurgeArgs,
};

pub async fn handle_import(settings: &Settings, args: ImportArgs) -> Result<()> {
    let raw = read_text(&args.file).await?;
    let input: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", args.file.display()))?;

    let record = match validate(&input) {
        Ok(record) => record,
        Err(errors) => {
            for error in &errors {
                println!("  {}: {}", error.field, error.message);
            }
            bail!("{} failed validation with {} errors", args.file.display(), errors.len());
        }
    };

    let html = match &args.html {
        Some(path) => Some(read_text(path).await?),
        None => None,
    };
    if let Some(markup) = &html {
        if !has_doctype(markup) {
            warn!(file = ?args.html, "imported markup does not start with <!DOCTYPE html>");
        }
    }

    println!(
        "Site '{}' (slug {}) for owner {}{}",
        record.business_name,
        record.slug(),
        args.owner_id,
        if html.is_some() { " with initial markup" } else { "" }
    );

    if !args.execute {
        println!("Dry run: nothing written. Re-run with --execute to import.");
        return Ok(());
    }

    let repo = connect_repository(settings, args.skip_migrations).await?;
    let site = repo
        .insert_site(&NewSite {
            owner_id: args.owner_id,
            record,
            html,
            storage_path: None,
        })
        .await?;

    info!(site_id = %site.site_id, slug = %site.slug, "site imported");
    println!("Imported site {}", site.site_id);
    Ok(())
}

pub async fn handle_override(settings: &Settings, args: OverrideArgs) -> Result<()> {
    let html = read_text(&args.file).await?;
    if !has_doctype(&html) {
        warn!(file = %args.file.display(), "override markup does not start with <!DOCTYPE html>");
    }

    let repo = connect_repository(settings, args.skip_migrations).await?;
    let site = repo.fetch_site(args.site_id).await?;

    let hash = content_hash(&html);
    let latest = repo.latest_revision(site.site_id).await?;
    if latest.as_ref().map(|revision| revision.content_hash.as_str()) == Some(hash.as_str()) {
        println!(
            "Markup for {} is identical to its latest revision; nothing to do.",
            site.site_id
        );
        return Ok(());
    }

    println!(
        "Override {} ({}) with {} bytes{}",
        site.site_id,
        site.slug,
        html.len(),
        if args.upload { " and publish to the bucket" } else { "" }
    );

    if !args.execute {
        println!("Dry run: nothing written. Re-run with --execute to apply.");
        return Ok(());
    }

    let uploader = if args.upload {
        Some(connect_uploader(settings).await?)
    } else {
        None
    };

    match apply_override(&repo, uploader.as_ref(), &site, &html, args.note.as_deref()).await? {
        RevisionOutcome::Unchanged => println!(
            "Markup became identical to the latest revision concurrently; nothing recorded."
        ),
        RevisionOutcome::Recorded(revision) => {
            info!(
                site_id = %site.site_id,
                revision_id = %revision.revision_id,
                "markup overridden"
            );
            println!("Recorded revision {}", revision.revision_id);
        }
    }
    Ok(())
}

/// Upload (when an uploader is given) and record a revision. An upload that
/// ends up unrecorded is deleted again so the bucket holds no orphan.
async fn apply_override(
    repo: &dyn SiteRepository,
    uploader: Option<&Uploader>,
    site: &SiteRecord,
    html: &str,
    note: Option<&str>,
) -> Result<RevisionOutcome> {
    let receipt = match uploader {
        Some(uploader) => {
            let run_id = format!("override-{}", site.site_id);
            let receipt = uploader.upload(&site.slug, html, &run_id).await?;
            println!("Uploaded to {}", receipt.public_url);
            Some(receipt)
        }
        None => None,
    };
    let storage_path = receipt.as_ref().map(|receipt| receipt.storage_path.as_str());

    let outcome = repo
        .record_revision(site.site_id, html, note, storage_path)
        .await?;

    if let (RevisionOutcome::Unchanged, Some(uploader), Some(path)) =
        (&outcome, uploader, storage_path)
    {
        uploader
            .store()
            .delete_object(path)
            .await
            .with_context(|| format!("failed to remove unrecorded upload {path}"))?;
        warn!(
            site_id = %site.site_id,
            storage_path = path,
            "removed upload for unrecorded revision"
        );
    }
    Ok(outcome)
}

pub async fn handle_purge(settings: &Settings, args: PurgeArgs) -> Result<()> {
    let repo = connect_repository(settings, args.skip_migrations).await?;

    let targets = match (&args.site_id, &args.owner_id) {
        (Some(site_id), _) => vec![repo.fetch_site(*site_id).await?],
        (None, Some(owner_id)) => repo.list_sites(Some(owner_id.as_str())).await?,
        (None, None) => bail!("either --site-id or --owner-id is required"),
    };

    if targets.is_empty() {
        println!("No matching sites.");
        return Ok(());
    }
    println!("{}", site_table(&targets));

    let slugs: BTreeSet<String> = targets.iter().map(|site| site.slug.clone()).collect();
    let uploader = if args.delete_objects {
        Some(connect_uploader(settings).await?)
    } else {
        None
    };

    if !args.execute {
        if let Some(uploader) = &uploader {
            for slug in &slugs {
                let keys = uploader.store().list_prefix(&slug_prefix(slug)).await?;
                println!("  {} objects under {}", keys.len(), slug_prefix(slug));
            }
        }
        println!(
            "Dry run: {} sites would be deleted. Re-run with --execute to apply.",
            targets.len()
        );
        return Ok(());
    }

    let deleted = match (&args.site_id, &args.owner_id) {
        (Some(site_id), _) => repo.delete_site(*site_id).await?.into_iter().collect(),
        (None, Some(owner_id)) => repo.delete_owner_sites(owner_id).await?,
        (None, None) => Vec::new(),
    };
    info!(count = deleted.len(), "sites deleted");
    println!("Deleted {} sites.", deleted.len());

    if let Some(uploader) = uploader {
        for slug in &slugs {
            if repo.slug_in_use(slug).await? {
                warn!(slug = %slug, "slug still used by another site; keeping its objects");
                continue;
            }
            let removed = uploader.purge_slug(slug).await?;
            info!(slug = %slug, objects = removed.len(), "bucket objects deleted");
            println!("Deleted {} objects under {}", removed.len(), slug_prefix(slug));
        }
    }

    Ok(())
}

pub async fn handle_list(settings: &Settings, args: ListArgs) -> Result<()> {
    let repo = connect_repository(settings, args.skip_migrations).await?;
    let sites = repo.list_sites(args.owner_id.as_deref()).await?;

    if sites.is_empty() {
        println!("No sites found.");
    } else {
        println!("{}", site_table(&sites));
    }
    Ok(())
}

fn site_table(sites: &[SiteRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "site_id",
            "owner",
            "slug",
            "business",
            "location",
            "storage_path",
            "updated",
        ]);

    for site in sites {
        table.add_row(vec![
            site.site_id.to_string(),
            site.owner_id.clone(),
            site.slug.clone(),
            site.business_name.clone(),
            format!("{}, {}", site.city, site.state),
            site.storage_path.clone().unwrap_or_else(|| "-".into()),
            site.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sitegen_bucket::MemoryBucketStore;
    use sitegen_repository::{RepositoryError, RevisionRecord};
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Answers `record_revision` with a fixed outcome and remembers the paths it saw.
    struct FixedRevisions {
        unchanged: bool,
        paths: Mutex<Vec<Option<String>>>,
    }

    impl FixedRevisions {
        fn new(unchanged: bool) -> Self {
            Self {
                unchanged,
                paths: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SiteRepository for FixedRevisions {
        async fn insert_site(&self, _site: &NewSite) -> Result<SiteRecord, RepositoryError> {
            Err(RepositoryError::NotFound(Uuid::nil()))
        }

        async fn fetch_site(&self, site_id: Uuid) -> Result<SiteRecord, RepositoryError> {
            Err(RepositoryError::NotFound(site_id))
        }

        async fn list_sites(
            &self,
            _owner_id: Option<&str>,
        ) -> Result<Vec<SiteRecord>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn latest_revision(
            &self,
            _site_id: Uuid,
        ) -> Result<Option<RevisionRecord>, RepositoryError> {
            Ok(None)
        }

        async fn record_revision(
            &self,
            site_id: Uuid,
            html: &str,
            note: Option<&str>,
            storage_path: Option<&str>,
        ) -> Result<RevisionOutcome, RepositoryError> {
            self.paths
                .lock()
                .expect("paths lock")
                .push(storage_path.map(str::to_string));
            if self.unchanged {
                return Ok(RevisionOutcome::Unchanged);
            }
            Ok(RevisionOutcome::Recorded(RevisionRecord {
                revision_id: Uuid::new_v4(),
                site_id,
                html: html.to_string(),
                content_hash: content_hash(html),
                note: note.map(str::to_string),
                created_at: Utc::now(),
            }))
        }

        async fn delete_site(&self, _site_id: Uuid) -> Result<Option<SiteRecord>, RepositoryError> {
            Ok(None)
        }

        async fn delete_owner_sites(
            &self,
            _owner_id: &str,
        ) -> Result<Vec<SiteRecord>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn slug_in_use(&self, _slug: &str) -> Result<bool, RepositoryError> {
            Ok(false)
        }
    }

    fn site() -> SiteRecord {
        SiteRecord {
            site_id: Uuid::new_v4(),
            owner_id: "owner-1".into(),
            slug: "sharma-optics".into(),
            business_name: "Sharma Optics".into(),
            category: "Optician".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            profile: Value::Null,
            html: None,
            storage_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const MARKUP: &str = "<!DOCTYPE html><p>new</p>";

    #[tokio::test]
    async fn recorded_override_keeps_its_upload() {
        let store = MemoryBucketStore::default();
        let uploader = Uploader::new(Arc::new(store.clone()));
        let repo = FixedRevisions::new(false);

        let outcome = apply_override(&repo, Some(&uploader), &site(), MARKUP, Some("fix"))
            .await
            .expect("override");

        assert!(matches!(outcome, RevisionOutcome::Recorded(_)));
        assert_eq!(store.len().await, 1);
        let paths = repo.paths.lock().expect("paths lock").clone();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].as_deref().is_some_and(|path| path.starts_with("sharma-optics/")));
    }

    #[tokio::test]
    async fn unrecorded_override_removes_its_upload() {
        let store = MemoryBucketStore::default();
        let uploader = Uploader::new(Arc::new(store.clone()));
        let repo = FixedRevisions::new(true);

        let outcome = apply_override(&repo, Some(&uploader), &site(), MARKUP, None)
            .await
            .expect("override");

        assert_eq!(outcome, RevisionOutcome::Unchanged);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn override_without_upload_records_no_path() {
        let repo = FixedRevisions::new(false);

        apply_override(&repo, None, &site(), MARKUP, None)
            .await
            .expect("override");

        assert_eq!(*repo.paths.lock().expect("paths lock"), vec![None]);
    }
}
