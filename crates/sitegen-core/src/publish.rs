use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sitegen_bucket::{BucketError, BucketStore};
use tracing::info;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub storage_path: String,
    pub public_url: String,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Bucket key for a published document: `{slug}/{timestamp}/index.html`.
///
/// The timestamp carries microseconds so successive uploads for the same
/// slug land on distinct keys.
pub fn storage_key(slug: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}/index.html", slug, at.format("%Y%m%dT%H%M%S%6fZ"))
}

/// Prefix covering every published revision of a slug.
pub fn slug_prefix(slug: &str) -> String {
    format!("{slug}/")
}

#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn BucketStore>,
    last_micros: Arc<AtomicI64>,
}

impl Uploader {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            last_micros: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    /// Write `markup` under a fresh timestamped key. Never overwrites.
    pub async fn upload(
        &self,
        slug: &str,
        markup: &str,
        run_id: &str,
    ) -> Result<UploadReceipt, BucketError> {
        let uploaded_at = self.next_timestamp();
        let storage_path = storage_key(slug, uploaded_at);
        let size_bytes = markup.len();

        self.store
            .put_object(
                &storage_path,
                Bytes::copy_from_slice(markup.as_bytes()),
                HTML_CONTENT_TYPE,
            )
            .await?;

        let public_url = self.store.public_url(&storage_path);
        info!(run_id, slug, storage_path = %storage_path, size_bytes, "markup uploaded");

        Ok(UploadReceipt {
            storage_path,
            public_url,
            size_bytes,
            uploaded_at,
        })
    }

    /// Current time, bumped by a microsecond when it would repeat the
    /// previous upload's timestamp from this uploader.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut previous = self.last_micros.load(Ordering::Acquire);
        loop {
            let candidate = now.max(previous + 1);
            match self.last_micros.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(candidate).unwrap_or_else(Utc::now),
                Err(actual) => previous = actual,
            }
        }
    }

    /// Delete every object stored under `slug`, returning the removed keys.
    pub async fn purge_slug(&self, slug: &str) -> Result<Vec<String>, BucketError> {
        let keys = self.store.list_prefix(&slug_prefix(slug)).await?;
        for key in &keys {
            self.store.delete_object(key).await?;
        }
        Ok(keys)
    }
}
