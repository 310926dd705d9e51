//! Polls the output root for markup written outside the request path and
//! publishes each new `{slug}/{run_id}/index.html` exactly once.
//!
//! A file is only picked up once it is non-empty and its size and
//! modification time match the previous scan, so a writer that is still
//! flushing is left alone until it settles.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::artifacts::{check_segments, MARKUP_FILE};
use crate::error::ArtifactError;
use crate::pipeline::Pipeline;
use crate::publish::UploadReceipt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredMarkup {
    pub path: PathBuf,
    pub slug: String,
    pub run_id: String,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

impl DiscoveredMarkup {
    fn fingerprint(&self) -> (u64, SystemTime) {
        (self.size_bytes, self.modified)
    }
}

#[derive(Debug)]
pub enum WatchOutcome {
    Uploaded(UploadReceipt),
    DryRun,
    Failed(String),
}

#[derive(Debug)]
pub struct WatchReport {
    pub markup: DiscoveredMarkup,
    pub outcome: WatchOutcome,
}

pub struct DirectoryWatcher {
    root: PathBuf,
    seen: HashSet<PathBuf>,
    pending: HashMap<PathBuf, (u64, SystemTime)>,
}

impl DirectoryWatcher {
    /// Non-empty files already under `root` count as seen.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        let existing = discover(&root).await?;
        info!(root = %root.display(), existing = existing.len(), "watching for new markup");
        Ok(Self {
            root,
            seen: existing
                .into_iter()
                .filter(|found| found.size_bytes > 0)
                .map(|found| found.path)
                .collect(),
            pending: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settled files not reported before, oldest first. Each is marked seen.
    /// Files that are empty or changed since the last scan stay pending.
    pub async fn scan_new(&mut self) -> Result<Vec<DiscoveredMarkup>, ArtifactError> {
        let mut settled = Vec::new();
        let mut pending = HashMap::new();
        for found in discover(&self.root).await? {
            if self.seen.contains(&found.path) {
                continue;
            }
            let fingerprint = found.fingerprint();
            if found.size_bytes > 0 && self.pending.get(&found.path) == Some(&fingerprint) {
                settled.push(found);
            } else {
                debug!(
                    path = %found.path.display(),
                    size_bytes = found.size_bytes,
                    "markup not settled yet"
                );
                pending.insert(found.path, fingerprint);
            }
        }
        self.pending = pending;

        settled.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        self.seen.extend(settled.iter().map(|found| found.path.clone()));
        Ok(settled)
    }

    /// One polling pass. Uploads run sequentially; with `execute == false`
    /// new files are only reported.
    pub async fn poll_once(
        &mut self,
        pipeline: &Pipeline,
        execute: bool,
    ) -> Result<Vec<WatchReport>, ArtifactError> {
        let mut reports = Vec::new();
        for markup in self.scan_new().await? {
            let outcome = if execute {
                publish(pipeline, &markup).await
            } else {
                info!(slug = %markup.slug, run_id = %markup.run_id, "dry run: would upload");
                WatchOutcome::DryRun
            };
            reports.push(WatchReport { markup, outcome });
        }
        Ok(reports)
    }

    /// Poll forever at `interval`. Scan failures are logged and retried on
    /// the next tick.
    pub async fn run(mut self, pipeline: &Pipeline, interval: Duration, execute: bool) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.poll_once(pipeline, execute).await {
                Ok(reports) if reports.is_empty() => debug!("no new markup"),
                Ok(_) => {}
                Err(err) => warn!(root = %self.root.display(), error = %err, "scan failed"),
            }
        }
    }
}

async fn publish(pipeline: &Pipeline, markup: &DiscoveredMarkup) -> WatchOutcome {
    let contents = match fs::read_to_string(&markup.path).await {
        Ok(contents) => contents,
        Err(err) => {
            error!(path = %markup.path.display(), error = %err, "failed to read markup");
            return WatchOutcome::Failed(err.to_string());
        }
    };

    match pipeline.publish(&markup.slug, &markup.run_id, &contents).await {
        Ok(receipt) => {
            info!(
                slug = %markup.slug,
                run_id = %markup.run_id,
                public_url = %receipt.public_url,
                "published watched markup"
            );
            WatchOutcome::Uploaded(receipt)
        }
        Err(err) => {
            error!(slug = %markup.slug, run_id = %markup.run_id, error = %err, "upload failed");
            WatchOutcome::Failed(err.message)
        }
    }
}

/// Every `{slug}/{run_id}/index.html` under `root`. A missing root yields nothing.
async fn discover(root: &Path) -> Result<Vec<DiscoveredMarkup>, ArtifactError> {
    let mut found = Vec::new();
    for slug_dir in subdirectories(root).await? {
        let Some(slug) = file_name(&slug_dir) else { continue };
        let run_dirs = match subdirectories(&slug_dir).await {
            Ok(dirs) => dirs,
            Err(err) => {
                warn!(path = %slug_dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };
        for run_dir in run_dirs {
            let Some(run_id) = file_name(&run_dir) else { continue };
            if check_segments(&slug, &run_id).is_err() {
                continue;
            }
            let path = run_dir.join(MARKUP_FILE);
            let meta = match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            found.push(DiscoveredMarkup {
                path,
                slug: slug.clone(),
                run_id,
                size_bytes: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }
    Ok(found)
}

async fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_err(source)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if entry.file_type().await.map_err(io_err)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}
