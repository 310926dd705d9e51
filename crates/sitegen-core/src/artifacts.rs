//! Local file layout shared by the server, the manual handoff flow and the
//! directory watcher.
//!
//! ```text
//! {output_root}/{slug}/{run_id}/index.html   generated markup
//! {output_root}/{slug}/{run_id}/spec.json    architect output
//! {tasks_root}/{run_id}.md                   handoff instructions
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use crate::business::BusinessRecord;
use crate::error::ArtifactError;
use crate::slug::is_valid_slug;
use crate::specification::Specification;

pub const MARKUP_FILE: &str = "index.html";
pub const SPEC_FILE: &str = "spec.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub output_root: PathBuf,
    pub tasks_root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(output_root: impl Into<PathBuf>, tasks_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            tasks_root: tasks_root.into(),
        }
    }

    pub fn run_dir(&self, slug: &str, run_id: &str) -> PathBuf {
        self.output_root.join(slug).join(run_id)
    }

    pub fn markup_path(&self, slug: &str, run_id: &str) -> PathBuf {
        self.run_dir(slug, run_id).join(MARKUP_FILE)
    }

    pub fn spec_path(&self, slug: &str, run_id: &str) -> PathBuf {
        self.run_dir(slug, run_id).join(SPEC_FILE)
    }

    pub fn task_path(&self, run_id: &str) -> PathBuf {
        self.tasks_root.join(format!("{run_id}.md"))
    }

    pub async fn write_markup(
        &self,
        slug: &str,
        run_id: &str,
        markup: &str,
    ) -> Result<PathBuf, ArtifactError> {
        check_segments(slug, run_id)?;
        let path = self.markup_path(slug, run_id);
        write_file(&path, markup.as_bytes()).await?;
        Ok(path)
    }

    pub async fn read_markup(&self, slug: &str, run_id: &str) -> Result<String, ArtifactError> {
        check_segments(slug, run_id)?;
        let path = self.markup_path(slug, run_id);
        match fs::read_to_string(&path).await {
            Ok(markup) => Ok(markup),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ArtifactError::Missing(path)),
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }

    pub async fn write_spec(
        &self,
        slug: &str,
        run_id: &str,
        spec: &Specification,
    ) -> Result<PathBuf, ArtifactError> {
        check_segments(slug, run_id)?;
        let path = self.spec_path(slug, run_id);
        let body = serde_json::to_vec_pretty(spec)?;
        write_file(&path, &body).await?;
        Ok(path)
    }

    pub async fn write_task(
        &self,
        run_id: &str,
        record: &BusinessRecord,
        spec: &Specification,
    ) -> Result<PathBuf, ArtifactError> {
        let slug = record.slug();
        check_segments(&slug, run_id)?;
        let path = self.task_path(run_id);
        let body = self.render_task(run_id, &slug, record, spec);
        write_file(&path, body.as_bytes()).await?;
        Ok(path)
    }

    /// Markdown handoff for building the site outside the request path.
    pub fn render_task(
        &self,
        run_id: &str,
        slug: &str,
        record: &BusinessRecord,
        spec: &Specification,
    ) -> String {
        let mut out = format!("# Site build task {run_id}\n\n");
        out.push_str(&format!("- Business: {}\n", record.business_name));
        out.push_str(&format!("- Slug: {slug}\n"));
        out.push_str(&format!("- Created: {}\n\n", Utc::now().to_rfc3339()));

        out.push_str("## Business profile\n\n");
        for line in record.summary_lines() {
            out.push_str(&format!("- {line}\n"));
        }

        out.push_str("\n## Specification\n\n");
        out.push_str(&spec.to_markdown());

        out.push_str("\n## Deliverable\n\n");
        out.push_str(&format!(
            "Write one self-contained HTML document starting with `<!DOCTYPE html>` to:\n\n    {}\n\n",
            self.markup_path(slug, run_id).display()
        ));
        out.push_str("Then publish it:\n\n");
        out.push_str(&format!(
            "    POST /api/upload\n    {{\"run_id\": \"{run_id}\", \"slug\": \"{slug}\"}}\n"
        ));
        out
    }
}

/// Run ids and slugs become directory names; reject anything that could
/// escape the layout.
pub fn check_segments(slug: &str, run_id: &str) -> Result<(), ArtifactError> {
    if !is_valid_slug(slug) {
        return Err(ArtifactError::InvalidSegment(slug.to_string()));
    }
    if !is_valid_run_id(run_id) {
        return Err(ArtifactError::InvalidSegment(run_id.to_string()));
    }
    Ok(())
}

/// ASCII alphanumerics, `-` and `_`, at most 64 characters.
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id.len() <= 64
        && run_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    fs::write(path, contents).await.map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architect::MockArchitect;

    fn record() -> BusinessRecord {
        BusinessRecord {
            business_name: "Sharma Optics".into(),
            address: "12 MG Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            category: "Optician".into(),
            description: "Family-run optician offering eye tests and designer frames.".into(),
            owner_name: None,
            phone: None,
            email: None,
            hours: None,
            website: None,
            photos: Vec::new(),
        }
    }

    #[test]
    fn paths_follow_convention() {
        let layout = ArtifactLayout::new("/srv/output", "/srv/tasks");
        assert_eq!(
            layout.markup_path("sharma-optics", "run-1"),
            PathBuf::from("/srv/output/sharma-optics/run-1/index.html")
        );
        assert_eq!(
            layout.task_path("run-1"),
            PathBuf::from("/srv/tasks/run-1.md")
        );
    }

    #[tokio::test]
    async fn markup_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ArtifactLayout::new(dir.path().join("out"), dir.path().join("tasks"));

        let path = layout
            .write_markup("sharma-optics", "run-1", "<!DOCTYPE html>")
            .await
            .expect("write");
        assert!(path.ends_with("sharma-optics/run-1/index.html"));

        let markup = layout
            .read_markup("sharma-optics", "run-1")
            .await
            .expect("read");
        assert_eq!(markup, "<!DOCTYPE html>");
    }

    #[tokio::test]
    async fn missing_markup_reports_expected_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ArtifactLayout::new(dir.path().join("out"), dir.path().join("tasks"));

        let err = layout
            .read_markup("sharma-optics", "absent")
            .await
            .expect_err("missing file");
        match err {
            ArtifactError::Missing(path) => {
                assert_eq!(path, layout.markup_path("sharma-optics", "absent"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn traversal_segments_are_rejected() {
        let layout = ArtifactLayout::new("out", "tasks");
        let err = layout
            .read_markup("sharma-optics", "../../etc")
            .await
            .expect_err("bad run id");
        assert!(matches!(err, ArtifactError::InvalidSegment(_)));

        let err = layout
            .write_markup("../x", "run", "")
            .await
            .expect_err("bad slug");
        assert!(matches!(err, ArtifactError::InvalidSegment(_)));
    }

    #[tokio::test]
    async fn task_file_describes_handoff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ArtifactLayout::new(dir.path().join("out"), dir.path().join("tasks"));
        let record = record();
        let spec = MockArchitect::specification(&record);

        let path = layout
            .write_task("run-7", &record, &spec)
            .await
            .expect("task");
        let body = std::fs::read_to_string(path).expect("read task");

        assert!(body.starts_with("# Site build task run-7"));
        assert!(body.contains("- Slug: sharma-optics"));
        assert!(body.contains("Palette: #1F3A5F"));
        assert!(body.contains(r#"{"run_id": "run-7", "slug": "sharma-optics"}"#));
    }
}
