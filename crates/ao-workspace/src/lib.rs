//! Workspace manager (§4.1): maps task ids to sandboxed directories under a
//! fixed root, and enumerates per-task artifacts for the UI.

use ao_domain::error::{Error, Result};
use ao_domain::task::{ArtifactKind, ArtifactView};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

const TEXT_EXTENSIONS: &[&str] = &["txt", "py", "js", "css", "html", "json", "csv", "md", "log", "yaml", "yml"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

#[derive(Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps every character outside `[A-Za-z0-9_.-]` to `_`.
    pub fn sanitize_task_id(task_id: &str) -> String {
        task_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
            .collect()
    }

    /// Resolve a task's workspace directory. When `create` is true, the
    /// directory is created idempotently (`mkdir -p` semantics).
    pub async fn resolve(&self, task_id: &str, create: bool) -> Result<PathBuf> {
        let sanitized = Self::sanitize_task_id(task_id);
        if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
            return Err(Error::UnsafePath(format!(
                "task id {task_id:?} sanitizes to an empty or reserved name"
            )));
        }

        let candidate = self.root.join(&sanitized);

        if create {
            tokio::fs::create_dir_all(&candidate).await?;
        }

        if create && !self.under_workspace_root(&candidate) {
            return Err(Error::UnsafePath(format!(
                "resolved path {} escapes workspace root {}",
                candidate.display(),
                self.root.display()
            )));
        }

        Ok(candidate)
    }

    /// Whether `path` is a strict descendant of the workspace root, resolved
    /// through symlinks where possible. Paths that do not yet exist are
    /// checked against the nearest existing ancestor.
    pub fn under_workspace_root(&self, path: &Path) -> bool {
        let canonical_root = match self.root.canonicalize() {
            Ok(r) => r,
            Err(_) => return false,
        };

        let resolved = if path.exists() {
            match path.canonicalize() {
                Ok(p) => p,
                Err(_) => return false,
            }
        } else {
            let mut existing = path;
            let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
            loop {
                if existing.exists() {
                    break;
                }
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name);
                        existing = parent;
                    }
                    _ => return false,
                }
            }
            let mut resolved = match existing.canonicalize() {
                Ok(p) => p,
                Err(_) => return false,
            };
            for part in tail.into_iter().rev() {
                resolved.push(part);
            }
            resolved
        };

        resolved.starts_with(&canonical_root) && resolved != canonical_root
    }

    /// Enumerate a task's workspace, classifying entries by extension and
    /// sorting by modification time descending. Unknown extensions are
    /// dropped.
    pub async fn artifacts_for_task(&self, task_id: &str) -> Result<Vec<ArtifactView>> {
        let dir = self.resolve(task_id, false).await?;
        let mut entries = Vec::new();

        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(kind) = classify_extension(&path) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            let modified_at: DateTime<Utc> = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
            let filename = entry.file_name().to_string_lossy().into_owned();
            let relative = filename.clone();
            entries.push(ArtifactView {
                kind,
                filename,
                path: relative,
                modified_at,
            });
        }

        entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(entries)
    }
}

fn classify_extension(path: &Path) -> Option<ArtifactKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "pdf" {
        Some(ArtifactKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(ArtifactKind::Image)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(ArtifactKind::Text)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(WorkspaceManager::sanitize_task_id("task/../escape"), "task___escape");
        assert_eq!(WorkspaceManager::sanitize_task_id("normal-task_1.2"), "normal-task_1.2");
    }

    #[tokio::test]
    async fn resolve_is_idempotent_and_under_root() {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());
        let p1 = manager.resolve("task-a", true).await.unwrap();
        let p2 = manager.resolve("task-a", true).await.unwrap();
        assert_eq!(p1, p2);
        assert!(manager.under_workspace_root(&p1));
    }

    #[tokio::test]
    async fn resolve_rejects_fully_sanitized_empty_id() {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());
        let err = manager.resolve("../", true).await.unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
    }

    #[tokio::test]
    async fn artifacts_classified_and_sorted_by_mtime_desc() {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());
        let task_dir = manager.resolve("task-a", true).await.unwrap();

        tokio::fs::write(task_dir.join("notes.md"), "hello").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        tokio::fs::write(task_dir.join("report.pdf"), b"pdf").await.unwrap();
        tokio::fs::write(task_dir.join("binary.exe"), b"bin").await.unwrap();

        let artifacts = manager.artifacts_for_task("task-a").await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].filename, "report.pdf");
        assert_eq!(artifacts[0].kind, ArtifactKind::Pdf);
        assert_eq!(artifacts[1].kind, ArtifactKind::Text);
    }

    #[tokio::test]
    async fn artifacts_for_unresolved_task_is_empty() {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());
        std::fs::create_dir_all(dir.path()).unwrap();
        let artifacts = manager.artifacts_for_task("never-created").await.unwrap();
        assert!(artifacts.is_empty());
    }
}
