//! Workspace root with confined path resolution
//!
//! Every artifact path the pipeline handles is relative to a workspace root.
//! [`Workspace::resolve`] refuses anything that would land outside of it, and
//! [`Workspace::write_file`] snapshots the prior content before overwriting.

use crate::archive::archive;
use crate::error::ArchiveError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Result of a workspace write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Absolute path that was written
    pub path: PathBuf,
    /// Where the previous content was archived, if there was any
    pub backup: Option<PathBuf>,
}

/// A directory tree the pipeline writes into, plus the archive area for
/// superseded versions
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    archive_root: PathBuf,
}

impl Workspace {
    /// Create a workspace rooted at `root` archiving under `archive_root`
    pub fn new(root: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive_root: archive_root.into(),
        }
    }

    /// Workspace root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the archive area
    #[inline]
    #[must_use]
    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Resolve a workspace-relative path to an absolute one.
    ///
    /// Absolute inputs are accepted only when they already sit under the
    /// root. Parent-directory components are rejected outright.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ArchiveError> {
        let relative = relative.as_ref();
        let tail = if relative.is_absolute() {
            relative
                .strip_prefix(&self.root)
                .map_err(|_| ArchiveError::OutsideWorkspace(relative.to_path_buf()))?
        } else {
            relative
        };

        let mut resolved = self.root.clone();
        for component in tail.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(ArchiveError::OutsideWorkspace(relative.to_path_buf())),
            }
        }
        Ok(resolved)
    }

    /// Read a workspace file as UTF-8
    pub fn read_to_string(&self, relative: impl AsRef<Path>) -> Result<String, ArchiveError> {
        let path = self.resolve(relative)?;
        fs::read_to_string(&path).map_err(|e| ArchiveError::io(&path, e))
    }

    /// Whether a workspace-relative file exists
    #[must_use]
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.resolve(relative).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Write `contents` to a workspace file.
    ///
    /// An existing file is first archived into
    /// `archive_root/<bucket>/<parent of relative>`.
    pub fn write_file(
        &self,
        relative: impl AsRef<Path>,
        contents: &str,
        bucket: &str,
    ) -> Result<WriteRecord, ArchiveError> {
        let relative = relative.as_ref();
        let path = self.resolve(relative)?;

        let backup = if path.is_file() {
            Some(self.archive_existing(&path, bucket)?)
        } else {
            None
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        fs::write(&path, contents).map_err(|e| ArchiveError::io(&path, e))?;

        tracing::debug!(
            path = %path.display(),
            archived = backup.is_some(),
            bytes = contents.len(),
            "wrote workspace file"
        );
        Ok(WriteRecord { path, backup })
    }

    /// Archive an arbitrary file into `archive_root/<bucket>`
    pub fn archive_into(&self, file: &Path, bucket: &str) -> Result<PathBuf, ArchiveError> {
        let (dir, name) = split(file)?;
        archive(dir, &name, &self.archive_root.join(bucket))
    }

    fn archive_existing(&self, path: &Path, bucket: &str) -> Result<PathBuf, ArchiveError> {
        let rel_parent = path
            .parent()
            .and_then(|p| p.strip_prefix(&self.root).ok())
            .unwrap_or_else(|| Path::new(""));
        let dest = self.archive_root.join(bucket).join(rel_parent);
        let (dir, name) = split(path)?;
        archive(dir, &name, &dest)
    }
}

fn split(file: &Path) -> Result<(&Path, String), ArchiveError> {
    let name = file
        .file_name()
        .ok_or_else(|| ArchiveError::SourceMissing(file.to_path_buf()))?
        .to_string_lossy()
        .into_owned();
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(dir: &TempDir) -> Workspace {
        Workspace::new(dir.path().join("app"), dir.path().join("results"))
    }

    #[test]
    fn resolve_joins_relative() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let p = ws.resolve("src/./page.tsx").unwrap();
        assert_eq!(p, dir.path().join("app/src/page.tsx"));
    }

    #[test]
    fn resolve_rejects_parent_components() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        assert!(matches!(
            ws.resolve("../etc/passwd"),
            Err(ArchiveError::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn resolve_accepts_absolute_inside_root() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let inside = dir.path().join("app/a.ts");
        assert_eq!(ws.resolve(&inside).unwrap(), inside);
        assert!(ws.resolve("/definitely/elsewhere").is_err());
    }

    #[test]
    fn write_file_archives_previous_content() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);

        let first = ws.write_file("src/app/page.tsx", "one", "gen_code").unwrap();
        assert!(first.backup.is_none());

        let second = ws.write_file("src/app/page.tsx", "two", "gen_code").unwrap();
        let backup = second.backup.unwrap();

        assert_eq!(ws.read_to_string("src/app/page.tsx").unwrap(), "two");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "one");
        assert!(backup.starts_with(dir.path().join("results/gen_code/src/app")));
    }

    #[test]
    fn archive_into_bucket() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let file = dir.path().join("report.json");
        fs::write(&file, "{}").unwrap();

        let out = ws.archive_into(&file, "step/playwright").unwrap();
        assert_eq!(out, dir.path().join("results/step/playwright/report.json"));
    }
}
