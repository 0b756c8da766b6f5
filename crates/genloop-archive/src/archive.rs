//! Versioned snapshotting of artifact files
//!
//! [`archive`] copies a source file into a destination directory. When the
//! destination already holds a file with the same name, that file is renamed
//! to `{stem}_{timestamp}{ext}` first. The timestamp is taken from the
//! existing file's own modification time, so the backup name depends only on
//! when that version was written, never on when it was displaced.

use crate::error::ArchiveError;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Timestamp layout embedded in archived file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Copy `source_dir/source_file` to `dest_dir/source_file`, keeping the
/// previous canonical copy under a timestamped name.
///
/// # Returns
/// The canonical destination path, which always holds the newest content.
///
/// # Errors
/// - `ArchiveError::SourceMissing` if the source file does not exist
/// - `ArchiveError::Io` for any directory creation, rename or copy failure
pub fn archive(
    source_dir: &Path,
    source_file: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ArchiveError> {
    let source = source_dir.join(source_file);
    if !source.is_file() {
        return Err(ArchiveError::SourceMissing(source));
    }

    let canonical = dest_dir.join(source_file);
    let parent = canonical.parent().unwrap_or(dest_dir);
    fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;

    if canonical.exists() {
        let rotated = rotate(&canonical)?;
        tracing::debug!(
            from = %canonical.display(),
            to = %rotated.display(),
            "rotated previous version"
        );
    }

    copy_preserving_mtime(&source, &canonical)?;
    tracing::debug!(
        source = %source.display(),
        dest = %canonical.display(),
        "archived"
    );
    Ok(canonical)
}

/// Rename an existing file to its versioned name within the same directory.
///
/// Returns the new path. Two versions written within the same second get a
/// numeric suffix instead of clobbering each other.
pub fn rotate(path: &Path) -> Result<PathBuf, ArchiveError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| ArchiveError::io(path, e))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut target = dir.join(versioned_name(path, modified, None));
    let mut counter = 1u32;
    while target.exists() {
        target = dir.join(versioned_name(path, modified, Some(counter)));
        counter += 1;
    }

    fs::rename(path, &target).map_err(|e| ArchiveError::io(path, e))?;
    Ok(target)
}

/// Compute `{stem}_{timestamp}[_{n}]{ext}` for `path` at `modified`
#[must_use]
pub fn versioned_name(path: &Path, modified: SystemTime, counter: Option<u32>) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let timestamp = DateTime::<Local>::from(modified).format(TIMESTAMP_FORMAT);
    let suffix = counter.map(|n| format!("_{n}")).unwrap_or_default();

    match path.extension() {
        Some(ext) => format!("{stem}_{timestamp}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{timestamp}{suffix}"),
    }
}

/// Copy a file and carry its modification time over to the copy
pub(crate) fn copy_preserving_mtime(source: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::copy(source, dest).map_err(|e| ArchiveError::io(dest, e))?;

    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| ArchiveError::io(source, e))?;
    let file = fs::File::options()
        .write(true)
        .open(dest)
        .map_err(|e| ArchiveError::io(dest, e))?;
    file.set_modified(modified)
        .map_err(|e| ArchiveError::io(dest, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn set_mtime(path: &Path, at: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(at).unwrap();
    }

    #[test]
    fn archive_into_empty_destination_copies() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("report.json"), "{}").unwrap();

        let canonical = archive(&src, "report.json", &dest).unwrap();

        assert_eq!(canonical, dest.join("report.json"));
        assert_eq!(fs::read_to_string(&canonical).unwrap(), "{}");
    }

    #[test]
    fn archive_twice_keeps_both_versions() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();

        fs::write(src.join("page.tsx"), "v1").unwrap();
        archive(&src, "page.tsx", &dest).unwrap();

        fs::write(src.join("page.tsx"), "v2").unwrap();
        archive(&src, "page.tsx", &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("page.tsx")).unwrap(), "v2");

        let backups: Vec<_> = fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().unwrap() != "page.tsx")
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "v1");
    }

    #[test]
    fn backup_name_uses_existing_file_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();

        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::write(dest.join("info.json"), "old").unwrap();
        set_mtime(&dest.join("info.json"), old);
        fs::write(src.join("info.json"), "new").unwrap();

        archive(&src, "info.json", &dest).unwrap();

        let expected = versioned_name(&dest.join("info.json"), old, None);
        assert_eq!(fs::read_to_string(dest.join(&expected)).unwrap(), "old");
    }

    #[test]
    fn same_second_versions_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();

        let fixed = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        for content in ["a", "b", "c"] {
            fs::write(src.join("x.txt"), content).unwrap();
            set_mtime(&src.join("x.txt"), fixed);
            archive(&src, "x.txt", &dest).unwrap();
        }

        let count = fs::read_dir(&dest).unwrap().count();
        assert_eq!(count, 3);
        assert_eq!(fs::read_to_string(dest.join("x.txt")).unwrap(), "c");
    }

    #[test]
    fn copy_carries_source_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "data").unwrap();
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        set_mtime(&src, at);

        let dst = dir.path().join("b.txt");
        copy_preserving_mtime(&src, &dst).unwrap();

        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), at);
    }

    #[test]
    fn missing_source_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("gone.json"), "keep").unwrap();

        let err = archive(dir.path(), "gone.json", &dest).unwrap_err();

        assert!(matches!(err, ArchiveError::SourceMissing(_)));
        assert_eq!(fs::read_to_string(dest.join("gone.json")).unwrap(), "keep");
    }

    #[test]
    fn versioned_name_without_extension() {
        let at = SystemTime::UNIX_EPOCH;
        let name = versioned_name(Path::new("/tmp/Makefile"), at, Some(2));
        assert!(name.starts_with("Makefile_"));
        assert!(name.ends_with("_2"));
    }
}
