//! Depth-first directory tree scanning.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ScanOptions;
use crate::error::Result;
use crate::matcher::FileMatch;

/// One entry produced by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Full path to the entry.
    pub path: PathBuf,

    /// Path relative to the scan root.
    pub relative: PathBuf,

    /// The scan root.
    pub root: PathBuf,

    /// Whether the entry is a directory (or a link to one).
    pub is_dir: bool,
}

impl ScanEntry {
    fn new(path: PathBuf, root: &Path, is_dir: bool) -> Self {
        let relative = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());

        Self {
            path,
            relative,
            root: root.to_path_buf(),
            is_dir,
        }
    }
}

/// Scan `dir` and return matching entries in depth-first order.
///
/// A directory's entry precedes the entries found beneath it; siblings keep
/// the order the OS lists them in. Symbolic links are followed for
/// classification. The first listing or stat error aborts the scan.
pub async fn scan(
    dir: impl AsRef<Path>,
    matcher: Option<&FileMatch>,
    options: &ScanOptions,
) -> Result<Vec<ScanEntry>> {
    let dir = dir.as_ref();
    let root = root_of(dir, options);
    let start = Instant::now();

    let entries = scan_dir(dir.to_path_buf(), &root, matcher, options).await?;

    debug!(
        "Scanned {} ({} entries) in {:?}",
        dir.display(),
        entries.len(),
        start.elapsed()
    );
    Ok(entries)
}

/// Blocking variant of [`scan`].
pub fn scan_blocking(
    dir: impl AsRef<Path>,
    matcher: Option<&FileMatch>,
    options: &ScanOptions,
) -> Result<Vec<ScanEntry>> {
    let dir = dir.as_ref();
    let root = root_of(dir, options);
    let start = Instant::now();

    let entries = scan_dir_blocking(dir, &root, matcher, options)?;

    debug!(
        "Scanned {} ({} entries) in {:?}",
        dir.display(),
        entries.len(),
        start.elapsed()
    );
    Ok(entries)
}

fn root_of(dir: &Path, options: &ScanOptions) -> PathBuf {
    options
        .root_dir
        .clone()
        .unwrap_or_else(|| dir.to_path_buf())
}

fn scan_dir<'a>(
    dir: PathBuf,
    root: &'a Path,
    matcher: Option<&'a FileMatch>,
    options: &'a ScanOptions,
) -> BoxFuture<'a, Result<Vec<ScanEntry>>> {
    async move {
        let mut entries = Vec::new();
        let mut listing = fs::read_dir(&dir).await?;

        while let Some(child) = listing.next_entry().await? {
            let path = child.path();
            if is_ignored(&path, options) {
                continue;
            }

            let metadata = fs::metadata(&path).await?;
            if metadata.is_dir() {
                let nested = scan_dir(path.clone(), root, matcher, options).await?;
                if keeps_dir(&path, matcher, options) {
                    entries.push(ScanEntry::new(path, root, true));
                }
                entries.extend(nested);
            } else if keeps_file(&path, matcher, options) {
                entries.push(ScanEntry::new(path, root, false));
            }
        }

        Ok(entries)
    }
    .boxed()
}

/// Walks in pre-order, which already places a directory right before its
/// subtree. walkdir reports symlink loops as errors.
fn scan_dir_blocking(
    dir: &Path,
    root: &Path,
    matcher: Option<&FileMatch>,
    options: &ScanOptions,
) -> Result<Vec<ScanEntry>> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_ignored(entry.path(), options));

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry?;
        let is_dir = entry.file_type().is_dir();
        let keep = if is_dir {
            keeps_dir(entry.path(), matcher, options)
        } else {
            keeps_file(entry.path(), matcher, options)
        };

        if keep {
            entries.push(ScanEntry::new(entry.into_path(), root, is_dir));
        }
    }

    Ok(entries)
}

fn is_ignored(path: &Path, options: &ScanOptions) -> bool {
    let ignored = options
        .ignore
        .as_ref()
        .is_some_and(|ignore| ignore.test_path(path));

    if options.debug {
        if ignored {
            debug!("Ignoring {}", path.display());
        } else {
            debug!("Visiting {}", path.display());
        }
    }
    ignored
}

fn keeps_dir(path: &Path, matcher: Option<&FileMatch>, options: &ScanOptions) -> bool {
    !options.skip_dirs && matcher.is_none_or(|m| m.test_path(path))
}

fn keeps_file(path: &Path, matcher: Option<&FileMatch>, options: &ScanOptions) -> bool {
    !options.skip_files && matcher.is_none_or(|m| m.test_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;
    use crate::matcher::compile;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("x.txt"), "x").unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        std::fs::write(temp_dir.path().join("sub/y.txt"), "y").unwrap();
        temp_dir
    }

    fn relative(entries: &[ScanEntry]) -> Vec<String> {
        let mut names: Vec<String> = entries
            .iter()
            .map(|e| e.relative.to_string_lossy().replace('\\', "/"))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_scan_lists_files_and_dirs() {
        let temp_dir = tree();
        let entries = scan(temp_dir.path(), None, &ScanOptions::new())
            .await
            .unwrap();

        assert_eq!(relative(&entries), vec!["sub", "sub/y.txt", "x.txt"]);
        let sub = entries.iter().find(|e| e.relative == Path::new("sub")).unwrap();
        assert!(sub.is_dir);
        assert_eq!(sub.root, temp_dir.path());
    }

    #[tokio::test]
    async fn test_dir_entry_precedes_its_children() {
        let temp_dir = tree();
        let entries = scan(temp_dir.path(), None, &ScanOptions::new())
            .await
            .unwrap();

        let sub = entries.iter().position(|e| e.relative == Path::new("sub"));
        let child = entries
            .iter()
            .position(|e| e.relative == Path::new("sub").join("y.txt"));
        assert_eq!(sub.map(|i| i + 1), child);
    }

    #[tokio::test]
    async fn test_skip_dirs_keeps_nested_files() {
        let temp_dir = tree();
        let entries = scan(temp_dir.path(), None, &ScanOptions::new().skip_dirs())
            .await
            .unwrap();

        assert_eq!(relative(&entries), vec!["sub/y.txt", "x.txt"]);
    }

    #[tokio::test]
    async fn test_skip_files() {
        let temp_dir = tree();
        let entries = scan(temp_dir.path(), None, &ScanOptions::new().skip_files())
            .await
            .unwrap();

        assert_eq!(relative(&entries), vec!["sub"]);
    }

    #[tokio::test]
    async fn test_ignore_prunes_subtree() {
        let temp_dir = tree();
        let options = ScanOptions::new().with_ignore(compile("sub").unwrap());
        let entries = scan(temp_dir.path(), None, &options).await.unwrap();

        assert_eq!(relative(&entries), vec!["x.txt"]);
    }

    #[tokio::test]
    async fn test_matcher_filters_entries() {
        let temp_dir = tree();
        std::fs::write(temp_dir.path().join("sub/z.md"), "z").unwrap();
        let matcher = compile("*.txt").unwrap();

        let entries = scan(temp_dir.path(), Some(&matcher), &ScanOptions::new())
            .await
            .unwrap();

        assert_eq!(relative(&entries), vec!["sub/y.txt", "x.txt"]);
    }

    #[tokio::test]
    async fn test_root_dir_anchors_relative_paths() {
        let temp_dir = tree();
        let options = ScanOptions::new().with_root_dir(temp_dir.path());
        let entries = scan(temp_dir.path().join("sub"), None, &options)
            .await
            .unwrap();

        assert_eq!(relative(&entries), vec!["sub/y.txt"]);
    }

    #[tokio::test]
    async fn test_missing_dir_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan(temp_dir.path().join("missing"), None, &ScanOptions::new()).await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_dir_is_descended() {
        let temp_dir = tree();
        std::os::unix::fs::symlink(temp_dir.path().join("sub"), temp_dir.path().join("link"))
            .unwrap();

        let entries = scan(temp_dir.path(), None, &ScanOptions::new())
            .await
            .unwrap();

        let link = entries.iter().find(|e| e.relative == Path::new("link")).unwrap();
        assert!(link.is_dir);
        assert!(
            entries
                .iter()
                .any(|e| e.relative == Path::new("link").join("y.txt"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_blocking_scan_reports_symlink_loop() {
        let temp_dir = tree();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("sub/loop")).unwrap();

        let result = scan_blocking(temp_dir.path(), None, &ScanOptions::new());
        match result {
            Err(FsError::Walk(e)) => assert!(e.loop_ancestor().is_some()),
            other => panic!("expected a loop error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_blocking_scan_skips_loop_inside_ignored_subtree() {
        let temp_dir = tree();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("sub/loop")).unwrap();
        let options = ScanOptions::new().with_ignore_globs("sub").unwrap();

        let entries = scan_blocking(temp_dir.path(), None, &options).unwrap();
        assert_eq!(relative(&entries), vec!["x.txt"]);
    }

    #[test]
    fn test_blocking_scan_order_and_filters() {
        let temp_dir = tree();
        std::fs::create_dir(temp_dir.path().join("sub/deeper")).unwrap();
        std::fs::write(temp_dir.path().join("sub/deeper/w.txt"), "w").unwrap();

        let entries = scan_blocking(temp_dir.path(), None, &ScanOptions::new()).unwrap();
        let deeper = entries
            .iter()
            .position(|e| e.relative == Path::new("sub").join("deeper"))
            .unwrap();
        assert_eq!(
            entries[deeper + 1].relative,
            Path::new("sub").join("deeper").join("w.txt")
        );
        assert!(entries[deeper].is_dir);

        let files = scan_blocking(temp_dir.path(), None, &ScanOptions::new().skip_dirs()).unwrap();
        assert_eq!(
            relative(&files),
            vec!["sub/deeper/w.txt", "sub/y.txt", "x.txt"]
        );
    }

    #[test]
    fn test_blocking_matches_async() {
        let temp_dir = tree();
        let options = ScanOptions::new().skip_dirs();

        let blocking = scan_blocking(temp_dir.path(), None, &options).unwrap();
        let awaited = tokio_test::block_on(scan(temp_dir.path(), None, &options)).unwrap();

        assert_eq!(relative(&blocking), relative(&awaited));
    }
}
