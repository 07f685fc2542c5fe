//! Copy a local documentation directory into the data directory.
//!
//! Files are filtered twice: first by any `.gitignore` / `.ignore` files
//! found inside the source tree (directory-scoped, nested files may
//! re-include with `!pattern`), then by the configured `ignorePatterns`
//! globs matched against the path relative to the source root.

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::path::Path;

use crate::error::CopyError;

/// Summary of a static copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: usize,
    pub ignored: usize,
}

/// Copy every surviving file under `source_dir` to the same relative path
/// under `target_dir`, creating parent directories as needed.
///
/// A source whose files are all ignored is not an error.
pub fn copy_tree(
    source_dir: &Path,
    target_dir: &Path,
    ignore_patterns: &[String],
) -> Result<CopyStats, CopyError> {
    if !source_dir.is_dir() {
        return Err(CopyError::SourceMissing(source_dir.to_path_buf()));
    }
    let ignore_set = build_globset(ignore_patterns)?;

    let walker = WalkBuilder::new(source_dir)
        .hidden(false)
        .parents(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .follow_links(true)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut stats = CopyStats::default();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(source_dir).unwrap_or(path);

        if ignore_set.is_match(relative) {
            tracing::debug!(path = %relative.display(), "ignored by pattern");
            stats.ignored += 1;
            continue;
        }

        let dest = target_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| CopyError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::copy(path, &dest).map_err(|source| CopyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        stats.copied += 1;
    }

    Ok(stats)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, CopyError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| CopyError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| CopyError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn copies_and_filters_by_pattern() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "a.md", "alpha");
        write(src.path(), "b.tmp", "scratch");
        write(src.path(), "nested/c.tmp", "scratch");

        let stats = copy_tree(src.path(), dst.path(), &["*.tmp".to_string()]).unwrap();
        assert_eq!(stats, CopyStats { copied: 1, ignored: 2 });
        assert_eq!(fs::read_to_string(dst.path().join("a.md")).unwrap(), "alpha");
        assert!(!dst.path().join("b.tmp").exists());
        assert!(!dst.path().join("nested/c.tmp").exists());
    }

    #[test]
    fn honours_nested_gitignore_with_reinclude() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), ".gitignore", "*.log\n");
        write(src.path(), "root.log", "x");
        write(src.path(), "keep/.gitignore", "!important.log\n");
        write(src.path(), "keep/important.log", "kept");
        write(src.path(), "keep/other.log", "x");
        write(src.path(), "guide.md", "guide");

        copy_tree(src.path(), dst.path(), &[]).unwrap();
        assert!(dst.path().join("guide.md").exists());
        assert!(dst.path().join("keep/important.log").exists());
        assert!(!dst.path().join("root.log").exists());
        assert!(!dst.path().join("keep/other.log").exists());
    }

    #[test]
    fn copies_bytes_verbatim() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let bytes: Vec<u8> = (0..=255u8).collect();
        fs::create_dir_all(src.path().join("img")).unwrap();
        fs::write(src.path().join("img/raw.bin"), &bytes).unwrap();

        copy_tree(src.path(), dst.path(), &[]).unwrap();
        assert_eq!(fs::read(dst.path().join("img/raw.bin")).unwrap(), bytes);
    }

    #[test]
    fn skips_git_metadata() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), ".git/HEAD", "ref: refs/heads/main");
        write(src.path(), "doc.md", "doc");

        copy_tree(src.path(), dst.path(), &[]).unwrap();
        assert!(!dst.path().join(".git").exists());
        assert!(dst.path().join("doc.md").exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dst = TempDir::new().unwrap();
        let err = copy_tree(&dst.path().join("missing"), dst.path(), &[]).unwrap_err();
        assert!(matches!(err, CopyError::SourceMissing(_)));
    }

    #[test]
    fn everything_ignored_is_fine() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(src.path(), "only.tmp", "x");

        let stats = copy_tree(src.path(), dst.path(), &["*.tmp".to_string()]).unwrap();
        assert_eq!(stats.copied, 0);
        assert!(crate::target_dir::is_empty(dst.path()).unwrap());
    }
}
