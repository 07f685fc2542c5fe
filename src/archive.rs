//! Repository archive (tarball) download.
//!
//! Hosted git platforms serve a gzipped tarball of any ref at
//! `https://<host>/<owner>/<repo>/archive/<ref>.tar.gz`. Every entry in that
//! tarball sits under a single `<repo>-<ref>/` wrapper directory, which is
//! stripped during extraction so the data directory holds the repository
//! tree directly.
//!
//! The fetcher never purges the target directory and never retries. Any
//! failure is returned to the engine, which owns the fallback decision.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use crate::error::ArchiveError;

/// Downloads a repository snapshot into an (already empty) directory.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch_archive(
        &self,
        repository_url: &str,
        git_ref: &str,
        target_dir: &Path,
    ) -> Result<(), ArchiveError>;
}

/// `{owner, repo}` of a hosted repository, plus where it is hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub scheme: String,
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RepoCoordinates {
    pub fn archive_url(&self, git_ref: &str) -> String {
        format!(
            "{}://{}/{}/{}/archive/{}.tar.gz",
            self.scheme, self.host, self.owner, self.repo, git_ref
        )
    }
}

/// Recognise `https://host/owner/repo[.git]` and `git@host:owner/repo[.git]`.
///
/// Returns `None` for anything else (extra path segments, other schemes,
/// local paths), which callers treat as a permanent condition.
pub fn parse_repository_url(url: &str) -> Option<RepoCoordinates> {
    let url = url.trim();

    let (scheme, host, path) = if let Some(rest) = url.strip_prefix("https://") {
        let (host, path) = rest.split_once('/')?;
        ("https", host, path)
    } else if let Some(rest) = url.strip_prefix("http://") {
        let (host, path) = rest.split_once('/')?;
        ("http", host, path)
    } else if let Some(rest) = url.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        ("https", host, path)
    } else {
        return None;
    };

    if host.is_empty() || host.contains('@') {
        return None;
    }

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut segments = path.split('/');
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    if segments.next().is_some() {
        return None;
    }

    Some(RepoCoordinates {
        scheme: scheme.to_string(),
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Unpack a gzipped tarball into `target_dir`, dropping the first path
/// component of every entry. Returns the number of files written.
///
/// Nothing is ever written outside `target_dir`: entry paths must be plain
/// relative paths, symlink targets may not be absolute or climb with `..`,
/// and every destination's parent must resolve inside the directory.
pub fn extract_archive<R: Read>(reader: R, target_dir: &Path) -> Result<usize, ArchiveError> {
    fs::create_dir_all(target_dir)?;
    let root = fs::canonicalize(target_dir)?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut files = 0;

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::Extract(e.to_string()))?;
        let entry_type = entry.header().entry_type();

        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| ArchiveError::Extract(e.to_string()))?
            .into_owned();
        let Some(relative) = strip_wrapper(&path)? else {
            continue;
        };

        let dest = root.join(&relative);
        let parent = dest.parent().unwrap_or(root.as_path());
        ensure_inside(&root, parent)?;
        fs::create_dir_all(parent)?;
        ensure_inside(&root, parent)?;

        // A link left by an earlier entry must be replaced, not written through.
        if fs::symlink_metadata(&dest).is_ok_and(|m| !m.is_dir()) {
            fs::remove_file(&dest)?;
        }

        match entry_type {
            EntryType::Symlink => {
                let link = link_name(&entry, &path)?;
                let climbs = link
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
                if climbs {
                    return Err(ArchiveError::Extract(format!(
                        "refusing symlink {} -> {}",
                        path.display(),
                        link.display()
                    )));
                }
                unpack(&mut entry, &dest, &relative)?;
            }
            EntryType::Link => {
                let link = link_name(&entry, &path)?;
                let source = strip_wrapper(&link)?
                    .map(|rel| root.join(rel))
                    .ok_or_else(|| {
                        ArchiveError::Extract(format!("hard link to wrapper: {}", path.display()))
                    })?;
                ensure_inside(&root, &source)?;
                fs::hard_link(&source, &dest)?;
            }
            _ => {
                unpack(&mut entry, &dest, &relative)?;
                if entry_type.is_file() {
                    files += 1;
                }
            }
        }
    }

    Ok(files)
}

fn unpack<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    dest: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    entry
        .unpack(dest)
        .map_err(|e| ArchiveError::Extract(format!("{}: {}", relative.display(), e)))?;
    Ok(())
}

fn link_name<R: Read>(entry: &tar::Entry<'_, R>, path: &Path) -> Result<PathBuf, ArchiveError> {
    entry
        .link_name()
        .map_err(|e| ArchiveError::Extract(e.to_string()))?
        .map(|link| link.into_owned())
        .ok_or_else(|| ArchiveError::Extract(format!("link without target: {}", path.display())))
}

/// `path`, or its nearest existing ancestor, must resolve under `root`.
/// `root` is already canonical.
fn ensure_inside(root: &Path, path: &Path) -> Result<(), ArchiveError> {
    let existing = path
        .ancestors()
        .find(|p| fs::symlink_metadata(p).is_ok())
        .unwrap_or(root);
    let resolved = fs::canonicalize(existing).map_err(|e| {
        ArchiveError::Extract(format!("cannot resolve {}: {}", existing.display(), e))
    })?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(ArchiveError::Extract(format!(
            "refusing to write outside target directory: {}",
            path.display()
        )))
    }
}

/// Drop the wrapper directory. `None` means the entry is the wrapper itself.
fn strip_wrapper(path: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut relative = PathBuf::new();
    for component in path.components().skip(1) {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ArchiveError::Extract(format!(
                    "refusing unsafe archive path: {}",
                    path.display()
                )))
            }
        }
    }
    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

/// Streams archives over HTTP(S) with reqwest.
///
/// The blocking client is built and dropped on a blocking thread so the
/// response body can feed the gzip decoder directly without buffering the
/// whole payload in memory.
#[derive(Debug, Clone, Default)]
pub struct HttpArchiveFetcher;

impl HttpArchiveFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch_archive(
        &self,
        repository_url: &str,
        git_ref: &str,
        target_dir: &Path,
    ) -> Result<(), ArchiveError> {
        let coords =
            parse_repository_url(repository_url).ok_or_else(|| ArchiveError::UnsupportedUrl {
                url: repository_url.to_string(),
            })?;
        let url = coords.archive_url(git_ref);
        let target = target_dir.to_path_buf();

        tracing::info!(archive_url = %url, target_dir = %target.display(), "downloading archive");

        let files = tokio::task::spawn_blocking(move || download_and_extract(&url, &target))
            .await
            .map_err(|e| ArchiveError::Extract(format!("extraction task failed: {}", e)))??;

        tracing::info!(files, "archive extracted");
        Ok(())
    }
}

fn download_and_extract(url: &str, target: &Path) -> Result<usize, ArchiveError> {
    let http_err = |source| ArchiveError::Http {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("docs-harness/", env!("CARGO_PKG_VERSION")))
        .timeout(None)
        .build()
        .map_err(http_err)?;

    let response = client.get(url).send().map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ArchiveError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    extract_archive(response, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn coords(url: &str) -> RepoCoordinates {
        parse_repository_url(url).unwrap_or_else(|| panic!("should parse: {}", url))
    }

    #[test]
    fn parses_https_urls() {
        let c = coords("https://github.com/acme/docs");
        assert_eq!(c.host, "github.com");
        assert_eq!(c.owner, "acme");
        assert_eq!(c.repo, "docs");
        assert_eq!(
            c.archive_url("main"),
            "https://github.com/acme/docs/archive/main.tar.gz"
        );

        assert_eq!(coords("https://github.com/acme/docs.git").repo, "docs");
        assert_eq!(coords("https://github.com/acme/docs/").repo, "docs");
    }

    #[test]
    fn parses_scp_style_urls() {
        let c = coords("git@gitlab.com:acme/handbook.git");
        assert_eq!(c.host, "gitlab.com");
        assert_eq!(
            c.archive_url("v1.2"),
            "https://gitlab.com/acme/handbook/archive/v1.2.tar.gz"
        );
    }

    #[test]
    fn rejects_unrecognised_shapes() {
        assert!(parse_repository_url("/srv/repos/docs").is_none());
        assert!(parse_repository_url("file:///srv/repos/docs").is_none());
        assert!(parse_repository_url("https://github.com/acme").is_none());
        assert!(parse_repository_url("https://github.com/acme/docs/tree/main").is_none());
        assert!(parse_repository_url("ssh://git@github.com/acme/docs").is_none());
    }

    enum Item<'a> {
        File(&'a str),
        Symlink(&'a str),
    }

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let items: Vec<_> = entries
            .iter()
            .map(|(path, body)| (*path, Item::File(*body)))
            .collect();
        tarball_items(&items)
    }

    fn tarball_items(entries: &[(&str, Item<'_>)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder
            .append_data(&mut dir, "docs-main/", std::io::empty())
            .unwrap();

        for (path, item) in entries {
            let mut header = tar::Header::new_gnu();
            match item {
                Item::File(body) => {
                    header.set_size(body.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, body.as_bytes())
                        .unwrap();
                }
                Item::Symlink(target) => {
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    builder.append_link(&mut header, path, target).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extract_strips_wrapper_directory() {
        let tmp = TempDir::new().unwrap();
        let bytes = tarball(&[
            ("docs-main/README.md", "# Docs"),
            ("docs-main/guide/intro.md", "Intro"),
        ]);

        let files = extract_archive(bytes.as_slice(), tmp.path()).unwrap();
        assert_eq!(files, 2);
        assert_eq!(
            fs::read_to_string(tmp.path().join("README.md")).unwrap(),
            "# Docs"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("guide/intro.md")).unwrap(),
            "Intro"
        );
        assert!(!tmp.path().join("docs-main").exists());
    }

    #[test]
    fn extract_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let err = extract_archive(&b"not a tarball"[..], tmp.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Extract(_)));
    }

    #[test]
    fn extract_refuses_absolute_symlink() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let bytes = tarball_items(&[
            ("docs-main/link", Item::Symlink(outside.path().to_str().unwrap())),
            ("docs-main/link/evil.txt", Item::File("owned")),
        ]);

        let err = extract_archive(bytes.as_slice(), tmp.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Extract(_)));
        assert!(!outside.path().join("evil.txt").exists());
    }

    #[test]
    fn extract_refuses_parent_symlink() {
        let root = TempDir::new().unwrap();
        let target = root.path().join("data");
        let bytes = tarball_items(&[
            ("docs-main/up", Item::Symlink("..")),
            ("docs-main/up/evil.txt", Item::File("owned")),
        ]);

        let err = extract_archive(bytes.as_slice(), &target).unwrap_err();
        assert!(matches!(err, ArchiveError::Extract(_)));
        assert!(!root.path().join("evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn extract_does_not_follow_existing_links_out() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        let bytes = tarball(&[("docs-main/link/evil.txt", "owned")]);

        let err = extract_archive(bytes.as_slice(), tmp.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Extract(_)));
        assert!(!outside.path().join("evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn extract_keeps_links_within_target() {
        let tmp = TempDir::new().unwrap();
        let bytes = tarball_items(&[
            ("docs-main/guide/intro.md", Item::File("Intro")),
            ("docs-main/latest", Item::Symlink("guide")),
            ("docs-main/latest/extra.md", Item::File("Extra")),
        ]);

        let files = extract_archive(bytes.as_slice(), tmp.path()).unwrap();
        assert_eq!(files, 2);
        assert_eq!(
            fs::read_to_string(tmp.path().join("latest/intro.md")).unwrap(),
            "Intro"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("guide/extra.md")).unwrap(),
            "Extra"
        );
    }
}
