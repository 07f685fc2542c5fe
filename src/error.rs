//! Error types for the provisioning strategies.
//!
//! Each strategy returns its own error enum. The engine inspects
//! [`FailureKind`] to decide whether a fallback is worth attempting instead
//! of relying on errors bubbling through unrelated strategies.

use std::path::PathBuf;

/// How a strategy failure should be treated by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retrying the same input can never succeed (e.g. an unparseable URL).
    Permanent,
    /// Network, HTTP or extraction trouble; another strategy may succeed.
    Transient,
}

/// Errors from downloading and unpacking a repository archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unsupported repository URL for archive download: {url}")]
    UnsupportedUrl { url: String },

    #[error("archive request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("archive request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to extract archive: {0}")]
    Extract(String),

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ArchiveError::UnsupportedUrl { .. } => FailureKind::Permanent,
            _ => FailureKind::Transient,
        }
    }
}

/// Errors from running git against the local mirror.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("failed to execute 'git {op}'. Is git installed? ({source})")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("git {op} failed: {stderr}")]
    Command { op: &'static str, stderr: String },

    #[error("unexpected output from git {op}: {output}")]
    Parse { op: &'static str, output: String },

    #[error("mirror I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from copying a static source directory.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("static source directory does not exist or is not a directory: {0}")]
    SourceMissing(PathBuf),

    #[error("invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to walk source directory: {0}")]
    Walk(#[from] ignore::Error),

    #[error("failed to copy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level provisioning failure. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to prepare target directory {path}: {source}")]
    TargetDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("static copy failed: {0}")]
    Copy(#[from] CopyError),

    #[error("repository clone failed: {0}")]
    Clone(#[from] MirrorError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
