//! Shallow, single-branch git mirror of the documentation repository.
//!
//! All git work shells out to the `git` executable, which picks up the
//! user's credentials, SSH keys and proxy settings for free.
//!
//! Whether a directory is a working clone is probed on every call and
//! never cached: the directory may be edited or wiped between runs.

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

use crate::error::MirrorError;

/// Outcome of a single synchronize pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// A pull was performed and succeeded.
    pub updated: bool,
    /// Commits HEAD was behind the fetched ref before pulling.
    pub behind_count: u64,
}

#[async_trait]
pub trait RepositoryMirror: Send + Sync {
    /// Depth-1 single-branch clone of `url` at `git_ref` into an empty
    /// `target_dir`.
    async fn clone_shallow(
        &self,
        url: &str,
        git_ref: &str,
        target_dir: &Path,
    ) -> Result<(), MirrorError>;

    /// `true` only when `target_dir` is the top level of a git work tree.
    /// Any detection failure yields `false`.
    async fn is_valid_clone(&self, target_dir: &Path) -> bool;

    /// Fetch, compare against the fetched ref and pull when behind.
    ///
    /// Failures are logged and reported as "not updated"; stale content is
    /// preferable to an unavailable search tool.
    async fn synchronize(&self, target_dir: &Path, git_ref: &str) -> SyncReport {
        match self.try_synchronize(target_dir, git_ref).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(
                    target_dir = %target_dir.display(),
                    error = %e,
                    "repository sync failed; serving existing content"
                );
                SyncReport::default()
            }
        }
    }

    /// Fallible core of [`synchronize`](RepositoryMirror::synchronize).
    async fn try_synchronize(
        &self,
        target_dir: &Path,
        git_ref: &str,
    ) -> Result<SyncReport, MirrorError>;
}

/// [`RepositoryMirror`] backed by the git command-line client.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(
        &self,
        op: &'static str,
        dir: Option<&Path>,
        args: &[&str],
    ) -> Result<Output, MirrorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        // Never block on a credential prompt in a background service.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|source| MirrorError::Spawn { op, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::Command {
                op,
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl RepositoryMirror for GitCli {
    async fn clone_shallow(
        &self,
        url: &str,
        git_ref: &str,
        target_dir: &Path,
    ) -> Result<(), MirrorError> {
        tokio::fs::create_dir_all(target_dir).await?;

        tracing::info!(url, git_ref, target_dir = %target_dir.display(), "cloning repository");
        let dest = target_dir.to_string_lossy();
        self.run(
            "clone",
            None,
            &[
                "clone",
                "--depth",
                "1",
                "--single-branch",
                "--branch",
                git_ref,
                url,
                dest.as_ref(),
            ],
        )
        .await?;
        tracing::info!(url, git_ref, "clone complete");
        Ok(())
    }

    async fn is_valid_clone(&self, target_dir: &Path) -> bool {
        if !target_dir.is_dir() {
            return false;
        }
        let Ok(output) = self
            .run(
                "rev-parse",
                Some(target_dir),
                &["rev-parse", "--show-toplevel"],
            )
            .await
        else {
            return false;
        };

        // rev-parse succeeds anywhere inside a work tree; only the top level
        // counts, otherwise a data dir nested in some other checkout passes.
        let toplevel = String::from_utf8_lossy(&output.stdout).trim().to_string();
        match (
            std::fs::canonicalize(&toplevel),
            std::fs::canonicalize(target_dir),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    async fn try_synchronize(
        &self,
        target_dir: &Path,
        git_ref: &str,
    ) -> Result<SyncReport, MirrorError> {
        self.run("fetch", Some(target_dir), &["fetch", "origin", git_ref])
            .await?;

        // FETCH_HEAD rather than origin/<ref>: a tag checkout has no
        // remote-tracking ref.
        let output = self
            .run(
                "rev-list",
                Some(target_dir),
                &["rev-list", "--count", "HEAD..FETCH_HEAD"],
            )
            .await?;
        let count = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let behind_count: u64 = count.parse().map_err(|_| MirrorError::Parse {
            op: "rev-list",
            output: count.clone(),
        })?;

        if behind_count == 0 {
            tracing::debug!(git_ref, "repository is up to date");
            return Ok(SyncReport {
                updated: false,
                behind_count,
            });
        }

        tracing::info!(git_ref, behind_count, "repository is behind remote; pulling");
        self.run(
            "pull",
            Some(target_dir),
            &["pull", "--ff-only", "origin", git_ref],
        )
        .await?;

        Ok(SyncReport {
            updated: true,
            behind_count,
        })
    }
}
