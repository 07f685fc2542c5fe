//! Strategy selection and orchestration for the data directory.
//!
//! | Source | Interval | Strategy |
//! |--------|----------|----------|
//! | none | - | leave the directory empty |
//! | `includeDir` | - | static copy, once |
//! | `gitUrl` | `0` | archive download, falling back to a shallow clone |
//! | `gitUrl` | `> 0` | shallow clone, then the [`UpdateScheduler`] |
//!
//! Build mode always starts from an empty directory. Runtime mode purges
//! when there is no source, when it is about to clone into something that
//! is not already a clone, or right before extracting an archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::archive::{ArchiveFetcher, HttpArchiveFetcher};
use crate::config::{ProvisioningConfig, SourceKind};
use crate::error::{FailureKind, ProvisionError};
use crate::mirror::{GitCli, RepositoryMirror};
use crate::scheduler::{SyncTarget, UpdateScheduler};
use crate::static_copy::{copy_tree, CopyStats};
use crate::target_dir;

/// When provisioning runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Ahead of time, producing a fresh snapshot.
    Build,
    /// At service startup, before the search tool accepts queries.
    Runtime,
}

/// The acquisition strategy picked for a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Empty,
    StaticCopy {
        source: PathBuf,
    },
    Archive {
        url: String,
        git_ref: String,
    },
    Mirror {
        url: String,
        git_ref: String,
        interval: Duration,
    },
}

impl Strategy {
    pub fn select(config: &ProvisioningConfig) -> Self {
        match (&config.source, config.refresh_interval()) {
            (SourceKind::None, _) => Strategy::Empty,
            (SourceKind::StaticDir { path }, _) => Strategy::StaticCopy {
                source: path.clone(),
            },
            (SourceKind::Repository { url, git_ref }, None) => Strategy::Archive {
                url: url.clone(),
                git_ref: git_ref.clone(),
            },
            (SourceKind::Repository { url, git_ref }, Some(interval)) => Strategy::Mirror {
                url: url.clone(),
                git_ref: git_ref.clone(),
                interval,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Empty => "empty",
            Strategy::StaticCopy { .. } => "static-copy",
            Strategy::Archive { .. } => "archive",
            Strategy::Mirror { .. } => "mirror",
        }
    }
}

/// What provisioning produced.
pub enum Provisioned {
    Empty,
    Copied(CopyStats),
    Archive,
    /// The archive failed and the clone fallback succeeded.
    ArchiveFallbackClone,
    /// A working clone exists. In runtime mode the scheduler is already
    /// started and must be kept alive (and stopped) by the caller.
    Mirror { scheduler: Option<UpdateScheduler> },
}

impl Provisioned {
    pub fn into_scheduler(self) -> Option<UpdateScheduler> {
        match self {
            Provisioned::Mirror { scheduler } => scheduler,
            _ => None,
        }
    }
}

impl std::fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provisioned::Empty => write!(f, "Empty"),
            Provisioned::Copied(stats) => write!(f, "Copied({:?})", stats),
            Provisioned::Archive => write!(f, "Archive"),
            Provisioned::ArchiveFallbackClone => write!(f, "ArchiveFallbackClone"),
            Provisioned::Mirror { scheduler } => {
                write!(f, "Mirror {{ scheduled: {} }}", scheduler.is_some())
            }
        }
    }
}

/// Drives one strategy to completion for a given configuration.
pub struct ProvisioningEngine {
    config: ProvisioningConfig,
    archive: Arc<dyn ArchiveFetcher>,
    mirror: Arc<dyn RepositoryMirror>,
}

impl ProvisioningEngine {
    /// Engine using the HTTP archive fetcher and the git CLI.
    pub fn new(config: ProvisioningConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(HttpArchiveFetcher::new()),
            Arc::new(GitCli::new()),
        )
    }

    pub fn with_backends(
        config: ProvisioningConfig,
        archive: Arc<dyn ArchiveFetcher>,
        mirror: Arc<dyn RepositoryMirror>,
    ) -> Self {
        Self {
            config,
            archive,
            mirror,
        }
    }

    pub fn mirror(&self) -> Arc<dyn RepositoryMirror> {
        self.mirror.clone()
    }

    /// Populate the target directory. Any error is fatal to startup.
    pub async fn provision(&self, mode: Mode) -> Result<Provisioned, ProvisionError> {
        let target = self.config.target_dir.as_path();
        let strategy = Strategy::select(&self.config);

        tracing::info!(
            strategy = strategy.name(),
            mode = ?mode,
            target_dir = %target.display(),
            "provisioning data directory"
        );

        if mode == Mode::Build {
            reset(target)?;
        }

        let outcome = match &strategy {
            Strategy::Empty => {
                if mode == Mode::Runtime {
                    reset(target)?;
                }
                Provisioned::Empty
            }
            Strategy::StaticCopy { source } => {
                ensure(target)?;
                let stats = self.copy_static(source, target).await?;
                Provisioned::Copied(stats)
            }
            Strategy::Archive { url, git_ref } => {
                if mode == Mode::Runtime {
                    reset(target)?;
                }
                self.archive_with_fallback(url, git_ref, target).await?
            }
            Strategy::Mirror {
                url,
                git_ref,
                interval,
            } => {
                self.ensure_clone(url, git_ref, target, mode).await?;
                let scheduler = (mode == Mode::Runtime).then(|| {
                    let mut scheduler = UpdateScheduler::new(
                        self.mirror.clone(),
                        SyncTarget {
                            target_dir: target.to_path_buf(),
                            git_ref: git_ref.clone(),
                        },
                        *interval,
                    );
                    scheduler.start();
                    scheduler
                });
                Provisioned::Mirror { scheduler }
            }
        };

        tracing::info!(strategy = strategy.name(), outcome = ?outcome, "provisioning complete");
        Ok(outcome)
    }

    async fn copy_static(&self, source: &Path, target: &Path) -> Result<CopyStats, ProvisionError> {
        let source = source.to_path_buf();
        let target = target.to_path_buf();
        let patterns = self.config.ignore_patterns.clone();

        let stats =
            tokio::task::spawn_blocking(move || copy_tree(&source, &target, &patterns)).await??;
        tracing::info!(copied = stats.copied, ignored = stats.ignored, "static copy finished");
        Ok(stats)
    }

    /// Archive first; on any archive failure purge and clone instead.
    async fn archive_with_fallback(
        &self,
        url: &str,
        git_ref: &str,
        target: &Path,
    ) -> Result<Provisioned, ProvisionError> {
        let err = match self.archive.fetch_archive(url, git_ref, target).await {
            Ok(()) => return Ok(Provisioned::Archive),
            Err(err) => err,
        };

        match err.kind() {
            FailureKind::Permanent => tracing::info!(
                url,
                reason = %err,
                "repository URL has no archive form; cloning instead"
            ),
            FailureKind::Transient => tracing::warn!(
                url,
                error = %err,
                "archive download failed; falling back to shallow clone"
            ),
        }

        // A partial extraction must not leak into the clone.
        reset(target)?;
        self.mirror.clone_shallow(url, git_ref, target).await?;
        Ok(Provisioned::ArchiveFallbackClone)
    }

    async fn ensure_clone(
        &self,
        url: &str,
        git_ref: &str,
        target: &Path,
        mode: Mode,
    ) -> Result<(), ProvisionError> {
        if mode == Mode::Runtime && self.mirror.is_valid_clone(target).await {
            tracing::info!(target_dir = %target.display(), "reusing existing clone");
            return Ok(());
        }
        reset(target)?;
        self.mirror.clone_shallow(url, git_ref, target).await?;
        Ok(())
    }
}

fn reset(path: &Path) -> Result<(), ProvisionError> {
    target_dir::reset(path).map_err(|source| ProvisionError::TargetDir {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure(path: &Path) -> Result<(), ProvisionError> {
    target_dir::ensure(path).map_err(|source| ProvisionError::TargetDir {
        path: path.to_path_buf(),
        source,
    })
}
