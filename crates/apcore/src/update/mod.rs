//! The update engine.
//!
//! Worlds are processed one at a time. Each either turns out to be current,
//! gets installed, or is skipped with a reason; a skip never stops the batch.
//! After every successful install the configuration is saved, so an
//! interrupted run keeps the progress it made.

pub mod release;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::archive;
use crate::config::{ConfigError, ConfigStore, InstallStrategy, InstallationTarget, WorldEntry};
use crate::download::Downloader;
use crate::paths::{self, ScratchDirs};
use crate::source::{Repository, SourceClient, SourceError};
use crate::vcs::{self, VersionControl};

use release::ReleaseScan;

/// Why a world was skipped.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
    #[error("the GitHub repo {0} does not exist. Is there a typo?")]
    RepositoryNotFound(String),
    #[error("there are no releases for this world")]
    NoReleases,
    #[error("no release offers '{file_name}' or a .zip{}", prefix_note(.tag_prefix))]
    NoCandidateRelease {
        file_name: String,
        tag_prefix: Option<String>,
    },
    #[error("release {tag} has no downloadable asset")]
    NoAsset { tag: String },
    #[error("could not query the repository: {0}")]
    Source(SourceError),
    #[error("download failed: {0:#}")]
    Download(anyhow::Error),
    #[error("install failed: {0:#}")]
    Install(anyhow::Error),
    #[error("git checkout failed: {0:#}")]
    Checkout(anyhow::Error),
}

fn prefix_note(tag_prefix: &Option<String>) -> String {
    tag_prefix
        .as_deref()
        .map(|p| format!(" with a tag containing '{p}'"))
        .unwrap_or_default()
}

/// What happened to one world.
#[derive(Debug)]
pub enum WorldOutcome {
    UpToDate {
        version: String,
    },
    Updated {
        version: String,
        /// Non-fatal problem encountered on the way (e.g. a failed pull).
        warning: Option<String>,
    },
    Skipped(WorldError),
}

impl WorldOutcome {
    /// A new version was installed.
    pub fn is_updated(&self) -> bool {
        matches!(self, WorldOutcome::Updated { .. })
    }

    /// Nothing newer was found.
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, WorldOutcome::UpToDate { .. })
    }

    /// The world could not be updated this run.
    pub fn is_skipped(&self) -> bool {
        matches!(self, WorldOutcome::Skipped(_))
    }
}

/// Outcomes of one batch, in processing order.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub worlds: Vec<(String, WorldOutcome)>,
}

impl UpdateReport {
    /// Outcome for `name`, if it was part of the batch.
    pub fn outcome(&self, name: &str) -> Option<&WorldOutcome> {
        self.worlds
            .iter()
            .find(|(world, _)| world == name)
            .map(|(_, outcome)| outcome)
    }

    /// Number of worlds that got a new version.
    pub fn updated(&self) -> usize {
        self.worlds.iter().filter(|(_, o)| o.is_updated()).count()
    }

    /// Number of worlds that were already current.
    pub fn up_to_date(&self) -> usize {
        self.worlds.iter().filter(|(_, o)| o.is_up_to_date()).count()
    }

    /// Number of worlds that were skipped.
    pub fn skipped(&self) -> usize {
        self.worlds.iter().filter(|(_, o)| o.is_skipped()).count()
    }
}

/// Progress sink for a batch. All methods default to doing nothing.
pub trait Reporter {
    fn begin(&self, _total: usize) {}
    fn checking(&self, _world: &str) {}
    fn finished(&self, _world: &str, _outcome: &WorldOutcome) {}
    /// Problems outside any single world's outcome (e.g. a failed save).
    fn notice(&self, _message: &str) {}
    fn end(&self) {}
}

/// Reporter that discards everything.
pub struct SilentReporter;

impl Reporter for SilentReporter {}

static SILENT: SilentReporter = SilentReporter;

/// Brings tracked worlds up to date using the injected collaborators.
pub struct UpdateEngine<'a> {
    source: &'a dyn SourceClient,
    downloader: &'a dyn Downloader,
    vcs: &'a dyn VersionControl,
    store: &'a dyn ConfigStore,
    scratch: ScratchDirs,
    reporter: &'a dyn Reporter,
}

impl<'a> UpdateEngine<'a> {
    pub fn new(
        source: &'a dyn SourceClient,
        downloader: &'a dyn Downloader,
        vcs: &'a dyn VersionControl,
        store: &'a dyn ConfigStore,
        scratch: ScratchDirs,
    ) -> Self {
        Self {
            source,
            downloader,
            vcs,
            store,
            scratch,
            reporter: &SILENT,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Update every world in `names` that `target` tracks; other names are ignored.
    ///
    /// `target` is modified in place: each successfully updated world gets its
    /// new version, and the store is asked to save right after.
    pub fn update(&self, target: &mut InstallationTarget, names: &BTreeSet<String>) -> UpdateReport {
        let selected: Vec<String> = names
            .iter()
            .filter(|name| {
                let known = target.worlds.contains_key(name.as_str());
                if !known {
                    tracing::debug!("Ignoring unknown world '{}'", name);
                }
                known
            })
            .cloned()
            .collect();

        let mut downloads: Option<TempDir> = None;
        let mut report = UpdateReport::default();
        self.reporter.begin(selected.len());

        for name in selected {
            self.reporter.checking(&name);
            let Some(entry) = target.worlds.get(&name).cloned() else {
                continue;
            };

            let outcome = match self.update_world(target, &entry, &mut downloads) {
                Ok(outcome) => outcome,
                Err(e) => WorldOutcome::Skipped(e),
            };

            match &outcome {
                WorldOutcome::UpToDate { version } => {
                    tracing::info!("{} is already up to date ({})", name, version);
                }
                WorldOutcome::Updated { version, warning } => {
                    tracing::info!("Installed {} {}", name, version);
                    if let Some(warning) = warning {
                        tracing::warn!("{}: {}", name, warning);
                    }
                    if let Some(world) = target.worlds.get_mut(&name) {
                        world.version = Some(version.clone());
                    }
                    if let Err(e) = self.store.save(target) {
                        tracing::error!("Failed to save configuration after updating {}: {:#}", name, e);
                        self.reporter.notice(&format!(
                            "Could not save the configuration after updating {name}: {e:#}"
                        ));
                    }
                }
                WorldOutcome::Skipped(reason) => {
                    tracing::warn!("Skipping {}: {}", name, reason);
                }
            }

            self.reporter.finished(&name, &outcome);
            report.worlds.push((name, outcome));
        }

        self.reporter.end();
        report
    }

    fn update_world(
        &self,
        target: &InstallationTarget,
        entry: &WorldEntry,
        downloads: &mut Option<TempDir>,
    ) -> Result<WorldOutcome, WorldError> {
        entry.validate()?;
        let install_path = paths::install_path(target, entry).ok_or(if entry.strategy.is_packaged() {
            ConfigError::MissingFileName
        } else {
            ConfigError::MissingFolderName
        })?;

        let repo = self.source.repository(&entry.slug).map_err(|e| match e {
            SourceError::NotFound(slug) => WorldError::RepositoryNotFound(slug),
            other => WorldError::Source(other),
        })?;

        match entry.strategy {
            InstallStrategy::PackagedFile | InstallStrategy::PackagedArchive => {
                self.update_packaged(entry, &repo, &install_path, downloads)
            }
            InstallStrategy::SourceCheckout => self.update_checkout(entry, &repo, &install_path),
        }
    }

    fn update_packaged(
        &self,
        entry: &WorldEntry,
        repo: &Repository,
        install_path: &Path,
        downloads: &mut Option<TempDir>,
    ) -> Result<WorldOutcome, WorldError> {
        let file_name = entry.file_name().ok_or(ConfigError::MissingFileName)?;
        let releases = self.source.releases(repo).map_err(|e| match e {
            SourceError::NoReleases => WorldError::NoReleases,
            SourceError::NotFound(slug) => WorldError::RepositoryNotFound(slug),
            other => WorldError::Source(other),
        })?;

        let release =
            match release::scan_releases(&releases, entry.version(), entry.tag_prefix(), file_name) {
                ReleaseScan::UpToDate => {
                    return Ok(WorldOutcome::UpToDate {
                        version: entry.version().unwrap_or_default().to_string(),
                    })
                }
                ReleaseScan::NoMatch => {
                    return Err(WorldError::NoCandidateRelease {
                        file_name: file_name.to_string(),
                        tag_prefix: entry.tag_prefix().map(ToString::to_string),
                    })
                }
                ReleaseScan::Candidate(release) => release,
            };

        let asset = release::download_asset(release, file_name).ok_or_else(|| {
            WorldError::NoAsset {
                tag: release.tag_name.clone(),
            }
        })?;

        let dir = download_dir(downloads)?;
        let downloaded = self
            .downloader
            .fetch(&asset.download_url, &dir)
            .map_err(WorldError::Download)?;

        // A packaged world that was attached directly is already in its final
        // form, even when the entry expects it inside a zip.
        let is_direct_file = asset.name == file_name;
        if entry.strategy == InstallStrategy::PackagedArchive && !is_direct_file {
            release_symlink(install_path).map_err(WorldError::Install)?;
            let member = archive::extract_packaged(
                &downloaded,
                entry.packaged_extension(),
                Some(file_name),
                install_path,
            )
            .map_err(WorldError::Install)?;
            tracing::debug!("Installed member {} of {}", member, asset.name);
        } else {
            copy_into_place(&downloaded, install_path).map_err(WorldError::Install)?;
        }

        Ok(WorldOutcome::Updated {
            version: release.tag_name.clone(),
            warning: None,
        })
    }

    fn update_checkout(
        &self,
        entry: &WorldEntry,
        repo: &Repository,
        install_path: &Path,
    ) -> Result<WorldOutcome, WorldError> {
        let folder = entry.folder_name().ok_or(ConfigError::MissingFolderName)?;
        let clone_dir = self.scratch.clone_dir(&entry.slug);

        vcs::open_or_clone(self.vcs, &repo.clone_url, &clone_dir).map_err(WorldError::Checkout)?;
        let clone_dir = clone_dir
            .canonicalize()
            .map_err(|e| WorldError::Checkout(e.into()))?;

        let head = self
            .vcs
            .head_commit(&clone_dir)
            .map_err(WorldError::Checkout)?;
        if entry.version() == Some(head.as_str()) {
            return Ok(WorldOutcome::UpToDate { version: head });
        }

        let warning = match self.vcs.pull(&clone_dir) {
            Ok(()) => None,
            Err(e) => Some(format!("pull failed, linked the existing checkout instead: {e:#}")),
        };
        let head = self
            .vcs
            .head_commit(&clone_dir)
            .map_err(WorldError::Checkout)?;

        let world_dir = clone_dir.join("worlds").join(folder);
        if !world_dir.is_dir() {
            tracing::warn!("{:?} does not exist in the checkout", world_dir);
        }
        vcs::replace_symlink(&world_dir, install_path).map_err(WorldError::Install)?;

        Ok(WorldOutcome::Updated {
            version: head,
            warning,
        })
    }
}

fn download_dir(slot: &mut Option<TempDir>) -> Result<PathBuf, WorldError> {
    if let Some(dir) = slot {
        return Ok(dir.path().to_path_buf());
    }
    let dir = tempfile::Builder::new()
        .prefix("ap-updater-")
        .tempdir()
        .map_err(|e| WorldError::Download(e.into()))?;
    let path = dir.path().to_path_buf();
    *slot = Some(dir);
    Ok(path)
}

/// A world that switched from checkout to packaged still has a link at its
/// install path; drop it so the new file is not written into the clone.
fn release_symlink(path: &Path) -> anyhow::Result<()> {
    if std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink()) {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn copy_into_place(downloaded: &Path, install_path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    release_symlink(install_path)?;
    if let Some(parent) = install_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::copy(downloaded, install_path)
        .with_context(|| format!("Failed to copy {:?} to {:?}", downloaded, install_path))?;
    Ok(())
}
