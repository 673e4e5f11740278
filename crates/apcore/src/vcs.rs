//! Git working copies for worlds that are only published as source, and the
//! symbolic links that expose them to Archipelago.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Operations needed on a local clone.
pub trait VersionControl {
    /// Clone `url` into `dest` (which must not exist yet).
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Full hash of the checked-out commit.
    fn head_commit(&self, repo: &Path) -> Result<String>;

    /// Fast-forward the checked-out branch from its tracked remote.
    fn pull(&self, repo: &Path) -> Result<()>;
}

/// Reuse the clone at `dest` or create it. Returns `true` when a fresh clone was made.
pub fn open_or_clone(vcs: &dyn VersionControl, url: &str, dest: &Path) -> Result<bool> {
    if dest.join(".git").exists() {
        return Ok(false);
    }
    if dest.exists() && std::fs::read_dir(dest)?.next().is_some() {
        bail!("{:?} exists but is not a git working copy", dest);
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }

    tracing::info!("Cloning {} into {:?}", url, dest);
    vcs.clone_repo(url, dest)?;
    Ok(true)
}

/// Drives the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let shown = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let output = Command::new(&self.program)
            .args(&args)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| format!("Failed to run {:?}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", shown, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionControl for GitCli {
    fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        self.run([
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new(url),
            dest.as_os_str(),
        ])?;
        Ok(())
    }

    fn head_commit(&self, repo: &Path) -> Result<String> {
        let out = self.run([
            OsStr::new("-C"),
            repo.as_os_str(),
            OsStr::new("rev-parse"),
            OsStr::new("HEAD"),
        ])?;
        let hash = out.trim();
        if hash.is_empty() {
            bail!("git rev-parse returned nothing for {:?}", repo);
        }
        Ok(hash.to_string())
    }

    fn pull(&self, repo: &Path) -> Result<()> {
        self.run([
            OsStr::new("-C"),
            repo.as_os_str(),
            OsStr::new("pull"),
            OsStr::new("--ff-only"),
            OsStr::new("--quiet"),
        ])?;
        Ok(())
    }
}

/// Point `link` at `target`, replacing an existing symbolic link.
///
/// A regular file or directory at `link` is left alone and reported as an error.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            remove_symlink(link).with_context(|| format!("Failed to remove old link {:?}", link))?;
        }
        Ok(_) => bail!("{:?} exists and is not a symbolic link", link),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to inspect {:?}", link)),
    }

    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }

    make_symlink(target, link)
        .with_context(|| format!("Failed to symlink {:?} -> {:?}", link, target))?;
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn remove_symlink(link: &Path) -> std::io::Result<()> {
    std::fs::remove_file(link)
}

#[cfg(windows)]
fn remove_symlink(link: &Path) -> std::io::Result<()> {
    std::fs::remove_dir(link).or_else(|_| std::fs::remove_file(link))
}
