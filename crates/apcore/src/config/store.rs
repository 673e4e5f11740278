//! YAML persistence for [`InstallationTarget`].

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::InstallationTarget;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ap_updater.yaml";

/// Anything that can durably record the configuration.
pub trait ConfigStore {
    fn save(&self, target: &InstallationTarget) -> Result<()>;
}

/// The configuration file on disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the configuration file.
    pub fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Load the configuration, or `None` if the file does not exist yet.
    pub fn load(&self) -> Result<Option<InstallationTarget>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let target = Self::parse(&content)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;
        Ok(Some(target))
    }

    pub fn parse(content: &str) -> Result<InstallationTarget> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(target: &InstallationTarget) -> Result<String> {
        Ok(serde_yaml::to_string(target)?)
    }
}

impl ConfigStore for ConfigFile {
    /// Write through a temporary file in the same directory, then rename over
    /// the old file so a crash never leaves a half-written configuration.
    fn save(&self, target: &InstallationTarget) -> Result<()> {
        let yaml = Self::to_yaml(target)?;
        let dir = self.directory();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {:?}", dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write {:?}", self.path))?;

        tracing::debug!("Saved configuration to {:?}", self.path);
        Ok(())
    }
}
