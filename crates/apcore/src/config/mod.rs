//! Tracked-world configuration.
//!
//! The on-disk layout is a small YAML document:
//!
//! ```yaml
//! ap_path: /home/user/Archipelago
//! ap_type: source
//! github_token: null
//! worlds:
//!   Alpha:
//!     slug: someone/alpha-world
//!     type: apworld
//!     filename: alpha.apworld
//!     foldername: null
//!     version: v2
//! ```

pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

pub use store::{ConfigFile, ConfigStore};

/// Extension used for packaged worlds when a file name carries none.
pub const PACKAGED_EXTENSION: &str = "apworld";

/// Where the Archipelago installation keeps its worlds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// Source checkout: `<root>/worlds/`
    #[default]
    Source,
    /// Frozen build: `<root>/lib/worlds/`
    Compiled,
    /// Custom worlds folder: `<root>/custom_worlds/`
    Custom,
}

impl InstallMode {
    pub const ALL: [InstallMode; 3] = [
        InstallMode::Source,
        InstallMode::Compiled,
        InstallMode::Custom,
    ];

    /// Human-readable description for menus.
    pub fn label(self) -> &'static str {
        match self {
            InstallMode::Source => "Archipelago/worlds",
            InstallMode::Compiled => "Archipelago/lib/worlds",
            InstallMode::Custom => "Archipelago/custom_worlds",
        }
    }
}

/// How a world is obtained from its repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallStrategy {
    /// A standalone `.apworld` attached to a release.
    #[serde(rename = "apworld")]
    PackagedFile,
    /// An `.apworld` inside a zip attached to a release.
    #[serde(rename = "apworld_zip")]
    PackagedArchive,
    /// No releases; a folder of a git checkout is linked into place.
    #[serde(rename = "git_only")]
    SourceCheckout,
}

impl InstallStrategy {
    pub const ALL: [InstallStrategy; 3] = [
        InstallStrategy::PackagedFile,
        InstallStrategy::PackagedArchive,
        InstallStrategy::SourceCheckout,
    ];

    pub fn is_packaged(self) -> bool {
        !matches!(self, InstallStrategy::SourceCheckout)
    }

    pub fn label(self) -> &'static str {
        match self {
            InstallStrategy::PackagedFile => ".apworld file, separate download",
            InstallStrategy::PackagedArchive => ".apworld file, inside a zip",
            InstallStrategy::SourceCheckout => "Git repo only",
        }
    }

    /// Short name matching the serialized form.
    pub fn key(self) -> &'static str {
        match self {
            InstallStrategy::PackagedFile => "apworld",
            InstallStrategy::PackagedArchive => "apworld_zip",
            InstallStrategy::SourceCheckout => "git_only",
        }
    }
}

/// Validation failures for the configuration record.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{0}' is not a GitHub slug (expected 'owner/repo')")]
    InvalidSlug(String),
    #[error("packaged worlds need a file name")]
    MissingFileName,
    #[error("git worlds need a folder name")]
    MissingFolderName,
    #[error("a world named '{0}' already exists")]
    DuplicateWorld(String),
    #[error("no world named '{0}'")]
    UnknownWorld(String),
    #[error("world names cannot be empty")]
    EmptyName,
}

/// One tracked world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldEntry {
    /// GitHub `owner/repo`.
    pub slug: String,
    #[serde(rename = "type")]
    pub strategy: InstallStrategy,
    #[serde(rename = "filename", default)]
    pub file_name: Option<String>,
    #[serde(rename = "foldername", default)]
    pub folder_name: Option<String>,
    /// Only releases whose tag contains this text are candidates.
    #[serde(rename = "tagprefix", default, skip_serializing_if = "Option::is_none")]
    pub tag_prefix: Option<String>,
    /// Release tag or commit hash of the last successful install.
    #[serde(default)]
    pub version: Option<String>,
}

impl WorldEntry {
    pub fn packaged(
        slug: impl Into<String>,
        strategy: InstallStrategy,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            strategy,
            file_name: Some(file_name.into()),
            folder_name: None,
            tag_prefix: None,
            version: None,
        }
    }

    pub fn checkout(slug: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            strategy: InstallStrategy::SourceCheckout,
            file_name: None,
            folder_name: Some(folder_name.into()),
            tag_prefix: None,
            version: None,
        }
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = Some(prefix.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Packaged file name, if set and not blank.
    pub fn file_name(&self) -> Option<&str> {
        non_empty(&self.file_name)
    }

    /// Checkout folder name, if set and not blank.
    pub fn folder_name(&self) -> Option<&str> {
        non_empty(&self.folder_name)
    }

    /// Tag filter, if set and not blank.
    pub fn tag_prefix(&self) -> Option<&str> {
        non_empty(&self.tag_prefix)
    }

    /// Installed version, if any.
    pub fn version(&self) -> Option<&str> {
        non_empty(&self.version)
    }

    /// Name of the file or link created under the worlds directory.
    pub fn install_name(&self) -> Option<&str> {
        if self.strategy.is_packaged() {
            self.file_name()
        } else {
            self.folder_name()
        }
    }

    /// Extension of the packaged file, without the dot.
    pub fn packaged_extension(&self) -> &str {
        self.file_name()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or(PACKAGED_EXTENSION)
    }

    /// Check that the fields required by the install strategy are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slug(&self.slug)?;
        if self.strategy.is_packaged() {
            if self.file_name().is_none() {
                return Err(ConfigError::MissingFileName);
            }
        } else if self.folder_name().is_none() {
            return Err(ConfigError::MissingFolderName);
        }
        Ok(())
    }
}

/// The whole configuration: where Archipelago lives and what is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationTarget {
    pub ap_path: PathBuf,
    #[serde(default)]
    pub ap_type: InstallMode,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub worlds: BTreeMap<String, WorldEntry>,
}

impl InstallationTarget {
    pub fn new(ap_path: impl Into<PathBuf>, ap_type: InstallMode) -> Self {
        Self {
            ap_path: ap_path.into(),
            ap_type,
            github_token: None,
            worlds: BTreeMap::new(),
        }
    }

    /// API token, if set and not blank.
    pub fn github_token(&self) -> Option<&str> {
        non_empty(&self.github_token)
    }

    /// Start tracking a new world.
    pub fn add_world(&mut self, name: &str, entry: WorldEntry) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.worlds.contains_key(name) {
            return Err(ConfigError::DuplicateWorld(name.to_string()));
        }
        entry.validate()?;
        self.worlds.insert(name.to_string(), entry);
        Ok(())
    }

    /// Replace an existing world's settings.
    pub fn replace_world(&mut self, name: &str, entry: WorldEntry) -> Result<(), ConfigError> {
        entry.validate()?;
        match self.worlds.get_mut(name) {
            Some(existing) => {
                *existing = entry;
                Ok(())
            }
            None => Err(ConfigError::UnknownWorld(name.to_string())),
        }
    }

    /// Stop tracking `name`, returning its entry.
    pub fn remove_world(&mut self, name: &str) -> Result<WorldEntry, ConfigError> {
        self.worlds
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownWorld(name.to_string()))
    }

    /// Tracked world names, sorted.
    pub fn world_names(&self) -> Vec<String> {
        self.worlds.keys().cloned().collect()
    }
}

/// Check a GitHub `owner/repo` slug for shape and legal characters.
pub fn validate_slug(slug: &str) -> Result<(), ConfigError> {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    let re = SLUG.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*/[A-Za-z0-9._-]+$").expect("slug pattern")
    });
    let dot_path = matches!(slug.rsplit('/').next(), Some(".") | Some(".."));
    if re.is_match(slug) && !dot_path {
        Ok(())
    } else {
        Err(ConfigError::InvalidSlug(slug.to_string()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("ArchipelagoMW/Archipelago").is_ok());
        assert!(validate_slug("some-one/my_world.v2").is_ok());
        assert!(validate_slug("no-slash").is_err());
        assert!(validate_slug("a/b/c").is_err());
        assert!(validate_slug("/repo").is_err());
        assert!(validate_slug("owner/").is_err());
    }

    #[test]
    fn test_validate_slug_rejects_dot_repos() {
        assert_eq!(
            validate_slug("owner/.."),
            Err(ConfigError::InvalidSlug("owner/..".to_string()))
        );
        assert!(validate_slug("owner/.").is_err());
        assert!(validate_slug("owner/.github").is_ok());
        assert!(validate_slug("owner/...").is_ok());
    }

    #[test]
    fn test_validate_requires_strategy_fields() {
        let mut packaged = WorldEntry::packaged("a/b", InstallStrategy::PackagedFile, "x.apworld");
        assert!(packaged.validate().is_ok());
        packaged.file_name = Some("  ".to_string());
        assert_eq!(packaged.validate(), Err(ConfigError::MissingFileName));

        let mut checkout = WorldEntry::checkout("a/b", "beta");
        assert!(checkout.validate().is_ok());
        checkout.folder_name = None;
        assert_eq!(checkout.validate(), Err(ConfigError::MissingFolderName));
    }

    #[test]
    fn test_install_name_follows_strategy() {
        let mut entry = WorldEntry::checkout("a/b", "beta");
        entry.file_name = Some("beta.apworld".to_string());
        assert_eq!(entry.install_name(), Some("beta"));
        entry.strategy = InstallStrategy::PackagedFile;
        assert_eq!(entry.install_name(), Some("beta.apworld"));
    }

    #[test]
    fn test_packaged_extension() {
        let entry = WorldEntry::packaged("a/b", InstallStrategy::PackagedArchive, "alpha.apworld");
        assert_eq!(entry.packaged_extension(), "apworld");
        let bare = WorldEntry::packaged("a/b", InstallStrategy::PackagedArchive, "alpha");
        assert_eq!(bare.packaged_extension(), PACKAGED_EXTENSION);
    }

    #[test]
    fn test_add_and_remove_worlds() {
        let mut target = InstallationTarget::new("/ap", InstallMode::Source);
        let entry = WorldEntry::packaged("a/b", InstallStrategy::PackagedFile, "b.apworld");
        target.add_world("Zeta", entry.clone()).unwrap();
        target.add_world("Alpha", entry.clone()).unwrap();
        assert_eq!(target.world_names(), vec!["Alpha", "Zeta"]);

        assert_eq!(
            target.add_world("Alpha", entry.clone()),
            Err(ConfigError::DuplicateWorld("Alpha".to_string()))
        );
        assert_eq!(target.add_world("  ", entry), Err(ConfigError::EmptyName));

        target.remove_world("Zeta").unwrap();
        assert_eq!(target.world_names(), vec!["Alpha"]);
        assert!(target.remove_world("Zeta").is_err());
    }

    #[test]
    fn test_replace_unknown_world() {
        let mut target = InstallationTarget::new("/ap", InstallMode::Source);
        let entry = WorldEntry::checkout("a/b", "beta");
        assert_eq!(
            target.replace_world("Beta", entry),
            Err(ConfigError::UnknownWorld("Beta".to_string()))
        );
    }

    #[test]
    fn test_empty_token_is_none() {
        let mut target = InstallationTarget::new("/ap", InstallMode::Compiled);
        target.github_token = Some(String::new());
        assert_eq!(target.github_token(), None);
        target.github_token = Some("ghp_abc".to_string());
        assert_eq!(target.github_token(), Some("ghp_abc"));
    }
}
