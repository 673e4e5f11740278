//! Install path resolution and scratch directories.

use std::path::{Path, PathBuf};

use crate::config::{InstallMode, InstallationTarget, WorldEntry};

/// Directory (relative to the Archipelago root) holding worlds for a mode.
pub fn worlds_dir(root: &Path, mode: InstallMode) -> PathBuf {
    match mode {
        InstallMode::Source => root.join("worlds"),
        InstallMode::Compiled => root.join("lib").join("worlds"),
        InstallMode::Custom => root.join("custom_worlds"),
    }
}

/// Where a world ends up: `<ap_path>/[lib/|custom_]worlds/<file or folder name>`.
///
/// Always derived from the current target, since `ap_type` may change between runs.
/// Returns `None` for entries with neither a file nor a folder name.
pub fn install_path(target: &InstallationTarget, entry: &WorldEntry) -> Option<PathBuf> {
    let name = entry.install_name()?;
    Some(worlds_dir(&target.ap_path, target.ap_type).join(name))
}

/// Long-lived working directories (git clones) for the updater.
#[derive(Debug, Clone)]
pub struct ScratchDirs {
    root: PathBuf,
}

impl ScratchDirs {
    /// Scratch space rooted at `root` (created lazily).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The scratch root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parent of all clones: `<root>/repositories`.
    pub fn repositories_dir(&self) -> PathBuf {
        self.root.join("repositories")
    }

    /// Clone location for a slug: `repositories/<owner>/<repo>`.
    pub fn clone_dir(&self, slug: &str) -> PathBuf {
        slug.split('/')
            .fold(self.repositories_dir(), |dir, part| dir.join(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallStrategy;

    fn target(mode: InstallMode) -> InstallationTarget {
        InstallationTarget::new("/games/Archipelago", mode)
    }

    #[test]
    fn test_install_path_per_mode() {
        let entry = WorldEntry::packaged("a/b", InstallStrategy::PackagedFile, "alpha.apworld");
        assert_eq!(
            install_path(&target(InstallMode::Source), &entry).unwrap(),
            PathBuf::from("/games/Archipelago/worlds/alpha.apworld")
        );
        assert_eq!(
            install_path(&target(InstallMode::Compiled), &entry).unwrap(),
            PathBuf::from("/games/Archipelago/lib/worlds/alpha.apworld")
        );
        assert_eq!(
            install_path(&target(InstallMode::Custom), &entry).unwrap(),
            PathBuf::from("/games/Archipelago/custom_worlds/alpha.apworld")
        );
    }

    #[test]
    fn test_install_path_uses_folder_name() {
        let entry = WorldEntry::checkout("a/b", "beta");
        assert_eq!(
            install_path(&target(InstallMode::Source), &entry).unwrap(),
            PathBuf::from("/games/Archipelago/worlds/beta")
        );
    }

    #[test]
    fn test_install_path_follows_mode_change() {
        let entry = WorldEntry::checkout("a/b", "beta");
        let mut t = target(InstallMode::Source);
        let before = install_path(&t, &entry).unwrap();
        t.ap_type = InstallMode::Compiled;
        let after = install_path(&t, &entry).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_install_path_without_names() {
        let mut entry = WorldEntry::checkout("a/b", "beta");
        entry.folder_name = None;
        assert!(install_path(&target(InstallMode::Source), &entry).is_none());
    }

    #[test]
    fn test_clone_dir() {
        let scratch = ScratchDirs::new("/data");
        assert_eq!(
            scratch.clone_dir("someone/beta-world"),
            PathBuf::from("/data/repositories/someone/beta-world")
        );
    }
}
