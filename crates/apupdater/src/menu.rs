//! Interactive menu.
//!
//! A small state machine: every screen asks its questions, applies the answer
//! to the configuration, saves, and names the next screen.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use apcore::config::{
    validate_slug, ConfigStore, InstallMode, InstallStrategy, InstallationTarget, WorldEntry,
    PACKAGED_EXTENSION,
};
use apcore::download::Downloader;
use apcore::paths::ScratchDirs;
use apcore::source::{SourceClient, SourceError};
use apcore::update::{Reporter, UpdateEngine};
use apcore::vcs::VersionControl;

use crate::progress::summary_line;
use crate::prompt::Prompt;

/// Typed to clear an optional field that has a current value.
const CLEAR: &str = "-";

/// Builds a source client for a (possibly absent) API token.
pub type Connect<'a> = &'a dyn Fn(Option<&str>) -> Box<dyn SourceClient>;

/// Collaborators the menu hands to the update engine.
pub struct Services<'a> {
    pub connect: Connect<'a>,
    pub downloader: &'a dyn Downloader,
    pub vcs: &'a dyn VersionControl,
    pub store: &'a dyn ConfigStore,
    pub scratch: ScratchDirs,
    pub reporter: &'a dyn Reporter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Main,
    Worlds,
    AddWorld,
    ModifyWorld,
    RemoveWorld,
    Update,
    Setup,
    Exit,
}

pub struct Menu<'a> {
    prompt: &'a mut dyn Prompt,
    services: &'a Services<'a>,
    source: Box<dyn SourceClient>,
    target: InstallationTarget,
}

/// Ask for the installation settings when no configuration exists yet, and save them.
pub fn first_run(prompt: &mut dyn Prompt, store: &dyn ConfigStore) -> Result<InstallationTarget> {
    prompt.message("No configuration found. Let's set up your Archipelago installation.");
    let target = setup_form(prompt, None)?;
    if let Err(e) = store.save(&target) {
        tracing::error!("Failed to save configuration: {:#}", e);
        prompt.message(&format!("Could not save the configuration: {e:#}"));
    }
    Ok(target)
}

impl<'a> Menu<'a> {
    pub fn new(
        prompt: &'a mut dyn Prompt,
        services: &'a Services<'a>,
        target: InstallationTarget,
    ) -> Self {
        let source = (services.connect)(target.github_token());
        Self {
            prompt,
            services,
            source,
            target,
        }
    }

    /// Loop until the user exits; returns the final configuration.
    pub fn run(mut self) -> Result<InstallationTarget> {
        let mut state = MenuState::Main;
        while state != MenuState::Exit {
            tracing::debug!("Menu state: {:?}", state);
            state = match state {
                MenuState::Main => self.main()?,
                MenuState::Worlds => self.worlds()?,
                MenuState::AddWorld => self.add_world()?,
                MenuState::ModifyWorld => self.modify_world()?,
                MenuState::RemoveWorld => self.remove_world()?,
                MenuState::Update => self.update()?,
                MenuState::Setup => self.setup()?,
                MenuState::Exit => MenuState::Exit,
            };
        }
        self.save();
        Ok(self.target)
    }

    fn main(&mut self) -> Result<MenuState> {
        let items = items(&[
            "Update worlds",
            "Configure worlds",
            "Set up Archipelago path",
            "Exit",
        ]);
        let next = match self.prompt.select("What would you like to do?", &items, 0)? {
            0 => MenuState::Update,
            1 => MenuState::Worlds,
            2 => MenuState::Setup,
            _ => MenuState::Exit,
        };
        Ok(next)
    }

    fn worlds(&mut self) -> Result<MenuState> {
        if self.target.worlds.is_empty() {
            let items = items(&["Add a world", "Back"]);
            return Ok(match self.prompt.select("Configure worlds", &items, 0)? {
                0 => MenuState::AddWorld,
                _ => MenuState::Main,
            });
        }

        let items = items(&["Add a world", "Modify a world", "Remove a world", "Back"]);
        let next = match self.prompt.select("Configure worlds", &items, 0)? {
            0 => MenuState::AddWorld,
            1 => MenuState::ModifyWorld,
            2 => MenuState::RemoveWorld,
            _ => MenuState::Main,
        };
        Ok(next)
    }

    fn add_world(&mut self) -> Result<MenuState> {
        let name = loop {
            let name = self.prompt.input("Name of the world", None, false)?;
            if name.is_empty() {
                self.prompt.message("The name cannot be empty.");
            } else if self.target.worlds.contains_key(&name) {
                self.prompt
                    .message(&format!("A world named '{name}' already exists."));
            } else {
                break name;
            }
        };

        let entry = self.ask_entry(None)?;
        match self.target.add_world(&name, entry) {
            Ok(()) => {
                self.save();
                self.prompt.message(&format!("Added {name}."));
            }
            Err(e) => self.prompt.message(&format!("Could not add {name}: {e}")),
        }
        Ok(MenuState::Worlds)
    }

    fn modify_world(&mut self) -> Result<MenuState> {
        let Some(name) = self.pick_world("Which world do you want to modify?")? else {
            return Ok(MenuState::Worlds);
        };
        let Some(old) = self.target.worlds.get(&name).cloned() else {
            return Ok(MenuState::Worlds);
        };

        let mut entry = self.ask_entry(Some(&old))?;
        // Anything that changes what gets installed invalidates the recorded version.
        entry.version = old.version.clone();
        if entry != old {
            entry.version = None;
        }

        match self.target.replace_world(&name, entry) {
            Ok(()) => {
                self.save();
                self.prompt.message(&format!("Updated settings for {name}."));
            }
            Err(e) => self.prompt.message(&format!("Could not modify {name}: {e}")),
        }
        Ok(MenuState::Worlds)
    }

    fn remove_world(&mut self) -> Result<MenuState> {
        let Some(name) = self.pick_world("Which world do you want to remove?")? else {
            return Ok(MenuState::Worlds);
        };
        if !self
            .prompt
            .confirm(&format!("Really stop tracking {name}?"), false)?
        {
            return Ok(MenuState::Worlds);
        }

        if self.target.remove_world(&name).is_ok() {
            self.save();
            self.prompt.message(&format!("Removed {name}."));
        }
        Ok(MenuState::Worlds)
    }

    fn update(&mut self) -> Result<MenuState> {
        let names = self.target.world_names();
        if names.is_empty() {
            self.prompt
                .message("No worlds are configured yet. Add one under 'Configure worlds'.");
            return Ok(MenuState::Main);
        }

        let checked = vec![true; names.len()];
        let chosen = self.prompt.multi_select(
            "Worlds to update (space toggles, enter confirms)",
            &names,
            &checked,
        )?;
        let selected: BTreeSet<String> = chosen
            .into_iter()
            .filter_map(|index| names.get(index).cloned())
            .collect();
        if selected.is_empty() {
            self.prompt.message("Nothing selected.");
            return Ok(MenuState::Main);
        }

        let services = self.services;
        let engine = UpdateEngine::new(
            self.source.as_ref(),
            services.downloader,
            services.vcs,
            services.store,
            services.scratch.clone(),
        )
        .with_reporter(services.reporter);
        let report = engine.update(&mut self.target, &selected);
        self.prompt.message(&summary_line(&report));
        Ok(MenuState::Main)
    }

    fn setup(&mut self) -> Result<MenuState> {
        let previous_token = self.target.github_token().map(ToString::to_string);
        self.target = setup_form(self.prompt, Some(&self.target))?;
        if self.target.github_token().map(ToString::to_string) != previous_token {
            self.source = (self.services.connect)(self.target.github_token());
        }
        self.save();
        Ok(MenuState::Main)
    }

    /// Ask for slug, strategy and names, offering `current` values as defaults.
    fn ask_entry(&mut self, current: Option<&WorldEntry>) -> Result<WorldEntry> {
        let slug = self.ask_slug(current.map(|e| e.slug.as_str()))?;

        let strategies: Vec<String> = InstallStrategy::ALL
            .iter()
            .map(|s| s.label().to_string())
            .collect();
        let default = current
            .and_then(|e| InstallStrategy::ALL.iter().position(|s| *s == e.strategy))
            .unwrap_or(0);
        let strategy =
            InstallStrategy::ALL[self.prompt.select("How is the world published?", &strategies, default)?];

        if !strategy.is_packaged() {
            let folder = self.prompt.input(
                "Folder name under worlds/ in the repository",
                current.and_then(WorldEntry::folder_name),
                false,
            )?;
            return Ok(WorldEntry::checkout(slug, folder));
        }

        let file_name = self.prompt.input(
            "File name of the .apworld",
            current.and_then(WorldEntry::file_name),
            false,
        )?;
        let mut entry = WorldEntry::packaged(slug, strategy, packaged_file_name(&file_name));

        let prefix_default = current.and_then(WorldEntry::tag_prefix);
        let prefix_question = if prefix_default.is_some() {
            format!("Release tag prefix (optional, '{CLEAR}' to clear)")
        } else {
            "Release tag prefix (optional)".to_string()
        };
        let prefix = self.prompt.input(&prefix_question, prefix_default, true)?;
        if let Some(prefix) = optional(prefix) {
            entry = entry.with_tag_prefix(prefix);
        }
        Ok(entry)
    }

    fn ask_slug(&mut self, default: Option<&str>) -> Result<String> {
        loop {
            let slug = self
                .prompt
                .input("GitHub repository (owner/repo)", default, false)?;
            if let Err(e) = validate_slug(&slug) {
                self.prompt.message(&e.to_string());
                continue;
            }
            match self.source.repository(&slug) {
                Ok(_) => return Ok(slug),
                Err(SourceError::NotFound(_)) => {
                    self.prompt.message(&format!(
                        "The GitHub repo {slug} does not exist. Is there a typo?"
                    ));
                }
                Err(e) => {
                    tracing::warn!("Could not verify {}: {}", slug, e);
                    self.prompt
                        .message(&format!("Could not verify {slug} ({e}); keeping it anyway."));
                    return Ok(slug);
                }
            }
        }
    }

    fn pick_world(&mut self, question: &str) -> Result<Option<String>> {
        let names = self.target.world_names();
        let mut items = names.clone();
        items.push("Back".to_string());
        let index = self.prompt.select(question, &items, 0)?;
        Ok(names.get(index).cloned())
    }

    fn save(&mut self) {
        if let Err(e) = self.services.store.save(&self.target) {
            tracing::error!("Failed to save configuration: {:#}", e);
            self.prompt
                .message(&format!("Could not save the configuration: {e:#}"));
        }
    }
}

/// Root directory, install mode and token. Worlds are carried over from `current`.
fn setup_form(
    prompt: &mut dyn Prompt,
    current: Option<&InstallationTarget>,
) -> Result<InstallationTarget> {
    let current_path = current.map(|t| t.ap_path.to_string_lossy().into_owned());
    let ap_path = loop {
        let answer = prompt.input(
            "Path to your Archipelago installation",
            current_path.as_deref(),
            false,
        )?;
        let path = expand_home(&answer);
        if !path.is_dir() {
            prompt.message(&format!("{} does not exist or is not a directory.", path.display()));
            continue;
        }
        match path.canonicalize() {
            Ok(path) => break path,
            Err(e) => prompt.message(&format!("Cannot use {}: {e}", path.display())),
        }
    };

    let modes: Vec<String> = InstallMode::ALL
        .iter()
        .map(|m| m.label().to_string())
        .collect();
    let default = current
        .and_then(|t| InstallMode::ALL.iter().position(|m| *m == t.ap_type))
        .unwrap_or(0);
    let ap_type = InstallMode::ALL[prompt.select("Where should worlds be installed?", &modes, default)?];

    let current_token = current.and_then(InstallationTarget::github_token);
    let token_question = if current_token.is_some() {
        format!("GitHub token (optional, '{CLEAR}' to clear)")
    } else {
        "GitHub token (optional, raises the API rate limit)".to_string()
    };
    let token = prompt.input(&token_question, current_token, true)?;

    let mut target = InstallationTarget::new(ap_path, ap_type);
    target.github_token = optional(token);
    if let Some(current) = current {
        target.worlds = current.worlds.clone();
    }
    Ok(target)
}

fn items(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

fn optional(answer: String) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() || answer == CLEAR {
        None
    } else {
        Some(answer.to_string())
    }
}

/// Append the packaged extension when the name has none.
fn packaged_file_name(name: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{name}.{PACKAGED_EXTENSION}")
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
