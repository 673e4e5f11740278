mod logging;
mod menu;
mod progress;
mod prompt;

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use apcore::config::store::DEFAULT_CONFIG_FILE;
use apcore::config::{ConfigFile, InstallationTarget};
use apcore::download::HttpDownloader;
use apcore::paths::ScratchDirs;
use apcore::source::{GitHubClient, SourceClient};
use apcore::update::UpdateEngine;
use apcore::vcs::GitCli;
use clap::{Parser, Subcommand};

use menu::{Menu, Services};
use progress::{summary_line, ProgressReporter};
use prompt::TerminalPrompt;

#[derive(Debug, Parser)]
#[command(name = "ap-updater", version)]
#[command(about = "Keep Archipelago worlds up to date from their GitHub repositories")]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Where git clones are kept (defaults to the configuration file's directory)
    #[arg(long, value_name = "PATH")]
    scratch_dir: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Update the named worlds without the menu
    Update {
        /// World names as they appear in the configuration
        worlds: Vec<String>,

        /// Update every tracked world
        #[arg(long, conflicts_with = "worlds")]
        all: bool,
    },
    /// List tracked worlds
    List,
}

fn connect(token: Option<&str>) -> Box<dyn SourceClient> {
    Box::new(GitHubClient::new(token))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!("Using configuration {:?}", cli.config);

    let config = ConfigFile::new(&cli.config);
    let scratch = ScratchDirs::new(cli.scratch_dir.clone().unwrap_or_else(|| config.directory()));
    let mut prompt = TerminalPrompt::new();

    let target = match config.load()? {
        Some(target) => target,
        None if cli.command.is_none() => menu::first_run(&mut prompt, &config)?,
        None => bail!(
            "No configuration at {:?}; run ap-updater without a command to set one up",
            config.path()
        ),
    };

    let downloader = HttpDownloader::new();
    let vcs = GitCli::new();
    let reporter = ProgressReporter::new();

    match cli.command {
        None => {
            let services = Services {
                connect: &connect,
                downloader: &downloader,
                vcs: &vcs,
                store: &config,
                scratch,
                reporter: &reporter,
            };
            Menu::new(&mut prompt, &services, target).run()?;
        }
        Some(Command::Update { worlds, all }) => {
            let mut target = target;
            let names = selected_worlds(&target, worlds, all)?;
            let source = connect(target.github_token());
            let engine = UpdateEngine::new(source.as_ref(), &downloader, &vcs, &config, scratch)
                .with_reporter(&reporter);
            let report = engine.update(&mut target, &names);
            println!("{}", summary_line(&report));
        }
        Some(Command::List) => list(&target),
    }

    Ok(())
}

fn selected_worlds(
    target: &InstallationTarget,
    worlds: Vec<String>,
    all: bool,
) -> Result<BTreeSet<String>> {
    if all {
        return Ok(target.worlds.keys().cloned().collect());
    }
    if worlds.is_empty() {
        bail!("Name at least one world, or pass --all");
    }
    for name in &worlds {
        if !target.worlds.contains_key(name) {
            eprintln!("Not tracked: {name}");
        }
    }
    Ok(worlds.into_iter().collect())
}

fn list(target: &InstallationTarget) {
    println!("Archipelago: {}", target.ap_path.display());
    if target.worlds.is_empty() {
        println!("No worlds tracked.");
        return;
    }
    for (name, entry) in &target.worlds {
        println!(
            "{:<24} {:<12} {:<40} {}",
            name,
            entry.strategy.key(),
            entry.slug,
            entry.version().unwrap_or("-")
        );
    }
}
