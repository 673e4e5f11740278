//! HTTP downloads with bounded retries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::source::github::USER_AGENT;

/// Default number of attempts per download.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Fetches remote files into a local directory.
pub trait Downloader {
    /// Download `url` into `dest_dir`, replacing any file with the same name.
    /// Returns the path of the written file.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Blocking downloader on top of `ureq`.
pub struct HttpDownloader {
    agent: ureq::Agent,
    attempts: u32,
    backoff: Duration,
}

impl HttpDownloader {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            attempts: DEFAULT_ATTEMPTS,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Delay before the second attempt; grows linearly after that.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn fetch_once(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("Request for {url} failed"))?;

        // Stream into a sibling .part file so an interrupted transfer never
        // replaces a previous good download.
        let mut part_name = dest.as_os_str().to_os_string();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        {
            let mut file = std::fs::File::create(&part)
                .with_context(|| format!("Failed to create {:?}", part))?;
            std::io::copy(&mut response.into_reader(), &mut file)
                .with_context(|| format!("Failed while downloading {url}"))?;
        }

        std::fs::rename(&part, dest)
            .with_context(|| format!("Failed to move download into {:?}", dest))?;
        Ok(())
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("Failed to create download dir {:?}", dest_dir))?;
        let dest = dest_dir.join(file_name_from_url(url));

        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.fetch_once(url, &dest) {
                Ok(()) => {
                    tracing::debug!("Downloaded {} -> {:?}", url, dest);
                    return Ok(dest);
                }
                Err(e) => {
                    tracing::warn!(
                        "Download attempt {}/{} for {} failed: {:#}",
                        attempt,
                        self.attempts,
                        url,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.attempts {
                        std::thread::sleep(self.backoff * attempt);
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
        Err(error.context(format!(
            "Gave up on {url} after {} attempts",
            self.attempts
        )))
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
        .to_string()
}
