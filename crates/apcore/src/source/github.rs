//! GitHub REST API client.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::{Release, Repository, SourceClient, SourceError};

const GITHUB_API_BASE: &str = "https://api.github.com";
pub(crate) const USER_AGENT: &str = concat!("ap-updater/", env!("CARGO_PKG_VERSION"));

const RELEASES_PER_PAGE: usize = 100;
/// Upper bound on release pages fetched per repository.
const MAX_RELEASE_PAGES: usize = 3;

/// Blocking GitHub client. Anonymous unless a token is configured.
pub struct GitHubClient {
    agent: ureq::Agent,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<&str>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(15))
            .timeout_read(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build();

        Self {
            agent,
            api_base: GITHUB_API_BASE.to_string(),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string),
        }
    }

    /// Point the client at a different API host (GitHub Enterprise, mirrors).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        not_found: impl FnOnce() -> SourceError,
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .agent
            .get(&url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        tracing::debug!("GET {}", url);
        match request.call() {
            Ok(response) => response
                .into_json()
                .map_err(|e| SourceError::Request(format!("invalid response from {url}: {e}"))),
            Err(ureq::Error::Status(status, response)) => {
                let rate_limited = response.header("x-ratelimit-remaining") == Some("0");
                let message = response
                    .into_json::<serde_json::Value>()
                    .ok()
                    .and_then(|body| body["message"].as_str().map(ToString::to_string))
                    .unwrap_or_default();
                Err(classify_status(status, rate_limited, &message, not_found))
            }
            Err(ureq::Error::Transport(e)) => Err(SourceError::Request(e.to_string())),
        }
    }
}

impl SourceClient for GitHubClient {
    fn repository(&self, slug: &str) -> Result<Repository, SourceError> {
        self.get_json(&format!("/repos/{slug}"), || {
            SourceError::NotFound(slug.to_string())
        })
    }

    fn releases(&self, repo: &Repository) -> Result<Vec<Release>, SourceError> {
        let mut releases = Vec::new();
        let mut reached_end = false;
        for page in 1..=MAX_RELEASE_PAGES {
            let path = format!(
                "/repos/{}/releases?per_page={}&page={}",
                repo.full_name, RELEASES_PER_PAGE, page
            );
            let batch: Vec<Release> =
                self.get_json(&path, || SourceError::NotFound(repo.full_name.clone()))?;
            let last_page = batch.len() < RELEASES_PER_PAGE;
            releases.extend(batch);
            if last_page {
                reached_end = true;
                break;
            }
        }
        if !reached_end {
            tracing::warn!(
                "{} has more than {} releases; older ones are not considered",
                repo.full_name,
                MAX_RELEASE_PAGES * RELEASES_PER_PAGE
            );
        }
        published(releases)
    }
}

/// Drop drafts; an empty result means nothing has been released.
fn published(releases: Vec<Release>) -> Result<Vec<Release>, SourceError> {
    let releases: Vec<Release> = releases.into_iter().filter(|r| !r.draft).collect();
    if releases.is_empty() {
        Err(SourceError::NoReleases)
    } else {
        Ok(releases)
    }
}

fn classify_status(
    status: u16,
    rate_limited: bool,
    message: &str,
    not_found: impl FnOnce() -> SourceError,
) -> SourceError {
    match status {
        404 => not_found(),
        403 | 429 if rate_limited => SourceError::RateLimited,
        _ if message.is_empty() => SourceError::Request(format!("HTTP {status}")),
        _ => SourceError::Request(format!("HTTP {status}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::{ok, serve, serve_recording};

    const RELEASES_JSON: &str = r#"[
        {
            "tag_name": "v2",
            "prerelease": false,
            "draft": false,
            "assets": [
                {"name": "alpha.apworld", "browser_download_url": "https://example.invalid/v2/alpha.apworld", "size": 10}
            ]
        },
        {
            "tag_name": "v3-draft",
            "draft": true,
            "assets": []
        },
        {
            "tag_name": "v1",
            "prerelease": true,
            "assets": [
                {"name": "alpha.zip", "browser_download_url": "https://example.invalid/v1/alpha.zip"}
            ]
        }
    ]"#;

    #[test]
    fn test_decode_releases() {
        let releases: Vec<Release> = serde_json::from_str(RELEASES_JSON).unwrap();
        assert_eq!(releases.len(), 3);
        assert_eq!(releases[0].tag_name, "v2");
        assert_eq!(
            releases[0].assets[0].download_url,
            "https://example.invalid/v2/alpha.apworld"
        );
        assert!(releases[2].prerelease);
    }

    #[test]
    fn test_published_drops_drafts() {
        let releases: Vec<Release> = serde_json::from_str(RELEASES_JSON).unwrap();
        let tags: Vec<String> = published(releases)
            .unwrap()
            .into_iter()
            .map(|r| r.tag_name)
            .collect();
        assert_eq!(tags, vec!["v2", "v1"]);
    }

    #[test]
    fn test_published_empty_is_no_releases() {
        assert_eq!(published(Vec::new()), Err(SourceError::NoReleases));

        let drafts: Vec<Release> =
            serde_json::from_str(r#"[{"tag_name": "wip", "draft": true}]"#).unwrap();
        assert_eq!(published(drafts), Err(SourceError::NoReleases));
    }

    #[test]
    fn test_decode_repository() {
        let repo: Repository = serde_json::from_str(
            r#"{"full_name": "Someone/Alpha", "clone_url": "https://github.com/Someone/Alpha.git", "default_branch": "main", "stargazers_count": 3}"#,
        )
        .unwrap();
        assert_eq!(repo.full_name, "Someone/Alpha");
        assert_eq!(repo.default_branch, "main");
    }

    #[test]
    fn test_classify_status() {
        let nf = || SourceError::NotFound("a/b".to_string());
        assert_eq!(
            classify_status(404, false, "Not Found", nf),
            SourceError::NotFound("a/b".to_string())
        );
        assert_eq!(classify_status(403, true, "", nf), SourceError::RateLimited);
        assert_eq!(
            classify_status(403, false, "Forbidden", nf),
            SourceError::Request("HTTP 403: Forbidden".to_string())
        );
        assert_eq!(
            classify_status(500, false, "", nf),
            SourceError::Request("HTTP 500".to_string())
        );
    }

    // ── Over HTTP ───────────────────────────────────────

    fn json_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// A page of releases with the given tags (newest first); `wip*` tags are drafts.
    fn releases_page(tags: &[String]) -> String {
        let page: Vec<serde_json::Value> = tags
            .iter()
            .map(|tag| {
                serde_json::json!({
                    "tag_name": tag,
                    "draft": tag.starts_with("wip"),
                    "assets": [{
                        "name": "alpha.apworld",
                        "browser_download_url": format!("https://example.invalid/{tag}/alpha.apworld"),
                    }],
                })
            })
            .collect();
        ok(&serde_json::Value::Array(page).to_string())
    }

    fn tags(range: impl DoubleEndedIterator<Item = usize>) -> Vec<String> {
        range.rev().map(|n| format!("v{n}")).collect()
    }

    fn repo(base: &str) -> Repository {
        Repository {
            full_name: "someone/alpha".to_string(),
            clone_url: format!("{base}/someone/alpha.git"),
            default_branch: "main".to_string(),
        }
    }

    #[test]
    fn test_repository_lookup_sends_token() {
        let body = r#"{"full_name": "someone/alpha", "clone_url": "https://github.com/someone/alpha.git", "default_branch": "main"}"#;
        let (base, requests) = serve_recording(vec![ok(body)]);
        let client = GitHubClient::new(Some("ghp_abc")).with_api_base(&base);

        let repo = client.repository("someone/alpha").unwrap();
        assert_eq!(repo.clone_url, "https://github.com/someone/alpha.git");

        let head = requests.recv().unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /repos/someone/alpha "));
        assert!(head.contains("authorization: bearer ghp_abc"));
        assert!(head.contains("accept: application/vnd.github+json"));
    }

    #[test]
    fn test_anonymous_requests_have_no_auth_header() {
        let body = r#"{"full_name": "someone/alpha", "clone_url": "https://github.com/someone/alpha.git"}"#;
        let (base, requests) = serve_recording(vec![ok(body)]);
        let client = GitHubClient::new(None).with_api_base(&base);

        client.repository("someone/alpha").unwrap();
        let head = requests.recv().unwrap().to_ascii_lowercase();
        assert!(!head.contains("authorization:"));
    }

    #[test]
    fn test_missing_repository_is_not_found() {
        let base = serve(vec![json_response(
            "404 Not Found",
            r#"{"message": "Not Found"}"#,
        )]);
        let client = GitHubClient::new(None).with_api_base(&base);

        assert_eq!(
            client.repository("someone/missing"),
            Err(SourceError::NotFound("someone/missing".to_string()))
        );
    }

    #[test]
    fn test_rate_limit_over_http() {
        let response = "HTTP/1.1 403 Forbidden\r\nx-ratelimit-remaining: 0\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}".to_string();
        let base = serve(vec![response]);
        let client = GitHubClient::new(None).with_api_base(&base);

        assert_eq!(
            client.repository("someone/alpha"),
            Err(SourceError::RateLimited)
        );
    }

    #[test]
    fn test_releases_span_pages() {
        let mut second = tags(1..=2);
        second.insert(1, "wip-next".to_string());
        let (base, requests) =
            serve_recording(vec![releases_page(&tags(3..=102)), releases_page(&second)]);
        let client = GitHubClient::new(None).with_api_base(&base);

        let releases = client.releases(&repo(&base)).unwrap();

        assert_eq!(releases.len(), 102);
        assert_eq!(releases[0].tag_name, "v102");
        assert_eq!(releases[99].tag_name, "v3");
        assert_eq!(releases[100].tag_name, "v2");
        assert_eq!(releases[101].tag_name, "v1");
        assert!(releases.iter().all(|r| !r.draft));

        let first = requests.recv().unwrap();
        let next = requests.recv().unwrap();
        assert!(first.contains("/repos/someone/alpha/releases?per_page=100&page=1 "));
        assert!(next.contains("&page=2 "));
    }

    #[test]
    fn test_release_pages_are_capped() {
        let pages = (0..MAX_RELEASE_PAGES)
            .map(|page| {
                let newest = 300 - page * RELEASES_PER_PAGE;
                releases_page(&tags(newest - RELEASES_PER_PAGE + 1..=newest))
            })
            .collect();
        let base = serve(pages);
        let client = GitHubClient::new(None).with_api_base(&base);

        let releases = client.releases(&repo(&base)).unwrap();
        assert_eq!(releases.len(), MAX_RELEASE_PAGES * RELEASES_PER_PAGE);
        assert_eq!(releases.last().unwrap().tag_name, "v1");
    }

    #[test]
    fn test_only_drafts_is_no_releases() {
        let base = serve(vec![releases_page(&["wip-1".to_string(), "wip-2".to_string()])]);
        let client = GitHubClient::new(None).with_api_base(&base);

        assert_eq!(client.releases(&repo(&base)), Err(SourceError::NoReleases));
    }

    #[test]
    fn test_blank_token_is_anonymous() {
        let client = GitHubClient::new(Some("   "));
        assert!(client.token.is_none());
        let client = GitHubClient::new(Some("ghp_abc")).with_api_base("http://localhost:9/");
        assert_eq!(client.token.as_deref(), Some("ghp_abc"));
        assert_eq!(client.api_base, "http://localhost:9");
    }
}
