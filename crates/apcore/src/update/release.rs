//! Choosing which release (and which of its assets) to install.

use crate::source::{Asset, Release};

/// Result of walking a newest-first release list.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseScan<'a> {
    /// The installed version was reached before any newer candidate.
    UpToDate,
    /// Newest release passing the tag filter with a usable asset.
    Candidate(&'a Release),
    /// Nothing qualified.
    NoMatch,
}

/// Walk `releases` (newest first) and stop at the first decisive one.
///
/// A release whose tag equals `installed` means nothing newer qualified, so the
/// world is current. Releases whose tag lacks `tag_prefix` are ignored
/// entirely. Otherwise a release qualifies if one of its assets starts with
/// `file_name` or is a zip.
pub fn scan_releases<'a>(
    releases: &'a [Release],
    installed: Option<&str>,
    tag_prefix: Option<&str>,
    file_name: &str,
) -> ReleaseScan<'a> {
    for release in releases {
        if installed == Some(release.tag_name.as_str()) {
            return ReleaseScan::UpToDate;
        }
        if let Some(prefix) = tag_prefix {
            if !release.tag_name.contains(prefix) {
                continue;
            }
        }
        if release
            .assets
            .iter()
            .any(|asset| asset_qualifies(asset, file_name))
        {
            return ReleaseScan::Candidate(release);
        }
    }
    ReleaseScan::NoMatch
}

fn asset_qualifies(asset: &Asset, file_name: &str) -> bool {
    asset.name.starts_with(file_name) || is_zip(&asset.name)
}

fn is_zip(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}

/// Asset to download from a chosen release.
///
/// Exact `file_name` first, then the first zip, then the first asset whose
/// name starts with `file_name` (the one that made the release qualify).
pub fn download_asset<'a>(release: &'a Release, file_name: &str) -> Option<&'a Asset> {
    release
        .assets
        .iter()
        .find(|asset| asset.name == file_name)
        .or_else(|| release.assets.iter().find(|asset| is_zip(&asset.name)))
        .or_else(|| {
            release
                .assets
                .iter()
                .find(|asset| asset.name.starts_with(file_name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, assets: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            prerelease: false,
            draft: false,
            assets: assets
                .iter()
                .map(|name| Asset {
                    name: name.to_string(),
                    download_url: format!("https://example.invalid/{tag}/{name}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_newest_qualifying_release_wins() {
        let releases = vec![
            release("v2", &["alpha.apworld"]),
            release("v1", &["alpha.apworld"]),
        ];
        assert_eq!(
            scan_releases(&releases, None, None, "alpha.apworld"),
            ReleaseScan::Candidate(&releases[0])
        );
    }

    #[test]
    fn test_installed_tag_stops_scan() {
        let releases = vec![
            release("v2", &["alpha.apworld"]),
            release("v1", &["alpha.apworld"]),
        ];
        assert_eq!(
            scan_releases(&releases, Some("v2"), None, "alpha.apworld"),
            ReleaseScan::UpToDate
        );
        assert_eq!(
            scan_releases(&releases, Some("v1"), None, "alpha.apworld"),
            ReleaseScan::Candidate(&releases[0])
        );
    }

    #[test]
    fn test_tag_prefix_filters_releases() {
        let releases = vec![
            release("beta-v3", &["beta.apworld", "bundle.zip"]),
            release("alpha-v2", &["alpha.apworld"]),
            release("alpha-v1", &["alpha.apworld"]),
        ];
        assert_eq!(
            scan_releases(&releases, Some("alpha-v1"), Some("alpha-"), "alpha.apworld"),
            ReleaseScan::Candidate(&releases[1])
        );
        assert_eq!(
            scan_releases(&releases, None, Some("gamma-"), "gamma.apworld"),
            ReleaseScan::NoMatch
        );
    }

    #[test]
    fn test_release_without_usable_asset_is_skipped() {
        let releases = vec![
            release("v3", &["source.tar.gz"]),
            release("v2", &["Alpha_Release.ZIP"]),
        ];
        assert_eq!(
            scan_releases(&releases, None, None, "alpha.apworld"),
            ReleaseScan::Candidate(&releases[1])
        );
    }

    #[test]
    fn test_download_asset_preference() {
        let both = release("v1", &["extras.zip", "alpha.apworld"]);
        assert_eq!(
            download_asset(&both, "alpha.apworld").unwrap().name,
            "alpha.apworld"
        );

        let zip_only = release("v1", &["notes.txt", "alpha-v1.zip"]);
        assert_eq!(
            download_asset(&zip_only, "alpha.apworld").unwrap().name,
            "alpha-v1.zip"
        );

        let prefixed = release("v1", &["alpha.apworld.bak"]);
        assert_eq!(
            download_asset(&prefixed, "alpha.apworld").unwrap().name,
            "alpha.apworld.bak"
        );

        let none = release("v1", &["notes.txt"]);
        assert!(download_asset(&none, "alpha.apworld").is_none());
    }
}
