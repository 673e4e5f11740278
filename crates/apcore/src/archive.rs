//! Pulling a packaged world out of a zip release asset.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use zip::ZipArchive;

fn open(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file =
        File::open(archive_path).with_context(|| format!("Failed to open {:?}", archive_path))?;
    ZipArchive::new(file).with_context(|| format!("{:?} is not a zip archive", archive_path))
}

/// Names of all file members (directories excluded).
pub fn member_names(archive_path: &Path) -> Result<Vec<String>> {
    let mut archive = open(archive_path)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let member = archive.by_index_raw(index)?;
        if !member.is_dir() {
            names.push(member.name().to_string());
        }
    }
    Ok(names)
}

/// Raw bytes of one member.
pub fn read_member(archive_path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = open(archive_path)?;
    let mut member = archive
        .by_name(name)
        .with_context(|| format!("{:?} has no member {}", archive_path, name))?;
    let mut bytes = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Pick the member holding the packaged world.
///
/// Candidates end in `.<extension>` (case-insensitive). A candidate whose base
/// name equals `preferred` wins; otherwise the first candidate is used.
pub fn find_packaged_member<'a>(
    names: &'a [String],
    extension: &str,
    preferred: Option<&str>,
) -> Option<&'a str> {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    let mut candidates = names
        .iter()
        .map(String::as_str)
        .filter(|name| name.to_ascii_lowercase().ends_with(&suffix));

    let first = candidates.next()?;
    let base = |name: &str| name.rsplit('/').next().unwrap_or(name).to_string();
    match preferred {
        Some(want) if base(first) != want => std::iter::once(first)
            .chain(candidates)
            .find(|name| base(name) == want)
            .or(Some(first)),
        _ => Some(first),
    }
}

/// Extract the packaged world from `archive_path` into `dest`, overwriting it.
///
/// Returns the name of the member that was written.
pub fn extract_packaged(
    archive_path: &Path,
    extension: &str,
    preferred: Option<&str>,
    dest: &Path,
) -> Result<String> {
    let names = member_names(archive_path)?;
    let member = find_packaged_member(&names, extension, preferred)
        .with_context(|| format!("{:?} contains no .{} file", archive_path, extension))?
        .to_string();
    let bytes = read_member(archive_path, &member)?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {:?}", dest))?;

    tracing::debug!("Extracted {} from {:?} to {:?}", member, archive_path, dest);
    Ok(member)
}
