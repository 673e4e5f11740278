//! Log setup.
//!
//! Messages go to stderr (filtered by `RUST_LOG`, default `warn`) and are also
//! appended to `<data dir>/ap-updater/logs/ap-updater.log`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Rotate once the log grows past 2MB.
const MAX_LOG_BYTES: u64 = 2 * 1024 * 1024;

pub fn log_file_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("ap-updater").join("logs").join("ap-updater.log"))
}

/// Install the global subscriber. `verbose` forces debug output on stderr.
pub fn init(verbose: bool) {
    let stderr_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let file_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let file_layer = log_file_path()
        .and_then(|path| open_log(&path))
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(file_level)
        });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn open_log(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    rotate(path);
    OpenOptions::new().create(true).append(true).open(path).ok()
}

fn rotate(path: &Path) {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > MAX_LOG_BYTES {
            let _ = fs::rename(path, path.with_extension("log.old"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_large_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ap-updater.log");
        fs::write(&path, vec![b'x'; (MAX_LOG_BYTES + 1) as usize]).unwrap();

        let file = open_log(&path);
        assert!(file.is_some());
        assert!(tmp.path().join("ap-updater.log.old").exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_small_log_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/ap-updater.log");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "previous run\n").unwrap();

        open_log(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous run\n");
        assert!(!path.with_extension("log.old").exists());
    }
}
