use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{Dispatch, Level, dispatcher, info, warn};
use tracing_subscriber::{
    Layer, Registry,
    filter::Targets,
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
};

const TARGET: &str = "run";
const TIMESTAMP_FORMAT: &str = "[%Y-%m-%d %H:%M:%S]";

/// Append-only log of every decision made during a run
///
/// Lines look like `[2024-05-01 13:37:00] message` and are mirrored to the
/// console through the global subscriber. Writing to the file is best-effort:
/// if it cannot be opened the run logs to the console only.
#[derive(Debug)]
pub struct RunLogger {
    path: PathBuf,
    file: Option<Dispatch>,
}

impl RunLogger {
    /// Opens `path` for appending, creating it and its parent directory as needed
    pub fn open(path: &Path) -> Self {
        let file = match open_append(path) {
            Ok(f) => Some(file_dispatch(f)),
            Err(e) => {
                warn!("Unable to open log file {path:?}, logging to console only: {e}");
                None
            }
        };

        Self {
            path: path.to_path_buf(),
            file,
        }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: TARGET, "{message}");

        if let Some(file) = &self.file {
            dispatcher::with_default(file, || info!(target: TARGET, "{message}"));
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A subscriber that only writes `run` events, as bare timestamped lines
fn file_dispatch(file: File) -> Dispatch {
    let layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_level(false)
        .with_target(false)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(TARGET, Level::INFO));

    Dispatch::new(Registry::default().with(layer))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new().create(true).append(true).open(path)
}
