use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    str::Lines,
};

use tokio_stream::{StreamExt, wrappers::ReadDirStream};
use tracing::{debug, instrument};

use crate::error::{Result, ValidatorError};

pub const HEADER: &str = "#EXTM3U";
pub const EXTINF: &str = "#EXTINF:";
pub const DEFAULT_DISPLAY_NAME: &str = "Unknown Channel";

/// A single channel of a playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub url: String,
    pub display_name: String,
}

impl PlaylistEntry {
    /// Blank or missing names fall back to [`DEFAULT_DISPLAY_NAME`]
    pub fn new(url: impl Into<String>, display_name: Option<&str>) -> Self {
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME);

        Self {
            url: url.into(),
            display_name: display_name.to_string(),
        }
    }
}

/// Lists every playlist file directly inside `dir`, sorted by path
///
/// # Errors
/// [`ValidatorError::Configuration`] when the directory cannot be read or holds no playlist
#[instrument]
pub async fn discover_playlists(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let read_dir = tokio::fs::read_dir(dir).await.map_err(|e| {
        ValidatorError::Configuration(format!(
            "Unable to read M3U directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut dir_entries = ReadDirStream::new(read_dir);
    let mut files = Vec::new();
    while let Some(dir_entry) = dir_entries.next().await {
        let dir_entry = dir_entry.map_err(|e| {
            ValidatorError::Configuration(format!(
                "Unable to list M3U directory {}: {e}",
                dir.display()
            ))
        })?;

        let path = dir_entry.path();
        if !has_extension(&path, extension) {
            continue;
        }
        // Follows symlinks, unlike `DirEntry::file_type`
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => debug!("Ignoring non-file {path:?}"),
            Err(e) => debug!("Ignoring unreadable {path:?}: {e}"),
        }
    }

    if files.is_empty() {
        return Err(ValidatorError::Configuration(format!(
            "No M3U files found in directory: {}",
            dir.display()
        )));
    }

    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

/// Reads a playlist file into memory
///
/// # Errors
/// [`ValidatorError::Parse`] when the file is unreadable or not UTF-8
pub async fn read_playlist(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ValidatorError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    String::from_utf8(bytes).map_err(|_| ValidatorError::Parse {
        path: path.to_path_buf(),
        reason: "file is not valid UTF-8".to_string(),
    })
}

/// Checks the playlist header and returns a lazy iterator over its entries
///
/// # Errors
/// [`ValidatorError::Parse`] when the content does not start with [`HEADER`]
pub fn parse_playlist<'a>(path: &Path, content: &'a str) -> Result<Entries<'a>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.lines();

    match lines.by_ref().map(str::trim).find(|line| !line.is_empty()) {
        Some(header) if header.starts_with(HEADER) => Ok(Entries { lines, title: None }),
        Some(_) => Err(ValidatorError::Parse {
            path: path.to_path_buf(),
            reason: format!("missing `{HEADER}` header"),
        }),
        None => Err(ValidatorError::Parse {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        }),
    }
}

/// Entries of a single playlist, in file order
pub struct Entries<'a> {
    lines: Lines<'a>,
    title: Option<&'a str>,
}

impl Iterator for Entries<'_> {
    type Item = PlaylistEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(info) = line.strip_prefix(EXTINF) {
                self.title = Some(extinf_title(info));
                continue;
            }

            // #EXTGRP, #EXTVLCOPT, plain comments...
            if line.starts_with('#') {
                continue;
            }

            return Some(PlaylistEntry::new(line, self.title.take()));
        }

        None
    }
}

/// Title of `#EXTINF:-1 tvg-id="a" group-title="News, Local",Title`
///
/// Commas inside quoted attribute values do not end the attribute list.
fn extinf_title(info: &str) -> &str {
    let mut quoted = false;
    for (i, c) in info.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return info[i + 1..].trim(),
            _ => {}
        }
    }

    ""
}
