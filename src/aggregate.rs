use std::{
    ffi::OsString,
    ops::AddAssign,
    path::{Path, PathBuf},
};

use crate::{
    error::{Result, ValidatorError},
    playlist::{EXTINF, HEADER, PlaylistEntry},
};

/// What happened to a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    DuplicateSkipped,
    FailedQuickCheck { reason: String },
    FailedDeepProbe { reason: String },
    /// The run was interrupted before validation finished
    Cancelled,
}

/// Counters of a run. `total_entries` always equals the sum of the other three
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub total_entries: usize,
    pub total_duplicates: usize,
    pub total_accepted: usize,
    pub total_skipped: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &ValidationOutcome) {
        self.total_entries += 1;
        match outcome {
            ValidationOutcome::Accepted => self.total_accepted += 1,
            ValidationOutcome::DuplicateSkipped => self.total_duplicates += 1,
            ValidationOutcome::FailedQuickCheck { .. }
            | ValidationOutcome::FailedDeepProbe { .. }
            | ValidationOutcome::Cancelled => self.total_skipped += 1,
        }
    }

    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.total_entries == self.total_duplicates + self.total_accepted + self.total_skipped
    }
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, rhs: Self) {
        self.total_entries += rhs.total_entries;
        self.total_duplicates += rhs.total_duplicates;
        self.total_accepted += rhs.total_accepted;
        self.total_skipped += rhs.total_skipped;
    }
}

/// Collects outcomes as they arrive, in any order
#[derive(Debug, Default)]
pub struct Aggregator {
    stats: RunStats,
    accepted: Vec<(usize, PlaylistEntry)>,
}

impl Aggregator {
    /// `seq` is the entry's position in the input, used to restore source order
    pub fn record(&mut self, seq: usize, entry: PlaylistEntry, outcome: &ValidationOutcome) {
        self.stats.record(outcome);
        if *outcome == ValidationOutcome::Accepted {
            self.accepted.push((seq, entry));
        }
    }

    /// Counts an entry whose validation task died before reporting back
    pub fn record_lost(&mut self) {
        self.stats.record(&ValidationOutcome::Cancelled);
    }

    #[must_use]
    pub const fn stats(&self) -> RunStats {
        self.stats
    }

    #[must_use]
    pub fn finish(mut self) -> (OutputPlaylist, RunStats) {
        self.accepted.sort_by_key(|(seq, _)| *seq);
        let entries = self.accepted.into_iter().map(|(_, entry)| entry).collect();

        (OutputPlaylist { entries }, self.stats)
    }
}

/// The cleaned playlist, in source order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputPlaylist {
    entries: Vec<PlaylistEntry>,
}

impl OutputPlaylist {
    #[must_use]
    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    /// `#EXTM3U` followed by one `#EXTINF:-1,<name>` + URL pair per entry
    #[must_use]
    pub fn render(&self) -> String {
        let records = self
            .entries
            .iter()
            .map(|e| format!("{EXTINF}-1,{}\n{}", e.display_name, e.url))
            .collect::<Vec<String>>()
            .join("\n");

        format!("{HEADER}\n{records}")
    }

    /// Writes the rendered playlist through a sibling temporary file, returning the bytes written
    ///
    /// # Errors
    /// [`ValidatorError::Write`] if the file cannot be written or moved into place
    pub async fn write(&self, path: &Path) -> Result<usize> {
        let write_error = |source| ValidatorError::Write {
            path: path.to_path_buf(),
            source,
        };

        let content = self.render();
        let temp_path = temp_sibling(path);

        let written = match tokio::fs::write(&temp_path, content.as_bytes()).await {
            Ok(()) => tokio::fs::rename(&temp_path, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tokio::fs::remove_file(&temp_path).await.ok();
            return Err(write_error(e));
        }

        Ok(content.len())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("playlist"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

/// Creates the parent directory of `path` if needed, returning it when it was created
///
/// # Errors
/// [`ValidatorError::Write`] when the directory cannot be created
pub async fn ensure_parent_dir(path: &Path) -> Result<Option<PathBuf>> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };

    if tokio::fs::metadata(parent).await.is_ok_and(|m| m.is_dir()) {
        return Ok(None);
    }

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|source| ValidatorError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Some(parent.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(n: usize) -> PlaylistEntry {
        PlaylistEntry::new(format!("http://example.com/{n}"), Some(format!("Channel {n}").as_str()))
    }

    #[test]
    fn counts_stay_balanced() {
        let mut aggregator = Aggregator::default();
        aggregator.record(0, entry(0), &ValidationOutcome::Accepted);
        aggregator.record(1, entry(0), &ValidationOutcome::DuplicateSkipped);
        aggregator.record(
            2,
            entry(2),
            &ValidationOutcome::FailedQuickCheck {
                reason: "HTTP status 404 Not Found".into(),
            },
        );
        aggregator.record(
            3,
            entry(3),
            &ValidationOutcome::FailedDeepProbe {
                reason: "no video or audio stream found".into(),
            },
        );
        aggregator.record(4, entry(4), &ValidationOutcome::Cancelled);
        aggregator.record_lost();

        let stats = aggregator.stats();
        assert_eq!(
            stats,
            RunStats {
                total_entries: 6,
                total_duplicates: 1,
                total_accepted: 1,
                total_skipped: 4,
            }
        );
        assert!(stats.is_balanced());
    }

    #[test]
    fn stats_merge_additively() {
        let mut a = RunStats::default();
        a.record(&ValidationOutcome::Accepted);
        let mut b = RunStats::default();
        b.record(&ValidationOutcome::DuplicateSkipped);
        b.record(&ValidationOutcome::Cancelled);

        a += b;
        assert_eq!(a.total_entries, 3);
        assert!(a.is_balanced());
    }

    #[test]
    fn output_restores_source_order() {
        let mut aggregator = Aggregator::default();
        aggregator.record(5, entry(5), &ValidationOutcome::Accepted);
        aggregator.record(1, entry(1), &ValidationOutcome::Accepted);
        aggregator.record(3, entry(3), &ValidationOutcome::Accepted);

        let (output, stats) = aggregator.finish();
        assert_eq!(output.entries(), &[entry(1), entry(3), entry(5)]);
        assert_eq!(stats.total_accepted, 3);
    }

    #[test]
    fn renders_header_and_two_line_records() {
        let mut aggregator = Aggregator::default();
        aggregator.record(0, entry(1), &ValidationOutcome::Accepted);
        aggregator.record(1, entry(2), &ValidationOutcome::Accepted);
        let (output, _) = aggregator.finish();

        assert_eq!(
            output.render(),
            "#EXTM3U\n#EXTINF:-1,Channel 1\nhttp://example.com/1\n#EXTINF:-1,Channel 2\nhttp://example.com/2"
        );
        assert_eq!(OutputPlaylist::default().render(), "#EXTM3U\n");
    }

    #[tokio::test]
    async fn writes_into_newly_created_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/cleaned.m3u");

        let created = ensure_parent_dir(&path).await.unwrap();
        assert_eq!(created.as_deref(), path.parent());
        assert_eq!(ensure_parent_dir(&path).await.unwrap(), None);

        let mut aggregator = Aggregator::default();
        aggregator.record(0, entry(1), &ValidationOutcome::Accepted);
        let (output, _) = aggregator.finish();

        let written = output.write(&path).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, content.len());
        assert_eq!(content, output.render());
        assert!(!path.with_file_name("cleaned.m3u.tmp").exists());
    }

    #[tokio::test]
    async fn unwritable_destination_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir/cleaned.m3u");

        let err = OutputPlaylist::default().write(&path).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Write { .. }));
        assert!(err.is_fatal());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn full_disk_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.m3u");
        let temp = dir.path().join("cleaned.m3u.tmp");
        // Every write to /dev/full fails with ENOSPC
        std::os::unix::fs::symlink("/dev/full", &temp).unwrap();

        let err = OutputPlaylist::default().write(&path).await.unwrap_err();

        assert!(matches!(err, ValidatorError::Write { .. }));
        assert!(std::fs::symlink_metadata(&temp).is_err());
        assert!(!path.exists());
    }
}
