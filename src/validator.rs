use std::{path::PathBuf, sync::Arc};

use tokio::{
    select,
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::{
    aggregate::{Aggregator, RunStats, ValidationOutcome, ensure_parent_dir},
    config::{Config, MAX_PARALLELISM},
    dedup::Deduplicator,
    error::{Result, ValidatorError},
    ffprobe::MediaProbe,
    playlist::{PlaylistEntry, discover_playlists, parse_playlist, read_playlist},
    reachability::QuickCheck,
    run_log::RunLogger,
};

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub stats: RunStats,
    pub output_file: PathBuf,
    pub bytes_written: usize,
    /// The run was cancelled and the output only holds what was validated until then
    pub interrupted: bool,
}

type Completed = (usize, PlaylistEntry, ValidationOutcome);

/// Drives a whole run: discovery, dedup, parallel validation, output
pub struct Validator {
    config: Config,
    quick_check: Arc<dyn QuickCheck>,
    media_probe: Arc<dyn MediaProbe>,
    log: Arc<RunLogger>,
}

impl Validator {
    pub fn new(
        config: Config,
        quick_check: Arc<dyn QuickCheck>,
        media_probe: Arc<dyn MediaProbe>,
        log: Arc<RunLogger>,
    ) -> Self {
        Self {
            config,
            quick_check,
            media_probe,
            log,
        }
    }

    /// Validates every playlist entry and writes the cleaned playlist
    ///
    /// Cancelling `ct` stops new validations; whatever was accepted so far is still written.
    ///
    /// # Errors
    /// [`ValidatorError::Configuration`] when no playlist is found,
    /// [`ValidatorError::Write`] when the output cannot be written.
    /// Both are also recorded on the run log.
    pub async fn run(&self, ct: CancellationToken) -> Result<RunReport> {
        let result = self.run_inner(ct).await;
        if let Err(e) = &result {
            self.log.log(format!("Error: {e}"));
        }
        result
    }

    async fn run_inner(&self, ct: CancellationToken) -> Result<RunReport> {
        let log = &self.log;
        log.log("Script started");
        log.log(format!("M3U Directory: {}", self.config.playlist_dir.display()));
        log.log(format!("Output File: {}", self.config.output_file.display()));
        log.log(format!("Log File: {}", log.path().display()));

        let files = discover_playlists(&self.config.playlist_dir, &self.config.extension).await?;
        log.log(format!("Found {} M3U files", files.len()));

        let permits = Arc::new(Semaphore::new(
            self.config.parallelism.clamp(1, MAX_PARALLELISM),
        ));
        let mut tasks = JoinSet::new();
        let mut dedup = Deduplicator::default();
        let mut aggregator = Aggregator::default();
        let mut next_seq = 0usize;

        'files: for file in &files {
            if ct.is_cancelled() {
                break;
            }

            log.log(format!("Processing file: {}", file.display()));
            let entries = match read_playlist(file)
                .await
                .and_then(|content| Ok(parse_playlist(file, &content)?.collect::<Vec<_>>()))
            {
                Ok(entries) => entries,
                Err(e) => {
                    log.log(format!("Skipping file: {e}"));
                    continue;
                }
            };
            log.log(format!("File parsed. Total entries: {}", entries.len()));

            for entry in entries {
                let seq = next_seq;
                next_seq += 1;

                log.log(format!(
                    "Processing entry: {} - {}",
                    entry.display_name, entry.url
                ));

                if !dedup.check_and_mark(&entry) {
                    self.report(&mut aggregator, seq, entry, ValidationOutcome::DuplicateSkipped);
                    continue;
                }

                let permit = select! {
                    biased;
                    () = ct.cancelled() => None,
                    p = Arc::clone(&permits).acquire_owned() => p.ok(),
                };
                let Some(permit) = permit else {
                    self.report(&mut aggregator, seq, entry, ValidationOutcome::Cancelled);
                    break 'files;
                };

                while let Some(joined) = tasks.try_join_next() {
                    self.collect(&mut aggregator, joined);
                }

                let quick_check = Arc::clone(&self.quick_check);
                let media_probe = Arc::clone(&self.media_probe);
                let ct = ct.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = select! {
                        biased;
                        () = ct.cancelled() => ValidationOutcome::Cancelled,
                        o = validate_entry(quick_check.as_ref(), media_probe.as_ref(), &entry.url) => o,
                    };
                    (seq, entry, outcome)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(&mut aggregator, joined);
        }

        let interrupted = ct.is_cancelled();
        if interrupted {
            log.log("Run interrupted, writing the streams validated so far");
        }

        let (output, stats) = aggregator.finish();
        debug_assert!(stats.is_balanced());
        debug_assert_eq!(stats.total_duplicates, dedup.duplicates());

        if let Some(dir) = ensure_parent_dir(&self.config.output_file).await? {
            log.log(format!("Created output directory: {}", dir.display()));
        }
        let bytes_written = output.write(&self.config.output_file).await?;

        log.log(format!(
            "Playlist written to: {} (Bytes written: {bytes_written})",
            self.config.output_file.display()
        ));
        log.log(format!("Total entries processed: {}", stats.total_entries));
        log.log(format!(
            "Total duplicate entries removed: {}",
            stats.total_duplicates
        ));
        log.log(format!(
            "Total streams after validation: {}",
            stats.total_accepted
        ));
        log.log(format!("Total skipped streams: {}", stats.total_skipped));

        Ok(RunReport {
            stats,
            output_file: self.config.output_file.clone(),
            bytes_written,
            interrupted,
        })
    }

    fn collect(&self, aggregator: &mut Aggregator, joined: Result<Completed, JoinError>) {
        match joined {
            Ok((seq, entry, outcome)) => self.report(aggregator, seq, entry, outcome),
            Err(e) => {
                error!("Validation task died: {e}");
                self.log.log(format!("Validation task failed, stream skipped: {e}"));
                aggregator.record_lost();
            }
        }
    }

    fn report(
        &self,
        aggregator: &mut Aggregator,
        seq: usize,
        entry: PlaylistEntry,
        outcome: ValidationOutcome,
    ) {
        let PlaylistEntry { url, display_name } = &entry;
        self.log.log(match &outcome {
            ValidationOutcome::Accepted => format!("Added to playlist: {display_name}"),
            ValidationOutcome::DuplicateSkipped => format!("Skipping duplicate: {display_name}"),
            ValidationOutcome::FailedQuickCheck { reason } => {
                format!("Failed quick URL check: {url} ({display_name}): {reason}")
            }
            ValidationOutcome::FailedDeepProbe { reason } => {
                format!("Failed FFprobe validation: {url} ({display_name}): {reason}")
            }
            ValidationOutcome::Cancelled => {
                format!("Not validated, run interrupted: {url} ({display_name})")
            }
        });

        aggregator.record(seq, entry, &outcome);
    }
}

/// Quick check first; the deep probe only runs for reachable URLs
#[instrument(skip(quick_check, media_probe))]
async fn validate_entry(
    quick_check: &dyn QuickCheck,
    media_probe: &dyn MediaProbe,
    url: &str,
) -> ValidationOutcome {
    if let Err(e) = quick_check.check(url).await {
        return ValidationOutcome::FailedQuickCheck {
            reason: failure_reason(e),
        };
    }

    match media_probe.probe(url).await {
        Ok(verdict) if verdict.is_valid() => ValidationOutcome::Accepted,
        Ok(verdict) => {
            debug!("Rejected probe output: {verdict:?}");
            ValidationOutcome::FailedDeepProbe {
                reason: verdict.rejection_reason(),
            }
        }
        Err(e) => ValidationOutcome::FailedDeepProbe {
            reason: failure_reason(e),
        },
    }
}

fn failure_reason(e: ValidatorError) -> String {
    match e {
        ValidatorError::Network { reason, .. }
        | ValidatorError::Probe { reason, .. }
        | ValidatorError::Parse { reason, .. } => reason,
        other => other.to_string(),
    }
}
