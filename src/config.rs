use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::ffprobe::DEFAULT_PROBE_COMMAND;

/// Upper bound on streams validated at once
pub const MAX_PARALLELISM: usize = 256;

/// Validates the streams of M3U playlists and writes a cleaned, deduplicated playlist
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory containing the playlists to validate
    #[arg(long, env = "M3U_DIRECTORY", default_value = "/app/m3u")]
    pub playlist_dir: PathBuf,

    /// Where the cleaned playlist is written
    #[arg(long, env = "OUTPUT_FILE", default_value = "/app/output/cleaned_playlist.m3u")]
    pub output_file: PathBuf,

    /// Run log, appended to on every run
    #[arg(long, env = "LOG_FILE", default_value = "/var/log/validator.log")]
    pub log_file: PathBuf,

    /// Media probe command. The stream URL is appended as the last argument
    #[arg(long, env = "FFPROBE_COMMAND", default_value = DEFAULT_PROBE_COMMAND)]
    pub probe_command: String,

    /// Extension of the playlist files to pick up
    #[arg(long, env = "M3U_EXTENSION", default_value = "m3u")]
    pub extension: String,

    /// Seconds to wait for the quick HEAD check
    #[arg(long, env = "QUICK_CHECK_TIMEOUT", default_value_t = 5)]
    pub quick_check_timeout: u64,

    /// Seconds a single media probe may run before it is killed
    #[arg(long, env = "PROBE_TIMEOUT", default_value_t = 30)]
    pub probe_timeout: u64,

    /// The amount of streams validated in parallel, between 1 and 256
    #[arg(short, long, env = "PARALLELISM", default_value_t = 8)]
    pub parallelism: usize,

    /// Stop the run after this many seconds, keeping what was validated so far
    #[arg(long, env = "RUN_TIMEOUT")]
    pub run_timeout: Option<u64>,

    /// Do not check that the probe program is installed before starting
    #[arg(long, env = "SKIP_PROBE_CHECK")]
    pub skip_probe_check: bool,
}

/// Settings of a single run, handed to each component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub playlist_dir: PathBuf,
    pub output_file: PathBuf,
    pub log_file: PathBuf,
    pub probe_command: String,
    pub extension: String,
    pub quick_check_timeout: Duration,
    pub probe_timeout: Duration,
    pub parallelism: usize,
    pub run_timeout: Option<Duration>,
    pub check_probe_installed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playlist_dir: PathBuf::from("/app/m3u"),
            output_file: PathBuf::from("/app/output/cleaned_playlist.m3u"),
            log_file: PathBuf::from("/var/log/validator.log"),
            probe_command: DEFAULT_PROBE_COMMAND.to_string(),
            extension: "m3u".to_string(),
            quick_check_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(30),
            parallelism: 8,
            run_timeout: None,
            check_probe_installed: true,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            playlist_dir: args.playlist_dir,
            output_file: args.output_file,
            log_file: args.log_file,
            probe_command: args.probe_command,
            extension: args.extension,
            quick_check_timeout: Duration::from_secs(args.quick_check_timeout),
            probe_timeout: Duration::from_secs(args.probe_timeout),
            parallelism: args.parallelism.clamp(1, MAX_PARALLELISM),
            run_timeout: args.run_timeout.map(Duration::from_secs),
            check_probe_installed: !args.skip_probe_check,
        }
    }
}
