use std::{
    io::ErrorKind,
    process::Stdio,
    sync::LazyLock,
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, instrument};

use crate::error::{Result, ValidatorError};

pub const DEFAULT_PROBE_COMMAND: &str =
    "ffprobe -v error -show_entries stream=codec_type -of csv=p=0";

/// Diagnostics that show up on perfectly playable streams
pub const IGNORED_DIAGNOSTICS: &[&str] = &[
    "Invalid data found when processing input",
    "non-existing SPS 0 referenced in buffering period",
];

/// A line of `-show_entries stream=codec_type -of csv=p=0` output
static STREAM_REPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:video|audio|subtitle|data|attachment)[,|]*$")
        .expect("stream report pattern is valid")
});

/// Looks inside a stream to confirm it carries media
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// # Errors
    /// [`ValidatorError::Probe`] when the probe cannot run to completion
    async fn probe(&self, url: &str) -> Result<ProbeVerdict>;
}

/// What a probe run revealed about a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeVerdict {
    pub found_media: bool,
    /// Lines that are neither stream reports nor tolerated noise
    pub diagnostics: Vec<String>,
    pub exit_success: bool,
}

impl ProbeVerdict {
    /// Evaluates the combined stdout + stderr of a probe run
    #[must_use]
    pub fn from_output(output: &str, exit_success: bool) -> Self {
        let found_media = output
            .lines()
            .any(|line| line.contains("video") || line.contains("audio"));

        let diagnostics = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !STREAM_REPORT_LINE.is_match(line))
            .filter(|line| !IGNORED_DIAGNOSTICS.iter().any(|noise| line.contains(noise)))
            .map(ToString::to_string)
            .collect();

        Self {
            found_media,
            diagnostics,
            exit_success,
        }
    }

    /// Media was found, and the probe either stayed quiet or still exited cleanly
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.found_media && (self.diagnostics.is_empty() || self.exit_success)
    }

    /// Short explanation of a rejection, for the run log
    #[must_use]
    pub fn rejection_reason(&self) -> String {
        if !self.found_media {
            return "no video or audio stream found".to_string();
        }

        format!(
            "probe exited with an error: {}",
            self.diagnostics.join(" / ")
        )
    }
}

/// A probe command template split into program and leading arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeCommand {
    /// # Errors
    /// [`ValidatorError::Configuration`] when the template is blank
    pub fn parse(template: &str) -> Result<Self> {
        let mut parts = template.split_whitespace().map(ToString::to_string);
        let Some(program) = parts.next() else {
            return Err(ValidatorError::Configuration(
                "Probe command is empty".to_string(),
            ));
        };

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// [`MediaProbe`] that runs an external `ffprobe`-like process per URL
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    command: ProbeCommand,
    timeout: Duration,
}

impl FfprobeProbe {
    #[must_use]
    pub const fn new(command: ProbeCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    #[instrument(skip(self))]
    async fn probe(&self, url: &str) -> Result<ProbeVerdict> {
        let probe_error = |reason: String| ValidatorError::Probe {
            url: url.to_string(),
            reason,
        };

        let child = match tokio::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(probe_error(format!(
                    "`{}` is not installed or available in PATH!",
                    self.command.program
                )));
            }
            Err(e) => return Err(probe_error(format!("Unable to spawn probe: {e}"))),
        };

        // Dropping the timed out future drops the child, which kills it
        let out = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| probe_error(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| probe_error(format!("Unable to collect probe output: {e}")))?;

        let output = combine_output(&out.stdout, &out.stderr);
        debug!("probe exited with {}: {output:?}", out.status);

        Ok(ProbeVerdict::from_output(&output, out.status.success()))
    }
}

/// stdout followed by stderr, never fusing the last stdout line with the first stderr one
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut output = String::from_utf8_lossy(stdout).into_owned();
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(&String::from_utf8_lossy(stderr));
    output
}

/// Checks that the probe program exists and runs
pub async fn is_installed(program: &str) -> bool {
    debug!("Checking for {program} installation");
    tokio::process::Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}
