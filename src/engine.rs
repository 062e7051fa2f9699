//! Transform engine: ffmpeg-backed pitch shifting
//!
//! Wraps invocation of the external ffmpeg binary. The transform
//! parameter (0..=100, 50 neutral) maps to a semitone shift in
//! [-4, +4]; pitch is shifted by resampling at `base_rate * ratio`
//! and then resampling back to `base_rate`, which changes perceived
//! pitch without ffmpeg needing a dedicated pitch-shift primitive.
//!
//! The child process is wall-clock bounded and killed on timeout.
//! Output always goes to a caller-provided temp path; this module
//! removes that path on every failure exit so a failed transform
//! never leaves bytes behind.

use crate::error::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Neutral point of the transform parameter scale
pub const NEUTRAL_PARAMETER: f64 = 50.0;

/// Maximum pitch shift magnitude in semitones (at parameter 0 or 100)
const MAX_SEMITONES: f64 = 4.0;

/// Map a transform parameter (0..=100) to a semitone shift in [-4, +4]
pub fn semitone_shift(parameter: f64) -> f64 {
    (parameter - NEUTRAL_PARAMETER) / NEUTRAL_PARAMETER * MAX_SEMITONES
}

/// Equal-tempered frequency ratio for a semitone shift: 2^(s/12)
pub fn pitch_ratio(parameter: f64) -> f64 {
    2f64.powf(semitone_shift(parameter) / 12.0)
}

/// ffmpeg-backed pitch transform engine
pub struct TransformEngine {
    ffmpeg_path: String,
    base_sample_rate: u32,
    timeout: Duration,
}

impl TransformEngine {
    pub fn new(ffmpeg_path: String, base_sample_rate: u32, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            base_sample_rate,
            timeout,
        }
    }

    /// The audio filter chain handed to ffmpeg for a non-neutral parameter
    ///
    /// Both stages use the same base rate: the first shifts pitch by
    /// re-declaring the sample rate, the second restores playback
    /// speed by resampling back.
    fn filter_chain(&self, parameter: f64) -> String {
        format!(
            "asetrate={rate}*{ratio},aresample={rate}",
            rate = self.base_sample_rate,
            ratio = pitch_ratio(parameter),
        )
    }

    /// Transform `source` into `target` with the given parameter
    ///
    /// Awaited to completion — there is no partial or streaming
    /// result. `target` is expected to be a temp path the caller
    /// renames into place after success.
    pub async fn apply(&self, source: &Path, target: &Path, parameter: f64) -> Result<()> {
        match tokio::fs::metadata(source).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(Error::SourceUnreadable(format!(
                    "{} is not a regular file",
                    source.display()
                )))
            }
            Err(e) => {
                return Err(Error::SourceUnreadable(format!(
                    "{}: {}",
                    source.display(),
                    e
                )))
            }
        }

        // Neutral point: byte-for-byte copy, no re-encode
        if (parameter - NEUTRAL_PARAMETER).abs() < f64::EPSILON {
            debug!("Neutral transform, copying {} verbatim", source.display());
            if let Err(e) = tokio::fs::copy(source, target).await {
                let _ = tokio::fs::remove_file(target).await;
                return Err(Error::Storage(e));
            }
            return Ok(());
        }

        let filter = self.filter_chain(parameter);
        debug!(
            source = %source.display(),
            filter = %filter,
            "Running ffmpeg pitch transform"
        );

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(source)
            .arg("-filter:a")
            .arg(&filter)
            .arg(target)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            // Dropping the in-flight future on timeout must reap the child
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let _ = tokio::fs::remove_file(target).await;
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Err(Error::EngineProcess(format!(
                        "{} not found on PATH",
                        self.ffmpeg_path
                    )));
                }
                return Err(Error::EngineProcess(format!("spawn failed: {}", e)));
            }
            Err(_elapsed) => {
                error!(
                    "ffmpeg exceeded {:?} budget transforming {}, killed",
                    self.timeout,
                    source.display()
                );
                let _ = tokio::fs::remove_file(target).await;
                return Err(Error::EngineTimeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = tokio::fs::remove_file(target).await;
            return Err(Error::EngineProcess(format!(
                "ffmpeg exit {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        info!(
            "Transform complete: {} -> {} ({:+.2} semitones)",
            source.display(),
            target.display(),
            semitone_shift(parameter)
        );
        Ok(())
    }

    /// Check whether the configured ffmpeg binary can be executed
    pub async fn probe(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
