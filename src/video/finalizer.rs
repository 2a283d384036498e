// src/video/finalizer.rs
//
// The raw writer produces an mp4v container that browsers will not play.
// The finalizer hands it to an external transcoder and returns the public
// URL of the result. Transcoding failures are recoverable: the caller falls
// back to the raw file's URL.

use crate::config::{TranscoderConfig, VideoConfig};
use crate::error::AdasError;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info, warn};

/// Black-box conversion of `raw` into a playable file at `target`.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, raw: &Path, target: &Path) -> Result<()>;
}

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    preset: String,
    crf: u32,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            preset: config.preset.clone(),
            crf: config.crf,
        }
    }

    pub fn args(&self, raw: &Path, target: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            raw.display().to_string(),
            "-vcodec".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-acodec".to_string(),
            "aac".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            target.display().to_string(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, raw: &Path, target: &Path) -> Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .args(self.args(raw, target))
            .output()
            .with_context(|| format!("Failed to spawn {}", self.ffmpeg_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            bail!("ffmpeg exited with {}: {}", output.status, tail);
        }
        Ok(())
    }
}

pub struct VideoFinalizer {
    transcoder: Option<Box<dyn Transcoder>>,
    output_dir: PathBuf,
    public_prefix: String,
}

impl VideoFinalizer {
    pub fn new(transcoder: Option<Box<dyn Transcoder>>, video: &VideoConfig) -> Self {
        Self {
            transcoder,
            output_dir: PathBuf::from(&video.output_dir),
            public_prefix: video.public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the annotated, untranscoded stream is written.
    pub fn raw_path(&self, simulation_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("simulation_{}_raw.mp4", simulation_id))
    }

    pub fn final_path(&self, simulation_id: &str) -> PathBuf {
        self.output_dir.join(format!("simulation_{}.mp4", simulation_id))
    }

    /// Public URL of a file inside the output directory.
    pub fn public_url(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}/{}", self.public_prefix, name)
    }

    /// Transcode `raw` and return the final URL. The raw file is removed on
    /// success; failing to remove it is only logged.
    pub fn finalize(&self, simulation_id: &str, raw: &Path) -> Result<String> {
        let Some(transcoder) = self.transcoder.as_ref() else {
            return Err(AdasError::Finalize("no transcoder configured".to_string()).into());
        };

        if !raw.exists() {
            error!("Raw video {} not found", raw.display());
            return Err(AdasError::Finalize(format!("{} not found", raw.display())).into());
        }

        let target = self.final_path(simulation_id);
        transcoder
            .transcode(raw, &target)
            .map_err(|e| AdasError::Finalize(format!("{:#}", e)))?;
        info!("✓ Converted to {}", target.display());

        if let Err(e) = std::fs::remove_file(raw) {
            warn!("Could not remove raw video {}: {}", raw.display(), e);
        }

        Ok(self.public_url(&target))
    }

    /// `finalize`, falling back to the raw file's URL on any failure.
    pub fn finalize_or_raw(&self, simulation_id: &str, raw: &Path) -> String {
        match self.finalize(simulation_id, raw) {
            Ok(url) => url,
            Err(e) => {
                warn!("⚠️  Video finalization failed, serving raw output: {:#}", e);
                self.public_url(raw)
            }
        }
    }
}
