// src/video/mod.rs
//
// Media boundary: frame sources, annotated-frame sinks and the finalizer
// that turns the raw container into a playable file.

pub mod finalizer;
pub mod memory;
#[cfg(feature = "opencv")]
pub mod opencv_backend;

pub use finalizer::{FfmpegTranscoder, Transcoder, VideoFinalizer};
pub use memory::{MemoryMedia, MemorySink, MemorySource};
#[cfg(feature = "opencv")]
pub use opencv_backend::OpenCvMedia;

use crate::types::Frame;
use anyhow::Result;
use std::path::Path;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProperties {
    pub width: usize,
    pub height: usize,
    /// `None` when the container does not report a usable rate.
    pub fps: Option<f64>,
    pub total_frames: Option<u64>,
}

/// Sequential frame reader. `Ok(None)` marks end of stream.
pub trait FrameSource {
    fn properties(&self) -> SourceProperties;
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Ordered frame writer producing one container.
pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;
    /// Flush and close. Safe to call more than once.
    fn finish(&mut self) -> Result<()>;
}

pub trait MediaBackend: Send + Sync {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
    fn open_sink(
        &self,
        path: &Path,
        width: usize,
        height: usize,
        fps: f64,
    ) -> Result<Box<dyn FrameSink>>;
    /// Write one frame (with overlays) as a still image.
    fn save_snapshot(&self, frame: &Frame, path: &Path) -> Result<()>;
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_image(path: &Path) -> bool {
    has_extension(path, &IMAGE_EXTENSIONS)
}

pub fn is_media(path: &Path) -> bool {
    is_image(path) || has_extension(path, &VIDEO_EXTENSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_extensions() {
        assert!(is_image(Path::new("a/b/frame.JPG")));
        assert!(!is_image(Path::new("clip.mp4")));
        assert!(is_media(Path::new("clip.MKV")));
        assert!(!is_media(Path::new("notes.txt")));
        assert!(!is_media(Path::new("noext")));
    }
}
