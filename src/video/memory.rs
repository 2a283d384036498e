// src/video/memory.rs
//
// In-memory media: synthetic sources for simulation runs and a recording
// sink. Shared handles let the caller inspect state after a run consumed
// the boxed source/sink.

use super::{FrameSink, FrameSource, MediaBackend, SourceProperties};
use crate::types::Frame;
use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct MemorySource {
    frames: VecDeque<Frame>,
    properties: SourceProperties,
    closed: Arc<AtomicBool>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>, fps: Option<f64>) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));
        let total = frames.len() as u64;
        Self {
            frames: frames.into(),
            properties: SourceProperties {
                width,
                height,
                fps,
                total_frames: Some(total),
            },
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl FrameSource for MemorySource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("source already closed");
        }
        Ok(self.frames.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps every written frame; optionally persists a placeholder container
/// at `path` on finish so downstream finalization has a file to work on.
pub struct MemorySink {
    frames: Arc<Mutex<Vec<Frame>>>,
    finished: Arc<AtomicBool>,
    path: Option<PathBuf>,
}

impl MemorySink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
            path,
        }
    }

    pub fn frames(&self) -> Arc<Mutex<Vec<Frame>>> {
        Arc::clone(&self.frames)
    }
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            bail!("sink already finished");
        }
        self.frames
            .lock()
            .map_err(|_| anyhow::anyhow!("sink buffer poisoned"))?
            .push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(path) = &self.path {
            let count = self
                .frames
                .lock()
                .map_err(|_| anyhow::anyhow!("sink buffer poisoned"))?
                .len();
            std::fs::write(path, format!("frames={}\n", count))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

/// Backend serving the same synthetic frames to every run.
pub struct MemoryMedia {
    frames: Vec<Frame>,
    fps: Option<f64>,
    persist_output: bool,
    fail_sink: bool,
    snapshots: AtomicUsize,
    last_sink: Mutex<Option<Arc<Mutex<Vec<Frame>>>>>,
    last_source_closed: Mutex<Option<Arc<AtomicBool>>>,
}

impl MemoryMedia {
    pub fn new(frames: Vec<Frame>, fps: Option<f64>) -> Self {
        Self {
            frames,
            fps,
            persist_output: false,
            fail_sink: false,
            snapshots: AtomicUsize::new(0),
            last_sink: Mutex::new(None),
            last_source_closed: Mutex::new(None),
        }
    }

    /// Write a placeholder container at the sink path on finish.
    pub fn persist_output(mut self) -> Self {
        self.persist_output = true;
        self
    }

    /// Make every `open_sink` fail, as an unwritable output would.
    pub fn failing_sink(mut self) -> Self {
        self.fail_sink = true;
        self
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    /// Frames written by the most recent sink.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.last_sink
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .and_then(|frames| frames.lock().ok().map(|f| f.clone()))
            .unwrap_or_default()
    }

    /// Whether the most recently opened source was closed.
    pub fn source_closed(&self) -> bool {
        self.last_source_closed
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl MediaBackend for MemoryMedia {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if self.frames.is_empty() {
            bail!("no frames for {}", path.display());
        }
        let source = MemorySource::new(self.frames.clone(), self.fps);
        if let Ok(mut slot) = self.last_source_closed.lock() {
            *slot = Some(source.closed_flag());
        }
        Ok(Box::new(source))
    }

    fn open_sink(
        &self,
        path: &Path,
        _width: usize,
        _height: usize,
        _fps: f64,
    ) -> Result<Box<dyn FrameSink>> {
        if self.fail_sink {
            bail!("cannot open {}", path.display());
        }
        let sink = MemorySink::new(self.persist_output.then(|| path.to_path_buf()));
        if let Ok(mut slot) = self.last_sink.lock() {
            *slot = Some(sink.frames());
        }
        Ok(Box::new(sink))
    }

    fn save_snapshot(&self, _frame: &Frame, _path: &Path) -> Result<()> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_drains_then_ends() {
        let frames = vec![Frame::blank(4, 4, 0, 0.0), Frame::blank(4, 4, 1, 33.3)];
        let mut source = MemorySource::new(frames, Some(30.0));

        assert_eq!(source.properties().width, 4);
        assert_eq!(source.properties().total_frames, Some(2));
        assert_eq!(source.next_frame().unwrap().unwrap().index, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 1);
        assert!(source.next_frame().unwrap().is_none());

        source.close().unwrap();
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_sink_persists_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.mp4");
        let mut sink = MemorySink::new(Some(path.clone()));

        sink.write(&Frame::blank(2, 2, 0, 0.0)).unwrap();
        sink.finish().unwrap();
        sink.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "frames=1\n");
        assert!(sink.write(&Frame::blank(2, 2, 1, 0.0)).is_err());
    }
}
