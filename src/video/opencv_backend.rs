// src/video/opencv_backend.rs
//
// OpenCV media: video files and still images in, `mp4v` container and JPEG
// snapshots out. Frames travel as RGB; conversion to BGR happens only at
// the OpenCV boundary, together with rendering the overlay labels.

use super::{is_image, FrameSink, FrameSource, MediaBackend, SourceProperties};
use crate::types::Frame;
use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat},
    imgcodecs, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::Path;
use tracing::{debug, info};

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

fn mat_to_frame(bgr: &Mat, index: u64, timestamp_ms: f64) -> Result<Frame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let data = rgb.data_bytes()?.to_vec();
    Ok(Frame::new(
        data,
        rgb.cols().max(0) as usize,
        rgb.rows().max(0) as usize,
        index,
        timestamp_ms,
    ))
}

/// BGR image of `frame` with its overlay labels drawn.
fn render(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height as i32)?;

    let mut output = Mat::default();
    imgproc::cvt_color(&mat, &mut output, imgproc::COLOR_RGB2BGR, 0)?;

    for overlay in &frame.overlays {
        let [r, g, b] = overlay.color;
        imgproc::put_text(
            &mut output,
            &overlay.text,
            core::Point::new(overlay.origin.0, overlay.origin.1.max(12)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            core::Scalar::new(b as f64, g as f64, r as f64, 0.0),
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(output)
}

pub struct VideoReader {
    cap: VideoCapture,
    properties: SourceProperties,
    current_frame: u64,
    fps: f64,
}

impl FrameSource for VideoReader {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        let timestamp_ms = self.current_frame as f64 / self.fps * 1000.0;
        let frame = mat_to_frame(&mat, self.current_frame, timestamp_ms)?;
        self.current_frame += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<()> {
        use opencv::videoio::VideoCaptureTrait;
        VideoCaptureTrait::release(&mut self.cap)?;
        Ok(())
    }
}

/// A still image served as a one-frame stream.
pub struct ImageSource {
    frame: Option<Frame>,
    properties: SourceProperties,
}

impl FrameSource for ImageSource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }

    fn close(&mut self) -> Result<()> {
        self.frame = None;
        Ok(())
    }
}

pub struct VideoFileSink {
    writer: VideoWriter,
    released: bool,
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let mat = render(frame)?;
        self.writer.write(&mat)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.writer.release()?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvMedia;

impl OpenCvMedia {
    fn open_image(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let mat = imgcodecs::imread(path_str(path)?, imgcodecs::IMREAD_COLOR)?;
        if mat.empty() {
            bail!("Failed to read image {}", path.display());
        }
        let frame = mat_to_frame(&mat, 0, 0.0)?;
        info!("Image properties: {}x{}", frame.width, frame.height);

        Ok(Box::new(ImageSource {
            properties: SourceProperties {
                width: frame.width,
                height: frame.height,
                fps: None,
                total_frames: Some(1),
            },
            frame: Some(frame),
        }))
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let cap = VideoCapture::from_file(path_str(path)?, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)?;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)?;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        let usable_fps = (fps.is_finite() && fps > 0.0).then_some(fps);
        Ok(Box::new(VideoReader {
            cap,
            properties: SourceProperties {
                width: width.max(0.0) as usize,
                height: height.max(0.0) as usize,
                fps: usable_fps,
                total_frames: (total_frames > 0.0).then_some(total_frames as u64),
            },
            current_frame: 0,
            fps: usable_fps.unwrap_or(30.0),
        }))
    }
}

impl MediaBackend for OpenCvMedia {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if is_image(path) {
            self.open_image(path)
        } else {
            self.open_video(path)
        }
    }

    fn open_sink(
        &self,
        path: &Path,
        width: usize,
        height: usize,
        fps: f64,
    ) -> Result<Box<dyn FrameSink>> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            path_str(path)?,
            fourcc,
            fps,
            core::Size::new(width as i32, height as i32),
            true,
        )?;
        if !writer.is_opened()? {
            bail!("VideoWriter refused {}", path.display());
        }

        info!("Output video: {}", path.display());
        Ok(Box::new(VideoFileSink {
            writer,
            released: false,
        }))
    }

    fn save_snapshot(&self, frame: &Frame, path: &Path) -> Result<()> {
        let mat = render(frame)?;
        if !imgcodecs::imwrite(path_str(path)?, &mat, &core::Vector::new())? {
            bail!("imwrite rejected {}", path.display());
        }
        debug!("Snapshot saved: {}", path.display());
        Ok(())
    }
}
