use std::path::Path;

use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::info;

use crate::error::ConfigError;

/// Fails with `InvalidFrameRate` unless `fps` is a positive finite number.
pub fn check_fps(fps: f64) -> Result<f64, ConfigError> {
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(ConfigError::InvalidFrameRate(fps))
    }
}

/// Ordered frames of a video file, numbered from 1.
pub struct FrameSource {
    cap: VideoCapture,
    fps: f64,
    size: Size,
    frame_count: Option<u64>,
    next_number: u64,
}

impl FrameSource {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("failed to open video {}", path.display());
        }
        let fps = check_fps(cap.get(videoio::CAP_PROP_FPS)?)?;
        let size = Size::new(
            cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32,
            cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32,
        );
        let count = cap.get(videoio::CAP_PROP_FRAME_COUNT)?;
        let frame_count = (count > 0.0).then_some(count as u64);
        info!(
            path = %path.display(),
            fps,
            width = size.width,
            height = size.height,
            frames = ?frame_count,
            "opened video"
        );
        Ok(FrameSource {
            cap,
            fps,
            size,
            frame_count,
            next_number: 1,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    /// Next `(frame_number, frame)`, or `None` at end of stream or on the first
    /// empty frame.
    pub fn next_frame(&mut self) -> opencv::Result<Option<(u64, Mat)>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        let number = self.next_number;
        self.next_number += 1;
        Ok(Some((number, frame)))
    }
}
