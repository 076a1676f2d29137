use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nalgebra::SVector;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::{Detection, Detector};
use crate::error::{CapabilityError, ConfigError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedDetection {
    /// `[x, y, width, height]`
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame_id: u64,
    pub detections: Vec<RecordedDetection>,
}

/// Replays detections recorded for a video, one frame per `detect` call.
///
/// Calls are counted from 1; a frame with no entry yields no detections.
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
    next_frame: u64,
}

impl ReplayDetector {
    pub fn new(frames: Vec<RecordedFrame>) -> Self {
        let frames = frames
            .into_iter()
            .map(|f| {
                let dets = f
                    .detections
                    .into_iter()
                    .map(|d| Detection::new(SVector::<f32, 4>::from(d.bbox), d.confidence, d.class_id))
                    .collect();
                (f.frame_id, dets)
            })
            .collect();
        ReplayDetector {
            frames,
            next_frame: 1,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let frames: Vec<RecordedFrame> =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        info!(path = %path.display(), frames = frames.len(), "loaded recorded detections");
        Ok(Self::new(frames))
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, _frame: &Mat) -> Result<Vec<Detection>, CapabilityError> {
        let frame_id = self.next_frame;
        self.next_frame += 1;
        Ok(self.frames.get(&frame_id).cloned().unwrap_or_default())
    }
}
