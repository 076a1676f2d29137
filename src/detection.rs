use nalgebra::SVector;
use opencv::core::Mat;

use crate::error::CapabilityError;
use crate::utils;

/// A single detection result.
#[derive(Debug, Clone)]
pub struct Detection {
    pub tlwh: SVector<f32, 4>,
    pub confidence: f32,
    pub class_id: i32,
}

impl Detection {
    pub fn new(tlwh: SVector<f32, 4>, confidence: f32, class_id: i32) -> Self {
        Self {
            tlwh,
            confidence,
            class_id,
        }
    }

    /// Integer box center, `x + w/2`, `y + h/2` on truncated pixel values.
    pub fn center(&self) -> (i32, i32) {
        let [x1, y1, x2, y2] = utils::tlwh_to_ltrb(&self.tlwh);
        let (w, h) = (x2 - x1, y2 - y1);
        (x1 + w / 2, y1 + h / 2)
    }
}

/// Object detector capability: one frame in, a set of boxes out.
pub trait Detector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, CapabilityError>;
}

/// Confidence / allow-list / NMS filter applied to every detector's output.
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    pub conf_threshold: f32,
    pub nms_threshold: f32,
    pub classes: Vec<i32>,
}

impl DetectionFilter {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        DetectionFilter {
            conf_threshold: cfg.conf_threshold,
            nms_threshold: cfg.nms_threshold,
            classes: cfg.classes.clone(),
        }
    }

    /// Drop low-confidence and non-vehicle boxes, then suppress overlaps per class.
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.conf_threshold && self.classes.contains(&d.class_id))
            .collect();
        if candidates.len() < 2 {
            return candidates;
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for &class_id in &self.classes {
            let group: Vec<&Detection> =
                candidates.iter().filter(|d| d.class_id == class_id).collect();
            if group.is_empty() {
                continue;
            }
            let boxes: Vec<SVector<f32, 4>> = group.iter().map(|d| d.tlwh).collect();
            let scores: Vec<f32> = group.iter().map(|d| d.confidence).collect();
            for idx in utils::nms(&boxes, &scores, self.nms_threshold) {
                kept.push(group[idx].clone());
            }
        }
        kept
    }
}
