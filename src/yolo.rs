use nalgebra::SVector;

use crate::detection::Detection;

/// Layout of a YOLO TorchScript export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, 4 + classes, N]`, class scores only (YOLOv8).
    V8 { classes: usize, boxes: usize },
    /// `[1, N, 5 + classes]`, objectness then class scores (YOLOv7).
    V7 { classes: usize, boxes: usize },
}

impl OutputLayout {
    pub fn from_shape(shape: &[i64]) -> Option<Self> {
        let [1, a, b] = *shape else {
            return None;
        };
        let (a, b) = (usize::try_from(a).ok()?, usize::try_from(b).ok()?);
        if b == 85 || (b > 5 && b < a) {
            Some(OutputLayout::V7 {
                classes: b - 5,
                boxes: a,
            })
        } else if a > 4 {
            Some(OutputLayout::V8 {
                classes: a - 4,
                boxes: b,
            })
        } else {
            None
        }
    }
}

/// Turn a flat output buffer into frame-space detections.
///
/// Boxes are `(cx, cy, w, h)` in model-input pixels and are rescaled by
/// `scale = (frame_w / input_w, frame_h / input_h)`. Candidates scoring below
/// `min_conf` are dropped here; class and NMS filtering happen later.
pub fn decode(data: &[f32], layout: OutputLayout, scale: (f32, f32), min_conf: f32) -> Vec<Detection> {
    let mut out = Vec::new();
    let mut push = |cx: f32, cy: f32, w: f32, h: f32, conf: f32, class_id: usize| {
        if conf < min_conf || w <= 0.0 || h <= 0.0 {
            return;
        }
        let (sx, sy) = scale;
        let tlwh = SVector::<f32, 4>::new((cx - w / 2.0) * sx, (cy - h / 2.0) * sy, w * sx, h * sy);
        out.push(Detection::new(tlwh, conf, class_id as i32));
    };

    match layout {
        OutputLayout::V8 { classes, boxes } => {
            if data.len() < (4 + classes) * boxes {
                return Vec::new();
            }
            let at = |row: usize, i: usize| data[row * boxes + i];
            for i in 0..boxes {
                let best = (0..classes).max_by(|&a, &b| at(4 + a, i).total_cmp(&at(4 + b, i)));
                if let Some(c) = best {
                    push(at(0, i), at(1, i), at(2, i), at(3, i), at(4 + c, i), c);
                }
            }
        }
        OutputLayout::V7 { classes, boxes } => {
            let stride = 5 + classes;
            if data.len() < stride * boxes {
                return Vec::new();
            }
            for row in data.chunks_exact(stride).take(boxes) {
                let scores = &row[5..];
                let best = (0..classes).max_by(|&a, &b| scores[a].total_cmp(&scores[b]));
                if let Some(c) = best {
                    push(row[0], row[1], row[2], row[3], row[4] * scores[c], c);
                }
            }
        }
    }
    out
}

#[cfg(feature = "torch")]
pub use self::torch::YoloDetector;

#[cfg(feature = "torch")]
mod torch {
    use opencv::{
        core::{Mat, Size, Vec3f, CV_32F},
        imgproc,
        prelude::*,
    };
    use tch::{Device, Kind, Tensor};
    use tracing::{debug, info};

    use super::{decode, OutputLayout};
    use crate::config::Config;
    use crate::detection::{Detection, Detector};
    use crate::error::CapabilityError;

    fn backend(err: tch::TchError) -> CapabilityError {
        CapabilityError::Backend(err.to_string())
    }

    /// YOLO TorchScript model run through libtorch.
    pub struct YoloDetector {
        model: tch::CModule,
        device: Device,
        input_size: (i32, i32),
        min_conf: f32,
    }

    impl YoloDetector {
        pub fn new(
            model_path: &str,
            device: &str,
            input_size: (i32, i32),
            min_conf: f32,
        ) -> Result<Self, CapabilityError> {
            let device = if device == "cuda" && tch::Cuda::is_available() {
                Device::Cuda(0)
            } else {
                Device::Cpu
            };
            let mut model = tch::CModule::load_on_device(model_path, device).map_err(backend)?;
            model.set_eval();
            info!(model_path, ?device, "loaded detector");
            Ok(YoloDetector {
                model,
                device,
                input_size,
                min_conf,
            })
        }

        pub fn from_config(cfg: &Config, model_path: &str) -> Result<Self, CapabilityError> {
            Self::new(
                model_path,
                &cfg.device,
                (cfg.input_size[0], cfg.input_size[1]),
                cfg.conf_threshold,
            )
        }

        /// Resize, BGR to RGB, scale to [0, 1], HWC to NCHW.
        fn preprocess(&self, frame: &Mat) -> Result<Tensor, CapabilityError> {
            let mut resized = Mat::default();
            imgproc::resize(
                frame,
                &mut resized,
                Size::new(self.input_size.0, self.input_size.1),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            let mut rgb = Mat::default();
            imgproc::cvt_color(&resized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
            let mut float_mat = Mat::default();
            rgb.convert_to(&mut float_mat, CV_32F, 1.0 / 255.0, 0.0)?;

            let pixels = float_mat.data_typed::<Vec3f>()?;
            let flat: Vec<f32> = pixels.iter().flat_map(|px| px.0).collect();
            let (h, w) = (i64::from(float_mat.rows()), i64::from(float_mat.cols()));
            Ok(Tensor::from_slice(&flat)
                .reshape([1, h, w, 3])
                .permute([0, 3, 1, 2])
                .to_kind(Kind::Float)
                .to_device(self.device))
        }
    }

    impl Detector for YoloDetector {
        fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, CapabilityError> {
            let input = self.preprocess(frame)?;
            let output = tch::no_grad(|| self.model.forward_ts(&[input])).map_err(backend)?;

            let shape = output.size();
            let layout = OutputLayout::from_shape(&shape).ok_or_else(|| {
                CapabilityError::Decode(format!("unexpected output shape {shape:?}"))
            })?;
            let flat = output
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .flatten(0, -1);
            let data = Vec::<f32>::try_from(&flat).map_err(backend)?;

            let scale = (
                frame.cols() as f32 / self.input_size.0 as f32,
                frame.rows() as f32 / self.input_size.1 as f32,
            );
            let detections = decode(&data, layout, scale, self.min_conf);
            debug!(candidates = detections.len(), "yolo decode");
            Ok(detections)
        }
    }
}
