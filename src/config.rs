use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// What to do when the helmet capability cannot give an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelmetFailurePolicy {
    /// "Cannot confirm helmet" counts as "no helmet" and may fire a violation.
    AssumeNoHelmet,
    /// Failures never fire a helmet violation.
    AssumeHelmet,
}

/// Whether a logged violation may later receive a better plate read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatePolicy {
    FirstWins,
    Upgrade,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub engine: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            endpoint: "https://api.ocr.space/parse/image".to_string(),
            api_key: None,
            engine: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HelmetConfig {
    pub endpoint: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub confidence: f32,
}

impl Default for HelmetConfig {
    fn default() -> Self {
        HelmetConfig {
            endpoint: "https://detect.roboflow.com".to_string(),
            model_id: "helmet-detection-ar0n2/1".to_string(),
            api_key: None,
            confidence: 0.5,
        }
    }
}

/// Session configuration. Loaded once at startup and never re-read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // detector
    pub model_path: Option<String>,
    pub device: String,
    pub input_size: [i32; 2],
    pub conf_threshold: f32,
    pub nms_threshold: f32,
    pub classes: Vec<i32>,
    pub two_wheeler_class: i32,

    // tracker
    pub n_init: u32,
    pub max_age: u32,
    pub match_iou_threshold: f32,
    pub class_match_radius: i32,

    // scene calibration
    pub pixels_per_meter: f64,
    pub speed_limit_kmph: f64,
    pub signal_cycle_seconds: u64,
    pub stop_line_y: i32,
    pub helmet_band_offset: i32,

    // policies
    pub plate_policy: PlatePolicy,
    pub helmet_failure_policy: HelmetFailurePolicy,
    pub capability_timeout_ms: u64,

    // persistence
    pub db_path: String,
    pub expired_registry_path: String,
    pub registry_column: String,

    pub ocr: OcrConfig,
    pub helmet: HelmetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model_path: None,
            device: "cpu".to_string(),
            input_size: [640, 640],
            conf_threshold: 0.4,
            nms_threshold: 0.5,
            classes: vec![2, 3, 5, 7],
            two_wheeler_class: 3,
            n_init: 3,
            max_age: 30,
            match_iou_threshold: 0.3,
            class_match_radius: 20,
            pixels_per_meter: 15.0,
            speed_limit_kmph: 60.0,
            signal_cycle_seconds: 5,
            stop_line_y: 300,
            helmet_band_offset: 200,
            plate_policy: PlatePolicy::Upgrade,
            helmet_failure_policy: HelmetFailurePolicy::AssumeNoHelmet,
            capability_timeout_ms: 10_000,
            db_path: "violations.db".to_string(),
            expired_registry_path: "expired.csv".to_string(),
            registry_column: "Number Plate".to_string(),
            ocr: OcrConfig::default(),
            helmet: HelmetConfig::default(),
        }
    }
}

impl Config {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Config = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::InvalidValue {
                field,
                reason: reason.into(),
            }
        }

        if !(self.pixels_per_meter > 0.0) {
            return Err(invalid("pixels_per_meter", "must be positive"));
        }
        if !(self.speed_limit_kmph > 0.0) {
            return Err(invalid("speed_limit_kmph", "must be positive"));
        }
        if self.signal_cycle_seconds == 0 {
            return Err(invalid("signal_cycle_seconds", "must be at least 1"));
        }
        if self.classes.is_empty() {
            return Err(invalid("classes", "allow-list is empty"));
        }
        for (field, value) in [
            ("conf_threshold", self.conf_threshold),
            ("nms_threshold", self.nms_threshold),
            ("match_iou_threshold", self.match_iou_threshold),
            ("helmet.confidence", self.helmet.confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{value} is outside [0, 1]")));
            }
        }
        if self.n_init == 0 {
            return Err(invalid("n_init", "must be at least 1"));
        }
        if self.class_match_radius <= 0 {
            return Err(invalid("class_match_radius", "must be positive"));
        }
        if self.capability_timeout_ms == 0 {
            return Err(invalid("capability_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// Row above which two-wheelers are too far away for helmet inference.
    pub fn helmet_band_y(&self) -> i32 {
        self.stop_line_y - self.helmet_band_offset
    }

    pub fn capability_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capability_timeout_ms)
    }
}
