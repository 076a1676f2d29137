use serde::Deserialize;
use serde_json::Value;
use opencv::core::Mat;
use tracing::debug;

use crate::config::{Config, OcrConfig};
use crate::error::CapabilityError;
use crate::plate::{self, PlateReader};
use crate::remote;

const API_KEY_ENV: &str = "OCR_SPACE_API_KEY";

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(rename = "ParsedResults", default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(rename = "IsErroredOnProcessing", default)]
    is_errored: bool,
    #[serde(rename = "ErrorMessage", default)]
    error_message: Value,
}

#[derive(Debug, Deserialize)]
struct ParsedResult {
    #[serde(rename = "ParsedText", default)]
    parsed_text: String,
}

/// Plate reader backed by the OCR.space HTTP API.
pub struct OcrSpaceReader {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    engine: u8,
}

impl OcrSpaceReader {
    pub fn new(cfg: &OcrConfig, api_key: String, timeout: std::time::Duration) -> Self {
        OcrSpaceReader {
            agent: remote::build_agent(timeout),
            endpoint: cfg.endpoint.clone(),
            api_key,
            engine: cfg.engine,
        }
    }

    /// `None` when no API key is configured or exported.
    pub fn from_config(cfg: &Config) -> Option<Self> {
        let key = remote::resolve_api_key(cfg.ocr.api_key.as_deref(), API_KEY_ENV)?;
        Some(Self::new(&cfg.ocr, key, cfg.capability_timeout()))
    }
}

/// Text of the first parsed result, or the service's own error message.
fn parsed_text(response: OcrResponse) -> Result<String, CapabilityError> {
    if response.is_errored {
        let message = match response.error_message {
            Value::String(s) => s,
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
            _ => "ocr processing error".to_string(),
        };
        return Err(CapabilityError::Backend(message));
    }
    response
        .parsed_results
        .into_iter()
        .next()
        .map(|r| r.parsed_text)
        .ok_or_else(|| CapabilityError::Decode("no ParsedResults".to_string()))
}

impl PlateReader for OcrSpaceReader {
    fn read(&self, crop: &Mat) -> Result<String, CapabilityError> {
        let image = format!("data:image/jpeg;base64,{}", remote::encode_jpeg_base64(crop)?);
        let engine = self.engine.to_string();
        let response: OcrResponse = self
            .agent
            .post(&self.endpoint)
            .send_form(&[
                ("apikey", self.api_key.as_str()),
                ("base64Image", image.as_str()),
                ("OCREngine", engine.as_str()),
                ("scale", "true"),
            ])?
            .into_json()
            .map_err(|e| CapabilityError::Decode(e.to_string()))?;

        let raw = parsed_text(response)?;
        debug!(raw = %raw.trim(), "ocr result");
        Ok(plate::extract_plate(&raw).unwrap_or_else(|| plate::clean_ocr_text(&raw)))
    }
}
