use opencv::core::Mat;
use serde::Deserialize;

use crate::config::{Config, HelmetConfig};
use crate::error::CapabilityError;
use crate::remote;

const API_KEY_ENV: &str = "ROBOFLOW_API_KEY";

/// Helmet inference on a rider crop. `Ok(true)` means a helmet was seen.
pub trait HelmetClassifier: Send + Sync {
    fn infer(&self, crop: &Mat) -> Result<bool, CapabilityError>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    class: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

fn has_helmet(predictions: &[Prediction], min_confidence: f32) -> bool {
    predictions
        .iter()
        .any(|p| p.class.eq_ignore_ascii_case("helmet") && p.confidence > min_confidence)
}

/// Helmet classifier backed by a hosted Roboflow detection model.
pub struct RoboflowHelmetClassifier {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    confidence: f32,
}

impl RoboflowHelmetClassifier {
    pub fn new(cfg: &HelmetConfig, api_key: String, timeout: std::time::Duration) -> Self {
        RoboflowHelmetClassifier {
            agent: remote::build_agent(timeout),
            url: format!(
                "{}/{}",
                cfg.endpoint.trim_end_matches('/'),
                cfg.model_id.trim_start_matches('/')
            ),
            api_key,
            confidence: cfg.confidence,
        }
    }

    pub fn from_config(cfg: &Config) -> Option<Self> {
        let key = remote::resolve_api_key(cfg.helmet.api_key.as_deref(), API_KEY_ENV)?;
        Some(Self::new(&cfg.helmet, key, cfg.capability_timeout()))
    }
}

impl HelmetClassifier for RoboflowHelmetClassifier {
    fn infer(&self, crop: &Mat) -> Result<bool, CapabilityError> {
        let body = remote::encode_jpeg_base64(crop)?;
        let response: DetectResponse = self
            .agent
            .post(&self.url)
            .query("api_key", &self.api_key)
            .set("Content-Type", "application/x-www-form-urlencoded")
            .send_string(&body)?
            .into_json()
            .map_err(|e| CapabilityError::Decode(e.to_string()))?;
        Ok(has_helmet(&response.predictions, self.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preds(json: &str) -> Vec<Prediction> {
        serde_json::from_str::<DetectResponse>(json).unwrap().predictions
    }

    #[test]
    fn test_helmet_needs_class_and_confidence_above_threshold() {
        let p = preds(r#"{"predictions":[{"class":"Helmet","confidence":0.71,"x":1}]}"#);
        assert!(has_helmet(&p, 0.5));

        let p = preds(r#"{"predictions":[{"class":"helmet","confidence":0.5}]}"#);
        assert!(!has_helmet(&p, 0.5));

        let p = preds(r#"{"predictions":[{"class":"head","confidence":0.99}]}"#);
        assert!(!has_helmet(&p, 0.5));

        assert!(!has_helmet(&preds("{}"), 0.5));
    }

    #[test]
    fn test_model_url_joins_cleanly() {
        let cfg = HelmetConfig {
            endpoint: "https://detect.example/".into(),
            model_id: "/helmets/3".into(),
            ..HelmetConfig::default()
        };
        let c = RoboflowHelmetClassifier::new(&cfg, "k".into(), std::time::Duration::from_secs(1));
        assert_eq!(c.url, "https://detect.example/helmets/3");
    }
}
