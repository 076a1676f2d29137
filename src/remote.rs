use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use opencv::{core::Mat, core::Vector, imgcodecs, prelude::*};

use crate::error::CapabilityError;

/// HTTP agent whose connect/read/write timeouts all equal `timeout`.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(concat!("trafficwatch/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// JPEG-encode a crop and return it as standard base64.
pub fn encode_jpeg_base64(crop: &Mat) -> Result<String, CapabilityError> {
    if crop.empty() {
        return Err(CapabilityError::Decode("empty crop".to_string()));
    }
    let mut buf = Vector::<u8>::new();
    let ok = imgcodecs::imencode(".jpg", crop, &mut buf, &Vector::new())?;
    if !ok {
        return Err(CapabilityError::Backend("jpeg encoding failed".to_string()));
    }
    Ok(STANDARD.encode(buf.as_slice()))
}

/// Read an API key from the config, falling back to an environment variable.
pub fn resolve_api_key(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.trim().is_empty())
}
