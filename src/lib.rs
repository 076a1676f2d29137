pub mod annotate;
pub mod billing;
pub mod classifier;
pub mod config;
pub mod deadline;
pub mod detection;
pub mod error;
pub mod helmet;
pub mod kalman_filter;
pub mod ocr;
pub mod pipeline;
pub mod plate;
pub mod registry;
pub mod remote;
pub mod replay;
pub mod signal;
pub mod sink;
pub mod speed;
pub mod track_store;
pub mod tracker;
pub mod utils;
pub mod video;
pub mod violation;
pub mod yolo;

// Re-export main types
pub use crate::config::Config;
pub use crate::detection::{Detection, Detector};
pub use crate::error::{CapabilityError, ConfigError, PipelineError, SinkError};
pub use crate::pipeline::{Capabilities, FrameOutcome, Pipeline};
pub use crate::sink::ViolationSink;
pub use crate::tracker::{SortTracker, TrackedObject, Tracker};
pub use crate::violation::{PaymentStatus, ViolationEvent, ViolationKind, ViolationRecord};
