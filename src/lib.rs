//! Multi-object tracking by detection with appearance re-identification.
//!
//! Each frame the [`Tracker`] predicts every track with a constant velocity
//! Kalman filter, associates detections in a matching cascade on gated
//! appearance cost, falls back to IoU matching for young and just-missed tracks,
//! and manages the track lifecycle. [`StrongSort`] wraps this with cropping and
//! feature extraction for whole frames.

pub mod bbox;
pub mod config;
pub mod detection;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod gating;
pub mod iou_matching;
pub mod kalman_filter;
pub mod linear_assignment;
pub mod nn_matching;
pub mod pipeline;
pub mod track;
pub mod tracker;

mod circular_queue;

pub use config::{PipelineConfig, TrackerConfig};
pub use detection::Detection;
pub use error::Error;
pub use extractor::{ExtractorKind, FeatureExtractor};
pub use frame::Frame;
pub use gating::MatchOptions;
pub use pipeline::{StrongSort, UpdateFlags};
pub use track::{Track, TrackState};
pub use tracker::{TrackOutput, Tracker};
