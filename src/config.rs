//! Tracker and pipeline parameters. Both structs load from JSON; missing
//! fields fall back to their defaults.

use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::extractor::ExtractorKind;
use crate::nn_matching::Metric;
use crate::track::TrackParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// IoU fallback rejection threshold (`1 - iou`).
    pub max_iou_distance: f32,
    /// Frames a confirmed track survives without a match.
    pub max_age: u32,
    /// Hits needed to confirm a track.
    pub n_init: u32,
    /// Appearance rejection threshold.
    pub max_cosine_distance: f32,
    /// Gallery samples kept per identity, unbounded if `None`.
    pub nn_budget: Option<usize>,
    pub metric: Metric,
    /// Keep one running-average feature per track instead of a history.
    pub ema: bool,
    pub ema_alpha: f32,
    /// Scale measurement noise by detection confidence.
    pub nsa: bool,
    /// Gate on box center only (2 dof) instead of the full measurement.
    pub only_position: bool,
    /// Groups of mutually compatible class labels.
    pub class_groups: Vec<Vec<i32>>,
    /// Distance in pixels from the left/right frame edge counted as "at the boundary".
    pub boundary_margin: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_iou_distance: 0.7,
            max_age: 30,
            n_init: 3,
            max_cosine_distance: 0.2,
            nn_budget: Some(100),
            metric: Metric::Cosine,
            ema: true,
            ema_alpha: 0.9,
            nsa: false,
            only_position: false,
            // vehicles (car, bus, truck) and two-wheelers with riders
            class_groups: vec![vec![2, 5, 7], vec![0, 1, 3]],
            boundary_margin: 1.0,
        }
    }
}

fn non_negative(name: &str, value: f32) -> Result<(), Error> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )))
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        non_negative("max_iou_distance", self.max_iou_distance)?;
        non_negative("max_cosine_distance", self.max_cosine_distance)?;
        non_negative("boundary_margin", self.boundary_margin)?;

        if self.n_init < 1 {
            return Err(Error::InvalidConfig("n_init must be at least 1".into()));
        }

        if self.max_age < 1 {
            return Err(Error::InvalidConfig("max_age must be at least 1".into()));
        }

        if self.nn_budget == Some(0) {
            return Err(Error::InvalidConfig("nn_budget must be positive".into()));
        }

        if self.ema && !(self.ema_alpha > 0.0 && self.ema_alpha < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "ema_alpha must be in (0, 1), got {}",
                self.ema_alpha
            )));
        }

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    pub fn track_params(&self) -> TrackParams {
        TrackParams {
            n_init: self.n_init,
            max_age: self.max_age,
            ema_alpha: if self.ema { Some(self.ema_alpha) } else { None },
            nsa: self.nsa,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detections at or below this confidence are dropped.
    pub min_confidence: f32,
    pub extractor: ExtractorKind,
    pub tracker: TrackerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            extractor: ExtractorKind::default(),
            tracker: TrackerConfig {
                n_init: 5,
                max_cosine_distance: 0.2,
                nn_budget: Some(100),
                ..TrackerConfig::default()
            },
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        non_negative("min_confidence", self.min_confidence)?;
        self.extractor.validate()?;
        self.tracker.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("cannot read config: {}", e)))?;

        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TrackerConfig::default().validate().unwrap();
        PipelineConfig::default().validate().unwrap();
        assert_eq!(PipelineConfig::default().tracker.n_init, 5);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = TrackerConfig::from_json_str(r#"{ "max_age": 5, "nn_budget": null }"#).unwrap();

        assert_eq!(config.max_age, 5);
        assert_eq!(config.nn_budget, None);
        assert_eq!(config.n_init, 3);
        assert_eq!(config.class_groups, vec![vec![2, 5, 7], vec![0, 1, 3]]);
    }

    #[test]
    fn pipeline_json() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "min_confidence": 0.5,
                "extractor": { "grid_color": { "rows": 4, "cols": 2 } },
                "tracker": { "ema": false, "metric": "euclidean" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.min_confidence, 0.5);
        assert_eq!(config.extractor, ExtractorKind::GridColor { rows: 4, cols: 2 });
        assert!(!config.tracker.ema);
        assert_eq!(config.tracker.metric, Metric::Euclidean);
        assert_eq!(config.tracker.track_params().ema_alpha, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for json in [
            r#"{ "n_init": 0 }"#,
            r#"{ "max_age": 0 }"#,
            r#"{ "nn_budget": 0 }"#,
            r#"{ "ema_alpha": 1.5 }"#,
            r#"{ "max_cosine_distance": -0.1 }"#,
        ] {
            assert!(matches!(
                TrackerConfig::from_json_str(json),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            TrackerConfig::from_json_str("{ max_age: "),
            Err(Error::Config(_))
        ));
    }
}
