use ndarray::Array1;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltwh, Xyah};
use crate::error::Error;
use crate::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::Detection;

const NORM_EPSILON: f32 = 1e-12;

/// Newly created tracks are `Tentative` until enough evidence has been
/// collected, then `Confirmed`. Tracks that are no longer alive are `Deleted`
/// and get removed from the set of active tracks.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// Lifecycle parameters shared by all tracks of one tracker.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrackParams {
    /// Number of consecutive detections before the track is confirmed.
    pub n_init: u32,
    /// Maximum number of consecutive misses before a confirmed track is deleted.
    pub max_age: u32,
    /// Smoothing factor of the appearance running average, `None` keeps a feature history.
    pub ema_alpha: Option<f32>,
    /// Scale measurement noise with detection confidence.
    pub nsa: bool,
}

#[inline]
fn normalized(feature: &Array1<f32>) -> Array1<f32> {
    let norm = feature.dot(feature).sqrt().max(NORM_EPSILON);
    feature / norm
}

/// Corrected motion state produced by [`Track::correct`].
#[derive(Debug, Clone)]
pub struct Correction {
    mean: StateMean,
    covariance: StateCovariance,
}

/// A single target track with state space `(x, y, a, h)` and associated
/// velocities, where `(x, y)` is the center of the bounding box, `a` is the
/// aspect ratio and `h` is the height.
///
/// `hits` counts measurement updates, `age` counts frames since creation and
/// `time_since_update` counts frames since the last measurement update.
#[derive(Debug, Clone)]
pub struct Track {
    track_id: u64,
    mean: StateMean,
    covariance: StateCovariance,
    state: TrackState,
    hits: u32,
    age: u32,
    time_since_update: u32,
    features: Vec<Array1<f32>>,
    class: Option<i32>,
    score: f32,
    params: TrackParams,
}

impl Track {
    /// Start a tentative track from an unassociated detection.
    pub fn initiate(
        kf: &KalmanFilter,
        detection: &Detection,
        track_id: u64,
        params: TrackParams,
    ) -> Self {
        let (mean, covariance) = kf.initiate(&detection.to_xyah());
        let feature = if params.ema_alpha.is_some() {
            normalized(&detection.feature)
        } else {
            detection.feature.clone()
        };

        Self {
            track_id,
            mean,
            covariance,
            state: TrackState::Tentative,
            hits: 1,
            age: 1,
            time_since_update: 0,
            features: vec![feature],
            class: detection.class,
            score: detection.confidence,
            params,
        }
    }

    #[inline]
    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[inline]
    pub fn time_since_update(&self) -> u32 {
        self.time_since_update
    }

    #[inline]
    pub fn class(&self) -> Option<i32> {
        self.class
    }

    #[inline]
    pub fn score(&self) -> f32 {
        self.score
    }

    #[inline]
    pub fn mean(&self) -> &StateMean {
        &self.mean
    }

    #[inline]
    pub fn covariance(&self) -> &StateCovariance {
        &self.covariance
    }

    /// Appearance features gathered since the last gallery refit
    /// (a single running average in EMA mode).
    #[inline]
    pub fn features(&self) -> &[Array1<f32>] {
        &self.features
    }

    #[inline]
    pub fn clear_features(&mut self) {
        self.features.clear();
    }

    /// Current position in `(center x, center y, aspect ratio, height)`.
    #[inline]
    pub fn to_xyah(&self) -> BBox<Xyah> {
        BBox::xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Current position in `(top left x, top left y, width, height)`.
    #[inline]
    pub fn to_ltwh(&self) -> BBox<Ltwh> {
        self.to_xyah().as_ltwh()
    }

    /// Propagate the state distribution to the current time step.
    pub fn predict(&mut self, kf: &KalmanFilter) {
        let (mean, covariance) = kf.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.age += 1;
        self.time_since_update += 1;
    }

    /// Perform the measurement update step and record the detection's appearance.
    ///
    /// On error the track is left untouched.
    pub fn update(&mut self, kf: &KalmanFilter, detection: &Detection) -> Result<(), Error> {
        let correction = self.correct(kf, detection)?;
        self.apply(correction, detection);

        Ok(())
    }

    /// Fallible half of [`update`](Track::update): computes the corrected state
    /// and checks the detection's feature without mutating the track.
    pub fn correct(&self, kf: &KalmanFilter, detection: &Detection) -> Result<Correction, Error> {
        if let Some(prev) = self.features.last() {
            if prev.len() != detection.feature_dim() {
                return Err(Error::FeatureDimension {
                    expected: prev.len(),
                    actual: detection.feature_dim(),
                });
            }
        }

        let confidence = if self.params.nsa {
            Some(detection.confidence)
        } else {
            None
        };

        let (mean, covariance) = kf
            .update(&self.mean, &self.covariance, &detection.to_xyah(), confidence)
            .ok_or(Error::DegenerateCovariance {
                track_id: self.track_id,
            })?;

        Ok(Correction { mean, covariance })
    }

    /// Infallible half of [`update`](Track::update). `correction` must come
    /// from [`correct`](Track::correct) with the same detection.
    pub fn apply(&mut self, correction: Correction, detection: &Detection) {
        self.mean = correction.mean;
        self.covariance = correction.covariance;

        match self.params.ema_alpha {
            Some(alpha) => {
                let feature = normalized(&detection.feature);
                let smooth = match self.features.last() {
                    Some(prev) => prev * alpha + &feature * (1.0 - alpha),
                    None => feature,
                };
                self.features = vec![normalized(&smooth)];
            }
            None => self.features.push(detection.feature.clone()),
        }

        self.score = detection.confidence;
        self.hits += 1;
        self.time_since_update = 0;

        if self.state == TrackState::Tentative && self.hits >= self.params.n_init {
            self.state = TrackState::Confirmed;
            tracing::debug!(track_id = self.track_id, "track confirmed");
        }
    }

    /// Mark this track as missed (no association at the current time step).
    pub fn mark_missed(&mut self) {
        if self.state == TrackState::Tentative || self.time_since_update > self.params.max_age {
            self.state = TrackState::Deleted;
            tracing::debug!(
                track_id = self.track_id,
                time_since_update = self.time_since_update,
                "track deleted"
            );
        }
    }

    #[inline]
    pub fn is_tentative(&self) -> bool {
        self.state == TrackState::Tentative
    }

    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }
}
