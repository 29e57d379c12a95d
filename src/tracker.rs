use ndarray::{Array2, Axis};
use serde_derive::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::Error;
use crate::gating::{gate_classes, gate_cost_matrix, ClassGroups, MatchOptions};
use crate::iou_matching::iou_cost;
use crate::kalman_filter::KalmanFilter;
use crate::linear_assignment::{matching_cascade, min_cost_matching, Matching};
use crate::nn_matching::NearestNeighborDistanceMetric;
use crate::track::Track;
use crate::Detection;

/// A confirmed, recently updated track as reported to the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackOutput {
    pub track_id: u64,
    /// `[left, top, right, bottom]` in pixels.
    pub ltrb: [i32; 4],
    pub class: Option<i32>,
    pub score: f32,
}

impl TrackOutput {
    fn from_track(track: &Track) -> Self {
        let ltrb = track.to_ltwh().as_ltrb();
        let [l, t, r, b] = *ltrb.as_slice();

        Self {
            track_id: track.track_id(),
            ltrb: [l as i32, t as i32, r as i32, b as i32],
            class: track.class(),
            score: track.score(),
        }
    }
}

/// This is the multi-target tracker.
///
/// Call [`predict`](Tracker::predict) once per frame, then
/// [`update`](Tracker::update) with the frame's detections.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackerConfig,
    kf: KalmanFilter,
    metric: NearestNeighborDistanceMetric,
    class_groups: ClassGroups,
    tracks: Vec<Track>,
    feature_dim: Option<usize>,
    next_id: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::from_config(TrackerConfig::default())
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self::from_config(config))
    }

    fn from_config(config: TrackerConfig) -> Self {
        let metric = NearestNeighborDistanceMetric::new(
            config.metric,
            config.max_cosine_distance,
            config.nn_budget,
            config.ema,
        );

        Self {
            kf: KalmanFilter::new(),
            metric,
            class_groups: ClassGroups::from_groups(&config.class_groups),
            tracks: Vec::new(),
            feature_dim: None,
            next_id: 1,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks in creation order.
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn metric(&self) -> &NearestNeighborDistanceMetric {
        &self.metric
    }

    #[inline]
    pub fn kalman_filter(&self) -> &KalmanFilter {
        &self.kf
    }

    /// Propagate track state distributions one time step forward.
    ///
    /// This function should be called once every time step, before `update`.
    pub fn predict(&mut self) {
        for track in &mut self.tracks {
            track.predict(&self.kf);
        }
    }

    /// Perform measurement update and track management.
    ///
    /// Detections are validated and all measurement corrections computed
    /// before any track is touched. On error the tracker is left as it was
    /// after `predict`.
    pub fn update(&mut self, detections: &[Detection], opts: &MatchOptions) -> Result<(), Error> {
        self.validate(detections)?;

        let Matching {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = self.associate(detections, opts)?;

        tracing::trace!(
            matched = matches.len(),
            missed = unmatched_tracks.len(),
            new = unmatched_detections.len(),
            "association done"
        );

        // All fallible corrections run before any track is mutated.
        let corrections = matches
            .iter()
            .map(|&(track_idx, det_idx)| self.tracks[track_idx].correct(&self.kf, &detections[det_idx]))
            .collect::<Result<Vec<_>, Error>>()?;

        for (&(track_idx, det_idx), correction) in matches.iter().zip(corrections) {
            self.tracks[track_idx].apply(correction, &detections[det_idx]);
        }

        for &track_idx in &unmatched_tracks {
            self.tracks[track_idx].mark_missed();
        }

        for &det_idx in &unmatched_detections {
            self.initiate_track(&detections[det_idx]);
        }

        self.tracks.retain(|t| !t.is_deleted());

        self.refit_metric()
    }

    /// Confirmed tracks that were updated in the current or previous frame.
    pub fn outputs(&self) -> Vec<TrackOutput> {
        self.tracks
            .iter()
            .filter(|t| t.is_confirmed() && t.time_since_update() <= 1)
            .map(TrackOutput::from_track)
            .collect()
    }

    fn validate(&mut self, detections: &[Detection]) -> Result<(), Error> {
        let mut feature_dim = self.feature_dim.or_else(|| self.metric.feature_dim());

        for (index, det) in detections.iter().enumerate() {
            if !det.bbox.is_valid() {
                return Err(Error::DegenerateBox { index });
            }

            let actual = det.feature_dim();
            match feature_dim {
                Some(expected) if expected != actual => {
                    return Err(Error::FeatureDimension { expected, actual });
                }
                Some(_) => {}
                None => feature_dim = Some(actual),
            }
        }

        self.feature_dim = feature_dim;

        Ok(())
    }

    /// Appearance cost gated by motion plausibility and, when requested, by
    /// class compatibility.
    pub fn gated_cost(
        &self,
        opts: &MatchOptions,
        tracks: &[Track],
        detections: &[Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Result<Array2<f32>, Error> {
        let views: Vec<_> = detection_indices
            .iter()
            .map(|&i| detections[i].feature.view())
            .collect();
        let features = ndarray::stack(Axis(0), &views).map_err(|_| Error::FeatureDimension {
            expected: self.feature_dim.unwrap_or(0),
            actual: views.first().map_or(0, |v| v.len()),
        })?;

        let targets: Vec<u64> = track_indices
            .iter()
            .map(|&i| tracks[i].track_id())
            .collect();

        let mut cost_matrix = self.metric.distance(features.view(), &targets)?;

        let boundary = if opts.match_across_boundary {
            Some((opts.frame_width, self.config.boundary_margin))
        } else {
            None
        };

        gate_cost_matrix(
            &self.kf,
            &mut cost_matrix,
            tracks,
            detections,
            track_indices,
            detection_indices,
            boundary,
            self.config.only_position,
        )?;

        if opts.prevent_different_classes_match {
            gate_classes(
                &mut cost_matrix,
                tracks,
                detections,
                track_indices,
                detection_indices,
                &self.class_groups,
            );
        }

        Ok(cost_matrix)
    }

    fn associate(&self, detections: &[Detection], opts: &MatchOptions) -> Result<Matching, Error> {
        let (confirmed, unconfirmed): (Vec<usize>, Vec<usize>) =
            (0..self.tracks.len()).partition(|&i| self.tracks[i].is_confirmed());

        let all_detections: Vec<usize> = (0..detections.len()).collect();

        // Associate confirmed tracks using appearance and motion.
        let mut gated_metric = |tracks: &[Track], dets: &[Detection], ti: &[usize], di: &[usize]| {
            self.gated_cost(opts, tracks, dets, ti, di)
        };
        let cascade = matching_cascade(
            &mut gated_metric,
            self.metric.matching_threshold(),
            self.config.max_age,
            &self.tracks,
            detections,
            &confirmed,
            &all_detections,
        )?;

        // Associate remaining tracks together with unconfirmed tracks using IoU.
        let (fresh, stale): (Vec<usize>, Vec<usize>) = cascade
            .unmatched_tracks
            .iter()
            .partition(|&&k| self.tracks[k].time_since_update() == 1);

        let mut iou_candidates = unconfirmed;
        iou_candidates.extend(fresh);

        let mut iou_metric = |tracks: &[Track],
                              dets: &[Detection],
                              ti: &[usize],
                              di: &[usize]|
         -> Result<Array2<f32>, Error> {
            let mut cost_matrix = iou_cost(tracks, dets, ti, di)?;
            if opts.prevent_different_classes_match {
                gate_classes(&mut cost_matrix, tracks, dets, ti, di, &self.class_groups);
            }

            Ok(cost_matrix)
        };
        let fallback = min_cost_matching(
            &mut iou_metric,
            self.config.max_iou_distance,
            &self.tracks,
            detections,
            &iou_candidates,
            &cascade.unmatched_detections,
        )?;

        let mut matches = cascade.matches;
        matches.extend(fallback.matches);

        let mut unmatched_tracks = stale;
        unmatched_tracks.extend(fallback.unmatched_tracks);

        Ok(Matching {
            matches,
            unmatched_tracks,
            unmatched_detections: fallback.unmatched_detections,
        })
    }

    fn initiate_track(&mut self, detection: &Detection) {
        let track_id = self.next_id;
        self.next_id += 1;

        self.tracks.push(Track::initiate(
            &self.kf,
            detection,
            track_id,
            self.config.track_params(),
        ));

        tracing::debug!(track_id, class = ?detection.class, "track created");
    }

    /// Feed features of confirmed tracks into the gallery and drop gallery
    /// entries of tracks that are gone or not confirmed.
    fn refit_metric(&mut self) -> Result<(), Error> {
        let mut active_targets = Vec::new();
        let mut features = Vec::new();
        let mut targets = Vec::new();
        let keep_features = self.metric.is_ema();

        for track in self.tracks.iter_mut().filter(|t| t.is_confirmed()) {
            active_targets.push(track.track_id());
            for feature in track.features() {
                features.push(feature.clone());
                targets.push(track.track_id());
            }

            if !keep_features {
                track.clear_features();
            }
        }

        self.metric.partial_fit(&features, &targets, &active_targets)
    }
}
