use std::collections::HashMap;

use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Xyah};
use crate::error::Error;
use crate::kalman_filter::{KalmanFilter, CHI2INV95};
use crate::linear_assignment::INFTY_COST;
use crate::{Detection, Track};

/// Per-frame association switches.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct MatchOptions {
    /// Frame width in pixels, used by the boundary exemption.
    pub frame_width: f32,
    /// Forbid associations between incompatible classes.
    pub prevent_different_classes_match: bool,
    /// Skip the motion gate for boxes at the left or right frame edge.
    pub match_across_boundary: bool,
}

impl MatchOptions {
    pub fn new(frame_width: f32) -> Self {
        Self {
            frame_width,
            prevent_different_classes_match: false,
            match_across_boundary: false,
        }
    }
}

/// Mapping from class label to compatibility group.
///
/// Two labels are compatible when they are equal or share a group. A missing
/// label on either side is compatible with anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassGroups {
    groups: HashMap<i32, usize>,
}

impl ClassGroups {
    pub fn from_groups(groups: &[Vec<i32>]) -> Self {
        let mut map = HashMap::new();
        for (group, classes) in groups.iter().enumerate() {
            for &class in classes {
                map.entry(class).or_insert(group);
            }
        }

        Self { groups: map }
    }

    #[inline]
    pub fn group_of(&self, class: i32) -> Option<usize> {
        self.groups.get(&class).copied()
    }

    pub fn compatible(&self, a: Option<i32>, b: Option<i32>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => {
                a == b
                    || matches!(
                        (self.group_of(a), self.group_of(b)),
                        (Some(ga), Some(gb)) if ga == gb
                    )
            }
            _ => true,
        }
    }
}

/// Invalidate infeasible entries in the cost matrix based on the state
/// distributions obtained by Kalman filtering.
///
/// Pairs whose squared Mahalanobis distance exceeds the 95% chi-square
/// quantile are set to `INFTY_COST`. When `boundary` holds
/// `(frame_width, margin)`, pairs where the predicted track box or the
/// detection box touches the left or right frame edge are not gated.
#[allow(clippy::too_many_arguments)]
pub fn gate_cost_matrix(
    kf: &KalmanFilter,
    cost_matrix: &mut Array2<f32>,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
    boundary: Option<(f32, f32)>,
    only_position: bool,
) -> Result<(), Error> {
    let gating_threshold = if only_position {
        CHI2INV95[2]
    } else {
        CHI2INV95[4]
    };

    let measurements: Vec<BBox<Xyah>> = detection_indices
        .iter()
        .map(|&i| detections[i].to_xyah())
        .collect();

    let at_edge: Vec<bool> = match boundary {
        Some((width, margin)) => detection_indices
            .iter()
            .map(|&i| detections[i].bbox.touches_horizontal_edge(width, margin))
            .collect(),
        None => vec![false; detection_indices.len()],
    };

    for (row, &track_idx) in track_indices.iter().enumerate() {
        let track = &tracks[track_idx];
        let distances = kf
            .gating_distance(track.mean(), track.covariance(), &measurements, only_position)
            .ok_or(Error::DegenerateCovariance {
                track_id: track.track_id(),
            })?;

        let track_at_edge = boundary.map_or(false, |(width, margin)| {
            track.to_ltwh().touches_horizontal_edge(width, margin)
        });

        for (col, distance) in distances.into_iter().enumerate() {
            if track_at_edge || at_edge[col] {
                continue;
            }

            if distance > gating_threshold {
                cost_matrix[[row, col]] = INFTY_COST;
            }
        }
    }

    Ok(())
}

/// Set pairs with incompatible class labels to `INFTY_COST`. Compatible pairs
/// keep their cost.
pub fn gate_classes(
    cost_matrix: &mut Array2<f32>,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
    class_groups: &ClassGroups,
) {
    for (row, &track_idx) in track_indices.iter().enumerate() {
        let track_class = tracks[track_idx].class();

        for (col, &det_idx) in detection_indices.iter().enumerate() {
            if !class_groups.compatible(track_class, detections[det_idx].class) {
                cost_matrix[[row, col]] = INFTY_COST;
            }
        }
    }
}
