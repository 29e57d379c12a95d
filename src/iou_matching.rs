use ndarray::Array2;

use crate::error::Error;
use crate::linear_assignment::INFTY_COST;
use crate::{Detection, Track};

/// An intersection over union distance metric.
///
/// Returns a `track_indices.len() × detection_indices.len()` matrix holding
/// `1 - iou(track, detection)`. Tracks that were not updated in the previous
/// frame are excluded from IoU association and get `INFTY_COST` rows.
pub fn iou_cost(
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Result<Array2<f32>, Error> {
    let mut cost_matrix = Array2::zeros((track_indices.len(), detection_indices.len()));

    for (row, &track_idx) in track_indices.iter().enumerate() {
        let track = &tracks[track_idx];

        if track.time_since_update() > 1 {
            cost_matrix.row_mut(row).fill(INFTY_COST);
            continue;
        }

        let bbox = track.to_ltwh();
        for (col, &det_idx) in detection_indices.iter().enumerate() {
            cost_matrix[[row, col]] = 1.0 - bbox.iou(&detections[det_idx].bbox);
        }
    }

    Ok(cost_matrix)
}
