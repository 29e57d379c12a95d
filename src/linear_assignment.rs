use std::collections::HashSet;

use munkres::{solve_assignment, WeightMatrix};
use ndarray::Array2;

use crate::error::Error;
use crate::{Detection, Track};

/// Cost of an infeasible association.
pub const INFTY_COST: f32 = 1e5;

// Entries above the rejection threshold are clamped to `max_distance + REJECT_MARGIN`
// before solving, which keeps the solver away from the sentinel magnitudes.
const REJECT_MARGIN: f32 = 1e-5;

/// Result of an association round. Indices refer to the tracker's track and
/// detection arrays, not to positions inside the cost matrix.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Matching {
    /// `(track index, detection index)`
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Solve the rectangular assignment problem on `cost` (rows × columns),
/// returning `(row, column)` pairs. The matrix is padded to a square one with
/// a constant, which leaves the optimum of the real part unchanged.
fn solve(cost: &Array2<f32>, padding: f32) -> Vec<(usize, usize)> {
    let (rows, cols) = cost.dim();
    let n = rows.max(cols);

    let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
        if r < rows && c < cols {
            cost[[r, c]] as f64
        } else {
            padding as f64
        }
    });

    match solve_assignment(&mut weights) {
        Ok(positions) => positions
            .into_iter()
            .filter(|p| p.row < rows && p.column < cols)
            .map(|p| (p.row, p.column))
            .collect(),
        Err(err) => {
            tracing::warn!(?err, rows, cols, "assignment could not be solved");
            Vec::new()
        }
    }
}

/// Solve linear assignment problem.
///
/// `cost_fn` builds the cost matrix for the given subset of tracks (rows) and
/// detections (columns). Associations with cost larger than `max_distance`
/// are rejected and reported in both unmatched lists.
pub fn min_cost_matching<C>(
    cost_fn: &mut C,
    max_distance: f32,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Result<Matching, Error>
where
    C: FnMut(&[Track], &[Detection], &[usize], &[usize]) -> Result<Array2<f32>, Error>,
{
    if track_indices.is_empty() || detection_indices.is_empty() {
        return Ok(Matching {
            matches: Vec::new(),
            unmatched_tracks: track_indices.to_vec(),
            unmatched_detections: detection_indices.to_vec(),
        });
    }

    let mut cost = cost_fn(tracks, detections, track_indices, detection_indices)?;
    debug_assert_eq!(cost.dim(), (track_indices.len(), detection_indices.len()));

    let rejected = max_distance + REJECT_MARGIN;
    cost.mapv_inplace(|c| if c <= max_distance { c } else { rejected });

    let mut matched_rows = HashSet::new();
    let mut matched_cols = HashSet::new();
    let mut matches = Vec::new();

    for (row, col) in solve(&cost, rejected) {
        if cost[[row, col]] > max_distance {
            continue;
        }

        matched_rows.insert(row);
        matched_cols.insert(col);
        matches.push((track_indices[row], detection_indices[col]));
    }

    let unmatched_tracks = track_indices
        .iter()
        .enumerate()
        .filter(|(row, _)| !matched_rows.contains(row))
        .map(|(_, &idx)| idx)
        .collect();

    let unmatched_detections = detection_indices
        .iter()
        .enumerate()
        .filter(|(col, _)| !matched_cols.contains(col))
        .map(|(_, &idx)| idx)
        .collect();

    Ok(Matching {
        matches,
        unmatched_tracks,
        unmatched_detections,
    })
}

/// Run matching cascade.
///
/// Tracks are matched in rounds of increasing `time_since_update`
/// (1 up to `cascade_depth`), so recently updated tracks get the first pick
/// of the detections. Each round only sees detections left over by the previous ones.
pub fn matching_cascade<C>(
    cost_fn: &mut C,
    max_distance: f32,
    cascade_depth: u32,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Result<Matching, Error>
where
    C: FnMut(&[Track], &[Detection], &[usize], &[usize]) -> Result<Array2<f32>, Error>,
{
    let mut unmatched_detections = detection_indices.to_vec();
    let mut matches = Vec::new();

    for level in 1..=cascade_depth {
        if unmatched_detections.is_empty() {
            break;
        }

        let level_tracks: Vec<usize> = track_indices
            .iter()
            .copied()
            .filter(|&k| tracks[k].time_since_update() == level)
            .collect();

        if level_tracks.is_empty() {
            continue;
        }

        let round = min_cost_matching(
            cost_fn,
            max_distance,
            tracks,
            detections,
            &level_tracks,
            &unmatched_detections,
        )?;

        tracing::trace!(
            level,
            tracks = level_tracks.len(),
            matched = round.matches.len(),
            "cascade level"
        );

        matches.extend(round.matches);
        unmatched_detections = round.unmatched_detections;
    }

    let matched: HashSet<usize> = matches.iter().map(|&(t, _)| t).collect();
    let unmatched_tracks = track_indices
        .iter()
        .copied()
        .filter(|k| !matched.contains(k))
        .collect();

    Ok(Matching {
        matches,
        unmatched_tracks,
        unmatched_detections,
    })
}
