use std::collections::{HashMap, HashSet};

use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::circular_queue::CircularQueue;
use crate::error::Error;
use crate::linear_assignment::INFTY_COST;

const NORM_EPSILON: f32 = 1e-12;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`, features are normalized before comparison.
    Cosine,
    /// Squared euclidean distance.
    Euclidean,
}

/// Rows scaled to unit length. Zero rows stay zero.
fn normalize_rows(m: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = m.to_owned();
    for mut row in out.rows_mut() {
        let norm = row.dot(&row).sqrt().max(NORM_EPSILON);
        row /= norm;
    }
    out
}

/// Pairwise `1 - cos` between rows of `a` (n×m) and rows of `b` (k×m), shape n×k.
fn cosine_distance(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Array2<f32> {
    let a = normalize_rows(a);
    let b = normalize_rows(b);
    1.0 - a.dot(&b.t())
}

/// Pairwise squared distance between rows of `a` and rows of `b`, shape n×k.
fn squared_distance(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Array2<f32> {
    let a2: Array1<f32> = a.rows().into_iter().map(|r| r.dot(&r)).collect();
    let b2: Array1<f32> = b.rows().into_iter().map(|r| r.dot(&r)).collect();

    let mut d = a.dot(&b.t()) * -2.0;
    d += &a2.insert_axis(Axis(1));
    d += &b2.insert_axis(Axis(0));
    d.mapv_inplace(|v| v.max(0.0));
    d
}

/// A nearest neighbor distance metric that, for each target, returns the
/// closest distance to any sample that has been observed so far.
///
/// The gallery keeps at most `budget` samples per target (oldest dropped first).
/// In EMA mode it keeps a single running appearance vector per target instead.
#[derive(Debug, Clone)]
pub struct NearestNeighborDistanceMetric {
    metric: Metric,
    matching_threshold: f32,
    budget: Option<usize>,
    ema: bool,
    feature_dim: Option<usize>,
    samples: HashMap<u64, CircularQueue<Array1<f32>>>,
}

impl NearestNeighborDistanceMetric {
    pub fn new(metric: Metric, matching_threshold: f32, budget: Option<usize>, ema: bool) -> Self {
        Self {
            metric,
            matching_threshold,
            budget,
            ema,
            feature_dim: None,
            samples: HashMap::new(),
        }
    }

    #[inline]
    pub fn matching_threshold(&self) -> f32 {
        self.matching_threshold
    }

    #[inline]
    pub fn feature_dim(&self) -> Option<usize> {
        self.feature_dim
    }

    #[inline]
    pub fn is_ema(&self) -> bool {
        self.ema
    }

    /// Number of stored samples for `target`.
    #[inline]
    pub fn sample_count(&self, target: u64) -> usize {
        self.samples.get(&target).map_or(0, |s| s.len())
    }

    #[inline]
    pub fn targets(&self) -> impl Iterator<Item = &u64> {
        self.samples.keys()
    }

    fn check_dim(&mut self, actual: usize) -> Result<(), Error> {
        match self.feature_dim {
            Some(expected) if expected != actual => {
                Err(Error::FeatureDimension { expected, actual })
            }
            Some(_) => Ok(()),
            None => {
                self.feature_dim = Some(actual);
                Ok(())
            }
        }
    }

    /// Update the gallery with new data.
    ///
    /// `features[i]` belongs to `targets[i]`. Afterwards every target that is not
    /// listed in `active_targets` is dropped from the gallery.
    pub fn partial_fit(
        &mut self,
        features: &[Array1<f32>],
        targets: &[u64],
        active_targets: &[u64],
    ) -> Result<(), Error> {
        if features.len() != targets.len() {
            return Err(Error::LengthMismatch {
                what: "gallery targets",
                expected: features.len(),
                actual: targets.len(),
            });
        }

        for (feature, &target) in features.iter().zip(targets) {
            self.check_dim(feature.len())?;

            let budget = self.budget;
            let samples = self
                .samples
                .entry(target)
                .or_insert_with(|| CircularQueue::new(budget));

            if self.ema {
                samples.replace(feature.clone());
            } else {
                samples.push(feature.clone());
            }
        }

        let active: HashSet<u64> = active_targets.iter().copied().collect();
        self.samples.retain(|target, _| active.contains(target));

        Ok(())
    }

    /// Compute distance between `features` (N×M) and `targets`.
    ///
    /// Returns a cost matrix of shape `targets.len() × N` where element `(i, j)`
    /// is the smallest distance between any stored sample of `targets[i]` and
    /// `features[j]`. Targets without stored samples get `INFTY_COST` rows.
    pub fn distance(
        &self,
        features: ArrayView2<'_, f32>,
        targets: &[u64],
    ) -> Result<Array2<f32>, Error> {
        let mut cost_matrix = Array2::from_elem((targets.len(), features.nrows()), INFTY_COST);

        if features.nrows() == 0 {
            return Ok(cost_matrix);
        }

        if let Some(expected) = self.feature_dim {
            if features.ncols() != expected {
                return Err(Error::FeatureDimension {
                    expected,
                    actual: features.ncols(),
                });
            }
        }

        for (i, target) in targets.iter().enumerate() {
            let samples = match self.samples.get(target) {
                Some(samples) if !samples.is_empty() => samples,
                _ => continue,
            };

            let views: Vec<_> = samples.iter().map(|s| s.view()).collect();
            let gallery = ndarray::stack(Axis(0), &views).map_err(|_| Error::FeatureDimension {
                expected: features.ncols(),
                actual: samples.latest().map_or(0, |s| s.len()),
            })?;

            let distances = match self.metric {
                Metric::Cosine => cosine_distance(gallery.view(), features),
                Metric::Euclidean => squared_distance(gallery.view(), features),
            };

            let nearest = distances.fold_axis(Axis(0), f32::INFINITY, |&acc, &d| acc.min(d));
            cost_matrix.row_mut(i).assign(&nearest);
        }

        Ok(cost_matrix)
    }
}
