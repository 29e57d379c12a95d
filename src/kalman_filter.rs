use nalgebra as na;

use crate::bbox::{BBox, Xyah};

/// `(x, y, a, h, vx, vy, va, vh)`
pub type StateMean = na::SVector<f64, 8>;
pub type StateCovariance = na::SMatrix<f64, 8, 8>;

type MeasurementMean = na::Vector4<f64>;
type MeasurementCovariance = na::Matrix4<f64>;

/// 0.95 quantile of the chi-square distribution, indexed by degrees of freedom.
pub const CHI2INV95: [f64; 10] = [
    0.0, 3.8415, 5.9915, 7.8147, 9.4877, 11.070, 12.592, 14.067, 15.507, 16.919,
];

const NDIM: usize = 4;
const DT: f64 = 1.0;

const STD_WEIGHT_POSITION: f64 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f64 = 1.0 / 160.0;

// Noise floors keep every covariance handed to Cholesky positive definite.
const MIN_NOISE_HEIGHT: f64 = 1.0;
const MIN_NSA_SCALE: f64 = 0.05;

#[inline]
fn noise_height(h: f64) -> f64 {
    h.abs().max(MIN_NOISE_HEIGHT)
}

#[inline]
fn to_measurement(bbox: &BBox<Xyah>) -> MeasurementMean {
    let [x, y, a, h] = *bbox.as_slice();
    MeasurementMean::new(x as f64, y as f64, a as f64, h as f64)
}

/// Constant velocity Kalman filter for tracking bounding boxes in image space.
///
/// The 8-dimensional state space `(x, y, a, h, vx, vy, va, vh)` holds the box
/// center, aspect ratio, height and their velocities. Observations are the
/// `(x, y, a, h)` part of the state. The filter itself is stateless: means and
/// covariances are owned by the tracks.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: StateCovariance,
    update_mat: na::SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = StateCovariance::identity();
        for i in 0..NDIM {
            motion_mat[(i, NDIM + i)] = DT;
        }

        Self {
            motion_mat,
            update_mat: na::SMatrix::<f64, 4, 8>::identity(),
            std_weight_position: STD_WEIGHT_POSITION,
            std_weight_velocity: STD_WEIGHT_VELOCITY,
        }
    }

    /// Create track from an unassociated measurement.
    ///
    /// Unobserved velocities are initialized to 0.
    pub fn initiate(&self, measurement: &BBox<Xyah>) -> (StateMean, StateCovariance) {
        let z = to_measurement(measurement);
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&z);

        let h = noise_height(z[3]);
        let std = StateMean::from_column_slice(&[
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ]);

        (mean, StateCovariance::from_diagonal(&std.map(|s| s * s)))
    }

    /// Run the prediction step.
    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let h = noise_height(mean[3]);
        let std = StateMean::from_column_slice(&[
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ]);
        let motion_cov = StateCovariance::from_diagonal(&std.map(|s| s * s));

        let mean = self.motion_mat * mean;
        let covariance = self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;

        (mean, covariance)
    }

    /// Project state distribution to measurement space.
    ///
    /// When `confidence` is given the measurement noise is scaled by `1 - confidence`.
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        confidence: Option<f32>,
    ) -> (MeasurementMean, MeasurementCovariance) {
        let h = noise_height(mean[3]);
        let scale = confidence
            .map(|c| (1.0 - c as f64).clamp(MIN_NSA_SCALE, 1.0))
            .unwrap_or(1.0);

        let std = MeasurementMean::new(
            scale * self.std_weight_position * h,
            scale * self.std_weight_position * h,
            scale * 1e-1,
            scale * self.std_weight_position * h,
        );
        let innovation_cov = MeasurementCovariance::from_diagonal(&std.map(|s| s * s));

        let projected_mean = self.update_mat * mean;
        let projected_cov =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;

        (projected_mean, projected_cov)
    }

    /// Run the correction step.
    ///
    /// Returns `None` only if the projected covariance is not positive definite.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: &BBox<Xyah>,
        confidence: Option<f32>,
    ) -> Option<(StateMean, StateCovariance)> {
        debug_assert!(measurement.height() > 0.0 && measurement.aspect_ratio() > 0.0);

        let (projected_mean, projected_cov) = self.project(mean, covariance, confidence);
        let chol = na::Cholesky::new(projected_cov)?;

        let pht = covariance * self.update_mat.transpose();
        let kalman_gain = chol.solve(&pht.transpose()).transpose();
        let innovation = to_measurement(measurement) - projected_mean;

        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();

        Some((new_mean, (new_covariance + new_covariance.transpose()) * 0.5))
    }

    /// Squared Mahalanobis distance between the state distribution and each measurement.
    ///
    /// With `only_position` the distance is computed over the box center only
    /// (2 degrees of freedom), otherwise over the full `(x, y, a, h)` (4 degrees of freedom).
    pub fn gating_distance(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurements: &[BBox<Xyah>],
        only_position: bool,
    ) -> Option<Vec<f64>> {
        let (projected_mean, projected_cov) = self.project(mean, covariance, None);

        if only_position {
            let cov = na::Matrix2::new(
                projected_cov[(0, 0)],
                projected_cov[(0, 1)],
                projected_cov[(1, 0)],
                projected_cov[(1, 1)],
            );
            let l = na::Cholesky::new(cov)?.unpack();

            measurements
                .iter()
                .map(|m| {
                    let z = to_measurement(m);
                    let d = na::Vector2::new(z[0] - projected_mean[0], z[1] - projected_mean[1]);
                    l.solve_lower_triangular(&d).map(|v| v.norm_squared())
                })
                .collect()
        } else {
            let l = na::Cholesky::new(projected_cov)?.unpack();

            measurements
                .iter()
                .map(|m| {
                    let d = to_measurement(m) - projected_mean;
                    l.solve_lower_triangular(&d).map(|v| v.norm_squared())
                })
                .collect()
        }
    }
}
