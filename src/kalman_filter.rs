use nalgebra::{SMatrix, SVector};

pub type StateMean = SVector<f32, 8>;
pub type StateCov = SMatrix<f32, 8, 8>;
pub type Measurement = SVector<f32, 4>;

/// Constant-velocity Kalman filter over a tlwh box.
///
/// State is `(x, y, w, h, vx, vy, vw, vh)`; noise is scaled by box size so a
/// large truck near the camera is allowed to move more pixels than a distant
/// motorcycle.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f32, 8, 8>,
    update_mat: SMatrix<f32, 4, 8>,
    std_weight_position: f32,
    std_weight_velocity: f32,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let ndim = 4;
        let dt = 1.0;
        let mut motion_mat = SMatrix::<f32, 8, 8>::identity();
        for i in 0..ndim {
            motion_mat[(i, ndim + i)] = dt;
        }
        KalmanFilter {
            motion_mat,
            update_mat: SMatrix::<f32, 4, 8>::identity(),
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Create a track distribution from an unassociated measurement.
    pub fn initiate(&self, measurement: &Measurement) -> (StateMean, StateCov) {
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(measurement);

        let (w, h) = (measurement[2], measurement[3]);
        let pos = 2.0 * self.std_weight_position;
        let vel = 10.0 * self.std_weight_velocity;
        let std = StateMean::from_column_slice(&[
            pos * w,
            pos * h,
            pos * w,
            pos * h,
            vel * w,
            vel * h,
            vel * w,
            vel * h,
        ]);
        (mean, StateCov::from_diagonal(&std.component_mul(&std)))
    }

    /// x' = F x, P' = F P F^T + Q
    pub fn predict(&self, mean: &StateMean, covariance: &StateCov) -> (StateMean, StateCov) {
        let (w, h) = (mean[2], mean[3]);
        let pos = self.std_weight_position;
        let vel = self.std_weight_velocity;
        let std = StateMean::from_column_slice(&[
            pos * w,
            pos * h,
            pos * w,
            pos * h,
            vel * w,
            vel * h,
            vel * w,
            vel * h,
        ]);
        let q = StateCov::from_diagonal(&std.component_mul(&std));

        let new_mean = self.motion_mat * mean;
        let new_cov = self.motion_mat * covariance * self.motion_mat.transpose() + q;
        (new_mean, new_cov)
    }

    /// z = H x, S = H P H^T + R
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
    ) -> (Measurement, SMatrix<f32, 4, 4>) {
        let (w, h) = (mean[2], mean[3]);
        let pos = self.std_weight_position;
        let std = Measurement::new(pos * w, pos * h, pos * w, pos * h);
        let r = SMatrix::<f32, 4, 4>::from_diagonal(&std.component_mul(&std));

        let z = self.update_mat * mean;
        let s = self.update_mat * covariance * self.update_mat.transpose() + r;
        (z, s)
    }

    /// Correction step. A singular innovation covariance leaves the state
    /// unchanged.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
        measurement: &Measurement,
    ) -> (StateMean, StateCov) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let mut s = projected_cov;
        for i in 0..4 {
            s[(i, i)] += 1e-8;
        }
        let Some(s_inv) = s.try_inverse() else {
            return (*mean, *covariance);
        };

        let gain: SMatrix<f32, 8, 4> = covariance * self.update_mat.transpose() * s_inv;
        let innovation = measurement - projected_mean;
        let new_mean = mean + gain * innovation;
        let new_cov = covariance - gain * projected_cov * gain.transpose();
        (new_mean, new_cov)
    }
}
