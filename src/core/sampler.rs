//! Uniform sampling of unit hyperspheres and balls.
//!
//! Encoders are drawn on the surface of the unit hypersphere and evaluation points in the
//! ball whose radius matches the one of the ensemble.
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Returns `num_samples` unit vectors of dimension `dimensions` (one per row), uniformly distributed on the hypersphere.
/// In one dimension, the samples are either -1 or 1.
pub fn sample_hypersphere_surface<R: Rng>(
    num_samples: usize,
    dimensions: usize,
    rng: &mut R,
) -> DMatrix<f64> {
    let mut samples = DMatrix::zeros(num_samples, dimensions);
    for mut row in samples.row_iter_mut() {
        // Gaussian vectors are isotropic; resample the (improbable) null vector
        loop {
            for value in row.iter_mut() {
                *value = StandardNormal.sample(rng);
            }
            let norm = row.norm();
            if norm > f64::EPSILON {
                row /= norm;
                break;
            }
        }
    }
    samples
}

/// Returns `num_samples` vectors of dimension `dimensions` (one per row), uniformly distributed in the ball of the given radius.
pub fn sample_ball<R: Rng>(
    num_samples: usize,
    dimensions: usize,
    radius: f64,
    rng: &mut R,
) -> DMatrix<f64> {
    let mut samples = sample_hypersphere_surface(num_samples, dimensions, rng);
    for mut row in samples.row_iter_mut() {
        let scale: f64 = rng.gen::<f64>().powf(1.0 / dimensions as f64);
        row *= radius * scale;
    }
    samples
}
