//! Optimization-related utilities, i.e., computation of the decoders realizing a function.
//!
//! Given the tuning curves of an ensemble, the decoders `D` of a function `f` minimize
//! `||A D - Y||^2 + M sigma^2 ||D||^2`, where `A` holds the activities of the neurons at the `M`
//! evaluation points, `Y` the values of `f` at these points, and `sigma` is a fraction `reg` of the
//! largest activity. The regularization accounts for the variability of spiking activities.
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::connection::Function;
use super::ensemble::Ensemble;
use crate::error::NEFError;

/// The default regularization, relative to the maximum activity.
pub const DEFAULT_REG: f64 = 0.1;

/// Regularized least-squares solver.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Solver {
    reg: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Solver { reg: DEFAULT_REG }
    }
}

/// The decoders of a function and their fit quality on the evaluation points.
#[derive(Debug, PartialEq, Clone)]
pub struct Solution {
    /// One row per neuron, one column per output dimension.
    pub decoders: DMatrix<f64>,
    /// The root-mean-square error of the decoded function on the evaluation points.
    pub rmse: f64,
}

impl Solver {
    /// Create a solver with the specified regularization.
    /// The function returns an error if the regularization is negative or not finite.
    pub fn build(reg: f64) -> Result<Self, NEFError> {
        if !(reg.is_finite() && reg >= 0.0) {
            return Err(NEFError::ConfigurationError(format!(
                "Regularization must be non-negative, got {}",
                reg
            )));
        }
        Ok(Solver { reg })
    }

    pub fn reg(&self) -> f64 {
        self.reg
    }

    /// Compute the decoders approximating `function` from the activities of the ensemble.
    /// The function is sampled on the evaluation points of the ensemble.
    pub fn solve(&self, ensemble: &Ensemble, function: &Function) -> Result<Solution, NEFError> {
        if ensemble.is_direct() {
            return Err(NEFError::OptimizationError(format!(
                "Ensemble {} is direct and has no decoders",
                ensemble.id()
            )));
        }
        if ensemble.n_neurons() == 0 {
            return Err(NEFError::OptimizationError(format!(
                "Ensemble {} has no neurons",
                ensemble.id()
            )));
        }

        let eval_points = ensemble.eval_points();
        let mut values: Vec<Vec<f64>> = Vec::with_capacity(eval_points.nrows());
        for point in eval_points.row_iter() {
            let point: Vec<f64> = point.iter().cloned().collect();
            values.push(function.call(&point));
        }

        let size_out = values.first().map(|value| value.len()).unwrap_or(0);
        if size_out == 0 || values.iter().any(|value| value.len() != size_out) {
            return Err(NEFError::ConfigurationError(
                "The function must return a non-empty vector of constant length".to_string(),
            ));
        }
        let targets = DMatrix::from_fn(values.len(), size_out, |p, j| values[p][j]);

        self.solve_activities(&ensemble.eval_activities(), &targets)
    }

    /// Compute the decoders mapping the activities (one row per sample) to the targets (one row per sample).
    pub fn solve_activities(
        &self,
        activities: &DMatrix<f64>,
        targets: &DMatrix<f64>,
    ) -> Result<Solution, NEFError> {
        let (num_samples, num_neurons) = activities.shape();
        if num_samples == 0 || num_neurons == 0 {
            return Err(NEFError::OptimizationError(
                "Empty activity matrix".to_string(),
            ));
        }
        if targets.nrows() != num_samples {
            return Err(NEFError::ConfigurationError(format!(
                "Got {} targets for {} samples",
                targets.nrows(),
                num_samples
            )));
        }
        if targets.iter().any(|y| !y.is_finite()) {
            return Err(NEFError::OptimizationError(
                "The function takes non-finite values".to_string(),
            ));
        }

        let max_activity = activities.iter().cloned().fold(0.0, f64::max);
        if !(max_activity > 0.0) {
            return Err(NEFError::OptimizationError(
                "All neurons are silent on the evaluation points".to_string(),
            ));
        }

        let sigma = self.reg * max_activity;
        let mut gram = activities.tr_mul(activities);
        for i in 0..num_neurons {
            gram[(i, i)] += num_samples as f64 * sigma * sigma;
        }
        let rhs = activities.tr_mul(targets);

        let cholesky = gram.cholesky().ok_or_else(|| {
            NEFError::OptimizationError("Singular activity matrix".to_string())
        })?;
        let decoders = cholesky.solve(&rhs);
        if decoders.iter().any(|d| !d.is_finite()) {
            return Err(NEFError::OptimizationError(
                "Ill-conditioned activity matrix".to_string(),
            ));
        }

        let residuals = activities * &decoders - targets;
        let rmse = (residuals.norm_squared() / residuals.len() as f64).sqrt();

        Ok(Solution { decoders, rmse })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ensemble::EnsembleParams;
    use crate::core::neuron::NeuronType;
    use approx::assert_relative_eq;

    #[test]
    fn test_solver_build() {
        assert_eq!(Solver::build(0.0).unwrap().reg(), 0.0);
        assert!(Solver::build(-0.1).is_err());
        assert!(Solver::build(f64::NAN).is_err());
        assert_eq!(Solver::default().reg(), DEFAULT_REG);
    }

    #[test]
    fn test_solve_activities_exact() {
        // without regularization, a consistent linear system is solved exactly
        let activities = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let targets = DMatrix::from_row_slice(3, 1, &[2.0, -1.0, 1.0]);
        let solution = Solver::build(0.0)
            .unwrap()
            .solve_activities(&activities, &targets)
            .unwrap();
        assert_relative_eq!(solution.decoders[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(solution.decoders[(1, 0)], -1.0, epsilon = 1e-12);
        assert_relative_eq!(solution.rmse, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_regularization_shrinks_decoders() {
        let activities = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let targets = DMatrix::from_row_slice(3, 1, &[2.0, -1.0, 1.0]);
        let exact = Solver::build(0.0)
            .unwrap()
            .solve_activities(&activities, &targets)
            .unwrap();
        let regularized = Solver::build(0.5)
            .unwrap()
            .solve_activities(&activities, &targets)
            .unwrap();
        assert!(regularized.decoders.norm() < exact.decoders.norm());
        assert!(regularized.rmse > exact.rmse);
    }

    #[test]
    fn test_degenerate_activities() {
        let solver = Solver::default();
        assert!(matches!(
            solver.solve_activities(&DMatrix::zeros(10, 4), &DMatrix::zeros(10, 1)),
            Err(NEFError::OptimizationError(_))
        ));
        assert!(matches!(
            solver.solve_activities(&DMatrix::zeros(0, 0), &DMatrix::zeros(0, 1)),
            Err(NEFError::OptimizationError(_))
        ));
    }

    #[test]
    fn test_solve_direct_ensemble() {
        let params = EnsembleParams::new(10, 1).with_neuron_type(NeuronType::Direct);
        let ensemble = Ensemble::build(0, params, 0).unwrap();
        let identity = Function::new(|x: &[f64]| x.to_vec());
        assert!(matches!(
            Solver::default().solve(&ensemble, &identity),
            Err(NEFError::OptimizationError(_))
        ));
    }

    #[test]
    fn test_solve_non_finite_function() {
        let ensemble = Ensemble::build(0, EnsembleParams::new(10, 1), 0).unwrap();
        let function = Function::new(|x: &[f64]| vec![x[0] / 0.0]);
        assert!(matches!(
            Solver::default().solve(&ensemble, &function),
            Err(NEFError::OptimizationError(_))
        ));
    }

    #[test]
    fn test_solve_square() {
        let ensemble = Ensemble::build(0, EnsembleParams::new(200, 1), 42).unwrap();
        let square = Function::new(|x: &[f64]| vec![x[0] * x[0]]);
        let solution = Solver::default().solve(&ensemble, &square).unwrap();

        assert_eq!(solution.decoders.shape(), (200, 1));
        assert!(solution.rmse < 0.05);
        for &x in [-0.8, -0.3, 0.0, 0.4, 0.9].iter() {
            let activities = ensemble.encode(&nalgebra::DVector::from_element(1, x));
            let y = ensemble.decode(&activities, &solution.decoders);
            assert!((y[0] - x * x).abs() < 0.1);
        }
    }

    #[test]
    fn test_solve_is_deterministic() {
        let function = Function::new(|x: &[f64]| vec![x[0] * x[1], x[0] - x[1]]);
        let ensemble_1 = Ensemble::build(0, EnsembleParams::new(100, 2), 7).unwrap();
        let ensemble_2 = Ensemble::build(0, EnsembleParams::new(100, 2), 7).unwrap();
        let solution_1 = Solver::default().solve(&ensemble_1, &function).unwrap();
        let solution_2 = Solver::default().solve(&ensemble_2, &function).unwrap();
        assert_eq!(solution_1, solution_2);
    }
}
