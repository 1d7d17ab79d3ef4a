//! Module implementing the ensembles, i.e., populations of neurons jointly encoding a vector.
//!
//! Each neuron of an ensemble is tuned to a preferred direction (its encoder) in the represented
//! space. Its input current is an affine function of the projection of the represented vector on
//! this direction, and its activity is the (rectified) response of the neuron model to the current.
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::neuron::{LifState, NeuronType};
use super::sampler::{sample_ball, sample_hypersphere_surface};
use super::DEFAULT_RADIUS;
use crate::error::NEFError;

/// The default range of the maximum firing rates (in Hz).
pub const DEFAULT_MAX_RATES: (f64, f64) = (200.0, 400.0);
/// The default range of the intercepts, relative to the radius.
pub const DEFAULT_INTERCEPTS: (f64, f64) = (-1.0, 0.9);
/// The minimum number of evaluation points of an ensemble.
pub const MIN_EVAL_POINTS: usize = 750;
/// The maximum number of evaluation points of an ensemble, unless more neurons require more points.
pub const MAX_EVAL_POINTS: usize = 2_500;
/// The number of evaluation points per dimension.
pub const EVAL_POINTS_PER_DIMENSION: usize = 500;

/// The parameters of an ensemble.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EnsembleParams {
    /// The number of neurons.
    pub n_neurons: usize,
    /// The dimensionality of the represented vectors.
    pub dimensions: usize,
    /// The expected magnitude of the represented vectors.
    pub radius: f64,
    /// The neuron model.
    pub neuron_type: NeuronType,
    /// The range of the maximum firing rates, sampled uniformly.
    pub max_rates: (f64, f64),
    /// The range of the intercepts, sampled uniformly.
    pub intercepts: (f64, f64),
    /// Explicit encoders (one row per neuron), randomly sampled if not provided.
    pub encoders: Option<Vec<Vec<f64>>>,
    /// The number of evaluation points used to compute decoders.
    pub n_eval_points: Option<usize>,
    /// The seed of the ensemble, overriding the one derived from the network.
    pub seed: Option<u64>,
}

impl EnsembleParams {
    /// Parameters for an ensemble of `n_neurons` spiking neurons representing `dimensions`-dimensional vectors.
    pub fn new(n_neurons: usize, dimensions: usize) -> Self {
        EnsembleParams {
            n_neurons,
            dimensions,
            radius: DEFAULT_RADIUS,
            neuron_type: NeuronType::default(),
            max_rates: DEFAULT_MAX_RATES,
            intercepts: DEFAULT_INTERCEPTS,
            encoders: None,
            n_eval_points: None,
            seed: None,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_neuron_type(mut self, neuron_type: NeuronType) -> Self {
        self.neuron_type = neuron_type;
        self
    }

    pub fn with_max_rates(mut self, low: f64, high: f64) -> Self {
        self.max_rates = (low, high);
        self
    }

    pub fn with_intercepts(mut self, low: f64, high: f64) -> Self {
        self.intercepts = (low, high);
        self
    }

    pub fn with_encoders(mut self, encoders: Vec<Vec<f64>>) -> Self {
        self.encoders = Some(encoders);
        self
    }

    pub fn with_eval_points(mut self, n_eval_points: usize) -> Self {
        self.n_eval_points = Some(n_eval_points);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the consistency of the parameters.
    pub fn validate(&self) -> Result<(), NEFError> {
        if self.dimensions == 0 {
            return Err(NEFError::ConfigurationError(
                "An ensemble must represent at least one dimension".to_string(),
            ));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(NEFError::ConfigurationError(format!(
                "The radius must be positive, got {}",
                self.radius
            )));
        }
        self.neuron_type.validate()?;
        if self.neuron_type.is_direct() {
            return Ok(());
        }

        if self.n_neurons == 0 {
            return Err(NEFError::ConfigurationError(
                "A neural ensemble must have at least one neuron".to_string(),
            ));
        }
        let (min_rate, max_rate) = self.max_rates;
        if !(min_rate > 0.0 && min_rate <= max_rate) {
            return Err(NEFError::ConfigurationError(format!(
                "Invalid range of maximum firing rates ({}, {})",
                min_rate, max_rate
            )));
        }
        if max_rate >= self.neuron_type.max_firing_rate() {
            return Err(NEFError::ConfigurationError(format!(
                "Maximum firing rate {} exceeds what the neuron model can reach",
                max_rate
            )));
        }
        let (min_intercept, max_intercept) = self.intercepts;
        if !(-1.0 <= min_intercept && min_intercept <= max_intercept && max_intercept < 1.0) {
            return Err(NEFError::ConfigurationError(format!(
                "Invalid range of intercepts ({}, {}), must lie in [-1, 1)",
                min_intercept, max_intercept
            )));
        }
        if let Some(encoders) = &self.encoders {
            if encoders.len() != self.n_neurons
                || encoders.iter().any(|encoder| encoder.len() != self.dimensions)
            {
                return Err(NEFError::ConfigurationError(format!(
                    "Encoders must be a {} x {} matrix",
                    self.n_neurons, self.dimensions
                )));
            }
            if encoders.iter().any(|encoder| {
                encoder.iter().map(|e| e * e).sum::<f64>().sqrt() <= f64::EPSILON
            }) {
                return Err(NEFError::ConfigurationError(
                    "Encoders must be non-zero".to_string(),
                ));
            }
        }
        if self.n_eval_points == Some(0) {
            return Err(NEFError::ConfigurationError(
                "At least one evaluation point is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// The default number of evaluation points for an ensemble.
pub fn default_n_eval_points(n_neurons: usize, dimensions: usize) -> usize {
    (EVAL_POINTS_PER_DIMENSION * dimensions)
        .clamp(MIN_EVAL_POINTS, MAX_EVAL_POINTS)
        .max(2 * n_neurons)
}

/// A population of neurons jointly encoding a vector.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Ensemble {
    id: usize,
    n_neurons: usize,
    dimensions: usize,
    radius: f64,
    seed: u64,
    neuron_type: NeuronType,
    /// Unit-norm preferred directions, one row per neuron.
    encoders: DMatrix<f64>,
    max_rates: DVector<f64>,
    intercepts: DVector<f64>,
    gain: DVector<f64>,
    bias: DVector<f64>,
    /// Points of the radius ball on which decoders are fit, one row per point.
    eval_points: DMatrix<f64>,
}

impl Ensemble {
    /// Create an ensemble with the specified parameters; its tuning curves are fully determined by the seed.
    /// A seed in the parameters takes precedence over the provided one.
    /// The function returns an error for invalid parameters.
    pub fn build(id: usize, params: EnsembleParams, seed: u64) -> Result<Self, NEFError> {
        params.validate()?;
        let seed = params.seed.unwrap_or(seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        if params.neuron_type.is_direct() {
            return Ok(Ensemble {
                id,
                n_neurons: params.n_neurons,
                dimensions: params.dimensions,
                radius: params.radius,
                seed,
                neuron_type: params.neuron_type,
                encoders: DMatrix::zeros(0, params.dimensions),
                max_rates: DVector::zeros(0),
                intercepts: DVector::zeros(0),
                gain: DVector::zeros(0),
                bias: DVector::zeros(0),
                eval_points: DMatrix::zeros(0, params.dimensions),
            });
        }

        let n = params.n_neurons;
        let encoders = match &params.encoders {
            Some(encoders) => {
                let mut encoders = DMatrix::from_fn(n, params.dimensions, |i, j| encoders[i][j]);
                for mut row in encoders.row_iter_mut() {
                    let norm = row.norm();
                    row /= norm;
                }
                encoders
            }
            None => sample_hypersphere_surface(n, params.dimensions, &mut rng),
        };

        let max_rates = sample_uniform(n, params.max_rates, &mut rng);
        let intercepts = sample_uniform(n, params.intercepts, &mut rng);

        let mut gain = DVector::zeros(n);
        let mut bias = DVector::zeros(n);
        for i in 0..n {
            let (g, b) = params.neuron_type.gain_bias(max_rates[i], intercepts[i])?;
            gain[i] = g;
            bias[i] = b;
        }

        let n_eval_points = params
            .n_eval_points
            .unwrap_or_else(|| default_n_eval_points(n, params.dimensions));
        let eval_points = sample_ball(n_eval_points, params.dimensions, params.radius, &mut rng);

        log::debug!(
            "Ensemble {} built with {} neurons, {} dimensions and {} evaluation points",
            id,
            n,
            params.dimensions,
            n_eval_points
        );

        Ok(Ensemble {
            id,
            n_neurons: n,
            dimensions: params.dimensions,
            radius: params.radius,
            seed,
            neuron_type: params.neuron_type,
            encoders,
            max_rates,
            intercepts,
            gain,
            bias,
            eval_points,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn n_neurons(&self) -> usize {
        self.n_neurons
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn neuron_type(&self) -> NeuronType {
        self.neuron_type
    }

    pub fn is_direct(&self) -> bool {
        self.neuron_type.is_direct()
    }

    pub fn encoders(&self) -> &DMatrix<f64> {
        &self.encoders
    }

    pub fn max_rates(&self) -> &DVector<f64> {
        &self.max_rates
    }

    pub fn intercepts(&self) -> &DVector<f64> {
        &self.intercepts
    }

    pub fn gain(&self) -> &DVector<f64> {
        &self.gain
    }

    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    pub fn eval_points(&self) -> &DMatrix<f64> {
        &self.eval_points
    }

    /// Returns the dimension of the ensemble output, i.e., the number of neurons or, for direct ensembles, the number of dimensions.
    pub fn output_size(&self) -> usize {
        match self.is_direct() {
            true => self.dimensions,
            false => self.n_neurons,
        }
    }

    /// Returns the input currents of the neurons when representing `x`.
    pub fn currents(&self, x: &DVector<f64>) -> DVector<f64> {
        let projection = (&self.encoders * x) / self.radius;
        projection.component_mul(&self.gain) + &self.bias
    }

    /// Returns the activities of the neurons when representing `x`.
    /// For direct ensembles, `x` is passed through.
    pub fn encode(&self, x: &DVector<f64>) -> DVector<f64> {
        match self.is_direct() {
            true => x.clone(),
            false => self.neuron_type.rates(&self.currents(x)),
        }
    }

    /// Returns the activities of the neurons at every evaluation point (one row per point).
    pub fn eval_activities(&self) -> DMatrix<f64> {
        self.activities_at(&self.eval_points)
    }

    /// Returns the activities of the neurons at every provided point (one row per point).
    pub fn activities_at(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        let projections = (points * self.encoders.transpose()) / self.radius;
        DMatrix::from_fn(points.nrows(), self.n_neurons, |p, i| {
            self.neuron_type
                .rate(self.gain[i] * projections[(p, i)] + self.bias[i])
        })
    }

    /// Returns the weighted sum of the activities, with one column of `weights` per output dimension.
    /// Direct ensembles carry the represented value as activities, which is returned as is.
    pub fn decode(&self, activities: &DVector<f64>, weights: &DMatrix<f64>) -> DVector<f64> {
        match self.is_direct() {
            true => activities.clone(),
            false => weights.tr_mul(activities),
        }
    }

    /// Create the simulation state of the ensemble.
    /// Spiking neurons start with random membrane voltages drawn from the ensemble seed.
    pub fn init_state(&self) -> EnsembleState {
        match self.neuron_type {
            NeuronType::Direct => EnsembleState::Direct,
            NeuronType::Lif { .. } => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1));
                let voltage = DVector::from_fn(self.n_neurons, |_, _| rng.gen::<f64>());
                EnsembleState::Spiking(LifState::new(voltage))
            }
            NeuronType::LifRate { .. } | NeuronType::RectifiedLinear => EnsembleState::Rate,
        }
    }

    /// Advance the ensemble by one time step given its total input, writing the new output in place.
    /// The output holds the neuron activities, or the represented value for direct ensembles.
    pub fn step(
        &self,
        input: &DVector<f64>,
        state: &mut EnsembleState,
        dt: f64,
        output: &mut DVector<f64>,
    ) {
        match (state, self.neuron_type) {
            (EnsembleState::Direct, _) => output.copy_from(input),
            (EnsembleState::Spiking(lif), NeuronType::Lif { tau_rc, tau_ref }) => {
                lif.step(&self.currents(input), tau_rc, tau_ref, dt, output)
            }
            (_, neuron_type) => output.copy_from(&neuron_type.rates(&self.currents(input))),
        }
    }

    /// Save the ensemble (including its tuning curves) to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), NEFError> {
        let file = File::create(path).map_err(|e| NEFError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| NEFError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| NEFError::IOError(e.to_string()))
    }

    /// Load an ensemble from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, NEFError> {
        let file = File::open(path).map_err(|e| NEFError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| NEFError::IOError(e.to_string()))
    }
}

/// The simulation state of an ensemble, chosen once from its neuron type.
#[derive(Debug, PartialEq, Clone)]
pub enum EnsembleState {
    /// No state: the value is passed through.
    Direct,
    /// Membrane voltages and refractory times of spiking neurons.
    Spiking(LifState),
    /// No state: the activities are the instantaneous rates.
    Rate,
}

fn sample_uniform<R: Rng>(num_samples: usize, lim: (f64, f64), rng: &mut R) -> DVector<f64> {
    let (low, high) = lim;
    if low == high {
        return DVector::from_element(num_samples, low);
    }
    let dist = Uniform::new(low, high);
    DVector::from_fn(num_samples, |_, _| dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_build_invalid_params() {
        assert!(matches!(
            Ensemble::build(0, EnsembleParams::new(10, 0), 0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Ensemble::build(0, EnsembleParams::new(0, 1), 0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Ensemble::build(0, EnsembleParams::new(10, 1).with_radius(-1.0), 0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Ensemble::build(0, EnsembleParams::new(10, 1).with_max_rates(200.0, 600.0), 0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Ensemble::build(0, EnsembleParams::new(10, 1).with_intercepts(-0.5, 1.0), 0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Ensemble::build(0, EnsembleParams::new(2, 2).with_encoders(vec![vec![1.0, 0.0]]), 0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Ensemble::build(
                0,
                EnsembleParams::new(2, 2).with_encoders(vec![vec![1.0, 0.0], vec![1.0]]),
                0
            ),
            Err(NEFError::ConfigurationError(_))
        ));

        // direct ensembles need no neurons
        assert!(Ensemble::build(
            0,
            EnsembleParams::new(0, 3).with_neuron_type(NeuronType::Direct),
            0
        )
        .is_ok());
    }

    #[test]
    fn test_build_tuning() {
        let params = EnsembleParams::new(50, 3).with_radius(2.0);
        let ensemble = Ensemble::build(7, params, 42).unwrap();

        assert_eq!(ensemble.id(), 7);
        assert_eq!(ensemble.encoders().shape(), (50, 3));
        assert_eq!(ensemble.output_size(), 50);
        for row in ensemble.encoders().row_iter() {
            assert_relative_eq!(row.norm(), 1.0, epsilon = 1e-12);
        }
        assert!(ensemble
            .max_rates()
            .iter()
            .all(|r| (200.0..400.0).contains(r)));
        assert!(ensemble
            .intercepts()
            .iter()
            .all(|c| (-1.0..0.9).contains(c)));
        assert_eq!(ensemble.eval_points().shape(), (1500, 3));
        assert!(ensemble
            .eval_points()
            .row_iter()
            .all(|row| row.norm() <= 2.0));
    }

    #[test]
    fn test_explicit_encoders_are_normalized() {
        let params = EnsembleParams::new(2, 2).with_encoders(vec![vec![3.0, 4.0], vec![0.0, -2.0]]);
        let ensemble = Ensemble::build(0, params, 0).unwrap();
        assert_relative_eq!(ensemble.encoders()[(0, 0)], 0.6);
        assert_relative_eq!(ensemble.encoders()[(0, 1)], 0.8);
        assert_relative_eq!(ensemble.encoders()[(1, 1)], -1.0);
    }

    #[test]
    fn test_encode_tuning_curves() {
        let params = EnsembleParams::new(20, 1).with_radius(5.0);
        let ensemble = Ensemble::build(0, params, 3).unwrap();

        // at the preferred direction scaled to the radius, every neuron fires at its maximum rate
        for i in 0..20 {
            let x = DVector::from_element(1, 5.0 * ensemble.encoders()[(i, 0)]);
            let activities = ensemble.encode(&x);
            assert_relative_eq!(activities[i], ensemble.max_rates()[i], epsilon = 1e-6);
        }

        // activities are rectified
        let activities = ensemble.encode(&DVector::from_element(1, 12.0));
        assert!(activities.iter().all(|&a| a >= 0.0));
        assert!(activities.iter().any(|&a| a == 0.0));
    }

    #[test]
    fn test_direct_encode_decode() {
        let params = EnsembleParams::new(100, 2).with_neuron_type(NeuronType::Direct);
        let ensemble = Ensemble::build(0, params, 0).unwrap();
        assert_eq!(ensemble.output_size(), 2);

        let x = DVector::from_vec(vec![0.3, -0.7]);
        let activities = ensemble.encode(&x);
        assert_eq!(activities, x);
        assert_eq!(ensemble.decode(&activities, &DMatrix::zeros(0, 0)), x);
    }

    #[test]
    fn test_init_state() {
        let spiking = Ensemble::build(0, EnsembleParams::new(10, 1), 0).unwrap();
        match spiking.init_state() {
            EnsembleState::Spiking(lif) => {
                assert_eq!(lif.voltage.len(), 10);
                assert!(lif.voltage.iter().all(|v| (0.0..1.0).contains(v)));
            }
            state => panic!("Unexpected state {:?}", state),
        }

        let rate = EnsembleParams::new(10, 1).with_neuron_type(NeuronType::RectifiedLinear);
        let rate = Ensemble::build(0, rate, 0).unwrap();
        assert_eq!(rate.init_state(), EnsembleState::Rate);

        let direct = EnsembleParams::new(10, 1).with_neuron_type(NeuronType::Direct);
        let direct = Ensemble::build(0, direct, 0).unwrap();
        assert_eq!(direct.init_state(), EnsembleState::Direct);
    }

    #[test]
    fn test_rate_step_matches_encode() {
        let params = EnsembleParams::new(30, 2).with_neuron_type(NeuronType::lif_rate());
        let ensemble = Ensemble::build(0, params, 11).unwrap();
        let mut state = ensemble.init_state();
        let mut output = DVector::zeros(30);

        let x = DVector::from_vec(vec![0.2, 0.4]);
        ensemble.step(&x, &mut state, 1e-3, &mut output);
        assert_eq!(output, ensemble.encode(&x));
    }

    #[test]
    fn test_save_load() {
        let ensemble = Ensemble::build(3, EnsembleParams::new(16, 2), 5).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.json");

        ensemble.save_to(&path).unwrap();
        let loaded = Ensemble::load_from(&path).unwrap();
        assert_eq!(loaded.id(), 3);
        assert_eq!(loaded.seed(), 5);
        assert_eq!(loaded.neuron_type(), ensemble.neuron_type());
        assert_eq!(loaded.encoders().shape(), ensemble.encoders().shape());
        assert_relative_eq!(loaded.gain(), ensemble.gain(), epsilon = 1e-12);

        assert!(matches!(
            Ensemble::load_from(dir.path().join("missing.json")),
            Err(NEFError::IOError(_))
        ));
    }
}
