//! Module implementing the connections between the signal sources, ensembles and their slices.
//!
//! A connection reads the output of its source, optionally restricted to a subset of its
//! dimensions, applies a function and a linear transform, and filters the result with a synapse
//! before feeding (a subset of the dimensions of) the destination ensemble.
//!
//! When the source is a neural ensemble, the function is not computed explicitly: it is realized
//! by decoders applied to the neuron activities, which are computed once by the [`Solver`].
use derivative::Derivative;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

use super::ensemble::Ensemble;
use super::optim::Solver;
use super::synapse::Synapse;
use crate::error::NEFError;

/// A function mapping vectors to vectors, shareable between threads.
/// Any constant the function depends on must be bound when the function is created.
#[derive(Clone)]
pub struct Function(Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>);

impl Function {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        Function(Arc::new(function))
    }

    /// Evaluate the function at `x`.
    pub fn call(&self, x: &[f64]) -> Vec<f64> {
        (self.0)(x)
    }
}

/// A linear map applied after the function of a connection.
#[derive(Debug, PartialEq, Clone)]
pub enum Transform {
    /// Scaling, preserving the dimension.
    Scalar(f64),
    /// General linear map, with one row per output dimension.
    Matrix(DMatrix<f64>),
}

impl Default for Transform {
    fn default() -> Self {
        Transform::Scalar(1.0)
    }
}

/// A subset of the dimensions of an object.
#[derive(Debug, PartialEq, Clone)]
pub enum Slice {
    Range(Range<usize>),
    Indices(Vec<usize>),
}

impl Slice {
    /// Returns the selected indices, checking them against the size of the sliced object.
    pub fn resolve(&self, size: usize) -> Result<Vec<usize>, NEFError> {
        let indices: Vec<usize> = match self {
            Slice::Range(range) => range.clone().collect(),
            Slice::Indices(indices) => indices.clone(),
        };
        if indices.is_empty() {
            return Err(NEFError::ConfigurationError("Empty slice".to_string()));
        }
        if let Some(index) = indices.iter().find(|&&index| index >= size) {
            return Err(NEFError::ConfigurationError(format!(
                "Slice index {} out of bounds for an object of dimension {}",
                index, size
            )));
        }
        Ok(indices)
    }
}

/// A network object that can be connected.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum ObjectRef {
    Ensemble(usize),
    Node(usize),
}

/// One end of a connection: an object, possibly restricted to some of its dimensions.
#[derive(Debug, PartialEq, Clone)]
pub struct Endpoint {
    pub object: ObjectRef,
    pub slice: Option<Slice>,
}

/// The parameters of a connection.
#[derive(Derivative, Clone, Default)]
#[derivative(Debug)]
pub struct ConnectionParams {
    /// The function computed along the connection, the identity if none.
    #[derivative(Debug = "ignore")]
    pub function: Option<Function>,
    pub transform: Transform,
    pub synapse: Synapse,
    pub solver: Solver,
    /// The value of the connection output before the first step (zero if none).
    pub initial_value: Option<Vec<f64>>,
}

impl ConnectionParams {
    pub fn new() -> Self {
        ConnectionParams::default()
    }

    pub fn with_function<F>(mut self, function: F) -> Self
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        self.function = Some(Function::new(function));
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_synapse(mut self, synapse: Synapse) -> Self {
        self.synapse = synapse;
        self
    }

    /// Filter the connection with a low-pass synapse of time constant `tau`.
    pub fn with_lowpass(mut self, tau: f64) -> Self {
        self.synapse = Synapse::Lowpass { tau };
        self
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_initial_value(mut self, initial_value: Vec<f64>) -> Self {
        self.initial_value = Some(initial_value);
        self
    }
}

/// A connection between a source object and an ensemble.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Connection {
    id: usize,
    source: ObjectRef,
    pre_slice: Option<Vec<usize>>,
    destination: usize,
    #[derivative(Debug = "ignore")]
    function: Option<Function>,
    /// Maps the function output to the whole input space of the destination.
    transform: DMatrix<f64>,
    synapse: Synapse,
    solver: Solver,
    initial_value: DVector<f64>,
    /// Decoders realizing the function from the activities of a neural source.
    decoders: Option<DMatrix<f64>>,
}

impl Connection {
    /// Create a connection with the specified parameters, given the dimensions of its source and destination.
    /// The function returns an error if the destination is not an ensemble, for invalid slices, or if the dimensions of the source, function, transform and destination do not match.
    pub fn build(
        id: usize,
        source: &Endpoint,
        source_size: usize,
        destination: &Endpoint,
        destination_size: usize,
        params: ConnectionParams,
    ) -> Result<Self, NEFError> {
        let destination_id = match destination.object {
            ObjectRef::Ensemble(id) => id,
            ObjectRef::Node(_) => {
                return Err(NEFError::ConfigurationError(
                    "The destination of a connection must be an ensemble".to_string(),
                ))
            }
        };

        let pre_slice = match &source.slice {
            Some(slice) => Some(slice.resolve(source_size)?),
            None => None,
        };
        let size_in = pre_slice.as_ref().map_or(source_size, |indices| indices.len());

        let size_mid = match &params.function {
            Some(function) => function.call(&vec![0.0; size_in]).len(),
            None => size_in,
        };
        if size_mid == 0 {
            return Err(NEFError::ConfigurationError(
                "The function of a connection must return a non-empty vector".to_string(),
            ));
        }

        let post_slice = match &destination.slice {
            Some(slice) => slice.resolve(destination_size)?,
            None => (0..destination_size).collect(),
        };
        let size_out = post_slice.len();

        let transform = match params.transform {
            Transform::Scalar(scale) => {
                if size_mid != size_out {
                    return Err(NEFError::ConfigurationError(format!(
                        "Cannot connect an output of dimension {} to an input of dimension {} with a scalar transform",
                        size_mid, size_out
                    )));
                }
                DMatrix::identity(size_out, size_mid) * scale
            }
            Transform::Matrix(matrix) => {
                if matrix.shape() != (size_out, size_mid) {
                    return Err(NEFError::ConfigurationError(format!(
                        "Transform of shape {:?} does not map dimension {} to dimension {}",
                        matrix.shape(),
                        size_mid,
                        size_out
                    )));
                }
                matrix
            }
        };

        // scatter the rows of the transform into the sliced dimensions of the destination
        let mut full_transform = DMatrix::zeros(destination_size, size_mid);
        for (row, &index) in post_slice.iter().enumerate() {
            let mut target = full_transform.row_mut(index);
            target += transform.row(row);
        }

        let synapse = Synapse::lowpass(params.synapse.tau())?;

        let initial_value = match params.initial_value {
            Some(value) if value.len() != destination_size => {
                return Err(NEFError::ConfigurationError(format!(
                    "Initial value of dimension {} for a destination of dimension {}",
                    value.len(),
                    destination_size
                )))
            }
            Some(value) => DVector::from_vec(value),
            None => DVector::zeros(destination_size),
        };

        Ok(Connection {
            id,
            source: source.object,
            pre_slice,
            destination: destination_id,
            function: params.function,
            transform: full_transform,
            synapse,
            solver: params.solver,
            initial_value,
            decoders: None,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn source(&self) -> ObjectRef {
        self.source
    }

    /// Returns the ID of the destination ensemble.
    pub fn destination(&self) -> usize {
        self.destination
    }

    pub fn synapse(&self) -> Synapse {
        self.synapse
    }

    /// Returns the dimension of the connection output, i.e., of the destination input.
    pub fn size_out(&self) -> usize {
        self.transform.nrows()
    }

    pub fn initial_value(&self) -> &DVector<f64> {
        &self.initial_value
    }

    /// Returns the cached decoders, if the function is realized by a neural source.
    pub fn decoders(&self) -> Option<&DMatrix<f64>> {
        self.decoders.as_ref()
    }

    /// Compute and cache the decoders realizing the (sliced) function from the source ensemble.
    /// Returns the root-mean-square error of the fit on the evaluation points.
    pub fn solve(&mut self, ensemble: &Ensemble) -> Result<f64, NEFError> {
        let pre_slice = self.pre_slice.clone();
        let function = self.function.clone();
        let target = Function::new(move |x: &[f64]| {
            let x = select(x, pre_slice.as_deref());
            match &function {
                Some(function) => function.call(&x),
                None => x,
            }
        });

        let solution = self.solver.solve(ensemble, &target)?;
        if solution.decoders.ncols() != self.transform.ncols() {
            return Err(NEFError::ConfigurationError(format!(
                "Connection {}: the function output dimension changed from {} to {}",
                self.id,
                self.transform.ncols(),
                solution.decoders.ncols()
            )));
        }
        self.decoders = Some(solution.decoders);
        Ok(solution.rmse)
    }

    /// Returns the value of the connection before transform and filtering, given the source output.
    /// Neural sources are decoded; otherwise the source is sliced and the function is applied directly.
    pub fn value(&self, source_output: &DVector<f64>) -> DVector<f64> {
        match &self.decoders {
            Some(decoders) => decoders.tr_mul(source_output),
            None => {
                let x = select(source_output.as_slice(), self.pre_slice.as_deref());
                match &self.function {
                    Some(function) => DVector::from_vec(function.call(&x)),
                    None => DVector::from_vec(x),
                }
            }
        }
    }

    /// Evaluate the connection over one time step given the output of its source.
    /// The filtered output is updated in place in `state`.
    pub fn evaluate(&self, source_output: &DVector<f64>, state: &mut DVector<f64>, dt: f64) {
        let value = &self.transform * self.value(source_output);
        self.synapse.filter(state, &value, dt);
    }
}

fn select(x: &[f64], indices: Option<&[usize]>) -> Vec<f64> {
    match indices {
        Some(indices) => indices.iter().map(|&i| x[i]).collect(),
        None => x.to_vec(),
    }
}
