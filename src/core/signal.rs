//! Module implementing the signal sources (nodes) feeding a network.
use derivative::Derivative;
use nalgebra::DVector;
use std::sync::Arc;

use crate::error::NEFError;

type TimeFunction = Arc<dyn Fn(f64) -> Vec<f64> + Send + Sync>;

/// The different ways a node produces its output.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
enum NodeOutput {
    Constant(DVector<f64>),
    Function(#[derivative(Debug = "ignore")] TimeFunction),
    /// Breakpoints sorted by time; the value of the last breakpoint at or before `t` is held.
    Piecewise(Vec<(f64, DVector<f64>)>),
}

/// A signal source, producing a vector value as a function of the simulation time.
#[derive(Debug, Clone)]
pub struct Node {
    dimensions: usize,
    output: NodeOutput,
}

impl Node {
    /// Create a node with a constant output.
    /// The function returns an error if the value is empty.
    pub fn constant(value: Vec<f64>) -> Result<Self, NEFError> {
        if value.is_empty() {
            return Err(NEFError::ConfigurationError(
                "A node must output at least one dimension".to_string(),
            ));
        }
        Ok(Node {
            dimensions: value.len(),
            output: NodeOutput::Constant(DVector::from_vec(value)),
        })
    }

    /// Create a node whose output is a function of time.
    /// The output dimensionality is determined by evaluating the function at time 0.
    pub fn function<F>(function: F) -> Result<Self, NEFError>
    where
        F: Fn(f64) -> Vec<f64> + Send + Sync + 'static,
    {
        let dimensions = function(0.0).len();
        if dimensions == 0 {
            return Err(NEFError::ConfigurationError(
                "A node must output at least one dimension".to_string(),
            ));
        }
        Ok(Node {
            dimensions,
            output: NodeOutput::Function(Arc::new(function)),
        })
    }

    /// Create a node holding the value of the latest breakpoint `(time, value)` not after the current time.
    /// Before the first breakpoint, the output is zero.
    /// The breakpoints are sorted if necessary; the function returns an error if they are empty, have different dimensions or non-finite times.
    pub fn piecewise(mut breakpoints: Vec<(f64, Vec<f64>)>) -> Result<Self, NEFError> {
        let dimensions = match breakpoints.first() {
            Some((_, value)) => value.len(),
            None => {
                return Err(NEFError::ConfigurationError(
                    "A piecewise node requires at least one breakpoint".to_string(),
                ))
            }
        };
        if dimensions == 0 || breakpoints.iter().any(|(_, value)| value.len() != dimensions) {
            return Err(NEFError::ConfigurationError(
                "All piecewise values must share the same non-zero dimension".to_string(),
            ));
        }
        if breakpoints.iter().any(|(t, _)| !t.is_finite()) {
            return Err(NEFError::ConfigurationError(
                "Piecewise breakpoints must be finite".to_string(),
            ));
        }

        breakpoints.sort_by(|(t1, _), (t2, _)| t1.total_cmp(t2));
        let breakpoints = breakpoints
            .into_iter()
            .map(|(t, value)| (t, DVector::from_vec(value)))
            .collect();

        Ok(Node {
            dimensions,
            output: NodeOutput::Piecewise(breakpoints),
        })
    }

    /// Returns the output dimensionality of the node.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Returns the output of the node at the given time.
    /// A function returning a value of the wrong length has its output zero-padded or truncated
    /// to the dimensionality of the node.
    pub fn value_at(&self, t: f64) -> DVector<f64> {
        match &self.output {
            NodeOutput::Constant(value) => value.clone(),
            NodeOutput::Function(function) => {
                let mut value = function(t);
                if value.len() != self.dimensions {
                    log::warn!(
                        "Node function returned {} values at t = {:.3}, expected {}",
                        value.len(),
                        t,
                        self.dimensions
                    );
                    value.resize(self.dimensions, 0.0);
                }
                DVector::from_vec(value)
            }
            NodeOutput::Piecewise(breakpoints) => {
                let pos = breakpoints.partition_point(|(time, _)| *time <= t);
                match pos {
                    0 => DVector::zeros(self.dimensions),
                    pos => breakpoints[pos - 1].1.clone(),
                }
            }
        }
    }
}
