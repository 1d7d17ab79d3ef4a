//! Module implementing the temporal filtering of the signals along connections and probes.
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::NEFError;

/// A first-order synaptic filter.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum Synapse {
    /// No filtering, the signal goes through instantaneously.
    #[default]
    Passthrough,
    /// Low-pass filter with time constant `tau` (in seconds).
    Lowpass { tau: f64 },
}

impl Synapse {
    /// Create a low-pass filter with the specified time constant.
    /// A zero time constant yields a passthrough; the function returns an error for negative or non-finite values.
    pub fn lowpass(tau: f64) -> Result<Self, NEFError> {
        if !(tau.is_finite() && tau >= 0.0) {
            return Err(NEFError::ConfigurationError(format!(
                "Synapse time constant must be non-negative, got {}",
                tau
            )));
        }
        match tau == 0.0 {
            true => Ok(Synapse::Passthrough),
            false => Ok(Synapse::Lowpass { tau }),
        }
    }

    /// Returns the time constant of the filter, zero for a passthrough.
    pub fn tau(&self) -> f64 {
        match self {
            Synapse::Passthrough => 0.0,
            Synapse::Lowpass { tau } => *tau,
        }
    }

    /// Filter the input over one time step, updating the filter state in place:
    /// `y[t] = y[t-1] + dt / tau * (x[t] - y[t-1])`.
    /// The update factor is capped at 1 so that time constants shorter than the step do not overshoot.
    pub fn filter(&self, state: &mut DVector<f64>, input: &DVector<f64>, dt: f64) {
        match self {
            Synapse::Passthrough => state.copy_from(input),
            Synapse::Lowpass { tau } => {
                let alpha = (dt / tau).min(1.0);
                state.zip_apply(input, |y, x| *y += alpha * (x - *y));
            }
        }
    }
}
