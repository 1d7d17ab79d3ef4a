//! Module implementing the neuron models of the ensembles.
//!
//! A neuron receives an input current `J` and responds with an activity. The tuning curve of a
//! neuron is shaped by its gain and bias, which are derived from a desired maximum firing rate and
//! intercept (the represented value at which the neuron starts firing).
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::NEFError;

/// The default membrane time constant of LIF neurons (in seconds).
pub const DEFAULT_TAU_RC: f64 = 0.02;
/// The default absolute refractory period of LIF neurons (in seconds).
pub const DEFAULT_TAU_REF: f64 = 0.002;
/// The firing threshold of LIF neurons, in normalized input current units.
pub const LIF_THRESHOLD: f64 = 1.0;

/// The type of the neurons of an ensemble.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum NeuronType {
    /// Leaky integrate-and-fire neurons emitting discrete spikes.
    Lif { tau_rc: f64, tau_ref: f64 },
    /// Steady-state firing rates of leaky integrate-and-fire neurons.
    LifRate { tau_rc: f64, tau_ref: f64 },
    /// Rectified-linear rate neurons.
    RectifiedLinear,
    /// No neurons at all: the ensemble represents its input exactly.
    Direct,
}

impl Default for NeuronType {
    fn default() -> Self {
        NeuronType::lif()
    }
}

impl NeuronType {
    /// Spiking LIF neurons with default time constants.
    pub fn lif() -> Self {
        NeuronType::Lif {
            tau_rc: DEFAULT_TAU_RC,
            tau_ref: DEFAULT_TAU_REF,
        }
    }

    /// Rate LIF neurons with default time constants.
    pub fn lif_rate() -> Self {
        NeuronType::LifRate {
            tau_rc: DEFAULT_TAU_RC,
            tau_ref: DEFAULT_TAU_REF,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, NeuronType::Direct)
    }

    /// Check the model parameters.
    pub fn validate(&self) -> Result<(), NEFError> {
        match self {
            NeuronType::Lif { tau_rc, tau_ref } | NeuronType::LifRate { tau_rc, tau_ref } => {
                if !(tau_rc.is_finite() && *tau_rc > 0.0) {
                    return Err(NEFError::ConfigurationError(format!(
                        "Membrane time constant must be positive, got {}",
                        tau_rc
                    )));
                }
                if !(tau_ref.is_finite() && *tau_ref >= 0.0) {
                    return Err(NEFError::ConfigurationError(format!(
                        "Refractory period must be non-negative, got {}",
                        tau_ref
                    )));
                }
                Ok(())
            }
            NeuronType::RectifiedLinear | NeuronType::Direct => Ok(()),
        }
    }

    /// Returns the largest firing rate the model can reach, if any.
    pub fn max_firing_rate(&self) -> f64 {
        match self {
            NeuronType::Lif { tau_ref, .. } | NeuronType::LifRate { tau_ref, .. } => {
                if *tau_ref > 0.0 {
                    1.0 / tau_ref
                } else {
                    f64::INFINITY
                }
            }
            NeuronType::RectifiedLinear | NeuronType::Direct => f64::INFINITY,
        }
    }

    /// Returns the gain and bias producing the given maximum rate (at a unit represented value) and intercept.
    /// The function returns an error if the rate cannot be reached or if the intercept is not below 1.
    pub fn gain_bias(&self, max_rate: f64, intercept: f64) -> Result<(f64, f64), NEFError> {
        if !(max_rate.is_finite() && max_rate > 0.0) {
            return Err(NEFError::ConfigurationError(format!(
                "Maximum firing rates must be positive, got {}",
                max_rate
            )));
        }
        if !(intercept.is_finite() && intercept < 1.0) {
            return Err(NEFError::ConfigurationError(format!(
                "Intercepts must be below 1, got {}",
                intercept
            )));
        }

        match self {
            NeuronType::Lif { tau_rc, tau_ref } | NeuronType::LifRate { tau_rc, tau_ref } => {
                if max_rate >= self.max_firing_rate() {
                    return Err(NEFError::ConfigurationError(format!(
                        "Maximum firing rate {} cannot be reached with a refractory period of {}",
                        max_rate, tau_ref
                    )));
                }
                // input current at which the neuron fires at max_rate
                let x = 1.0 / (1.0 - ((tau_ref - 1.0 / max_rate) / tau_rc).exp());
                let gain = (LIF_THRESHOLD - x) / (intercept - 1.0);
                let bias = LIF_THRESHOLD - gain * intercept;
                Ok((gain, bias))
            }
            NeuronType::RectifiedLinear => {
                let gain = max_rate / (1.0 - intercept);
                let bias = -gain * intercept;
                Ok((gain, bias))
            }
            NeuronType::Direct => Err(NEFError::ConfigurationError(
                "Direct ensembles have no tuning curves".to_string(),
            )),
        }
    }

    /// Returns the steady-state activity of a neuron receiving the input current `current`.
    /// Spiking neurons respond with their firing rate; direct neurons pass the current through.
    pub fn rate(&self, current: f64) -> f64 {
        match self {
            NeuronType::Lif { tau_rc, tau_ref } | NeuronType::LifRate { tau_rc, tau_ref } => {
                if current > LIF_THRESHOLD {
                    1.0 / (tau_ref + tau_rc * (1.0 / (current - LIF_THRESHOLD)).ln_1p())
                } else {
                    0.0
                }
            }
            NeuronType::RectifiedLinear => current.max(0.0),
            NeuronType::Direct => current,
        }
    }

    /// Returns the steady-state activities of a population receiving the input currents.
    pub fn rates(&self, currents: &DVector<f64>) -> DVector<f64> {
        currents.map(|current| self.rate(current))
    }
}

/// The internal dynamics of a population of spiking LIF neurons.
#[derive(Debug, PartialEq, Clone)]
pub struct LifState {
    /// Membrane voltage of every neuron, normalized so that the neuron fires at 1.
    pub voltage: DVector<f64>,
    /// Remaining refractory time of every neuron.
    pub refractory_time: DVector<f64>,
}

impl LifState {
    pub fn new(voltage: DVector<f64>) -> Self {
        let refractory_time = DVector::zeros(voltage.len());
        LifState {
            voltage,
            refractory_time,
        }
    }

    /// Advance the membrane dynamics by one time step and write the spikes (of height 1/dt) into `output`.
    /// The voltage decays exactly towards the input current during the non-refractory part of the step.
    /// When a neuron fires, the spike time within the step is interpolated to start its refractory period.
    pub fn step(
        &mut self,
        currents: &DVector<f64>,
        tau_rc: f64,
        tau_ref: f64,
        dt: f64,
        output: &mut DVector<f64>,
    ) {
        for i in 0..currents.len() {
            let current = currents[i];

            self.refractory_time[i] -= dt;
            let delta_t = (dt - self.refractory_time[i]).clamp(0.0, dt);

            let voltage = &mut self.voltage[i];
            *voltage -= (current - *voltage) * (-delta_t / tau_rc).exp_m1();

            if *voltage > LIF_THRESHOLD {
                output[i] = 1.0 / dt;
                let t_spike =
                    dt + tau_rc * (-(*voltage - LIF_THRESHOLD) / (current - LIF_THRESHOLD)).ln_1p();
                self.refractory_time[i] = tau_ref + t_spike;
                *voltage = 0.0;
            } else {
                output[i] = 0.0;
                if *voltage < 0.0 {
                    *voltage = 0.0;
                }
            }
        }
    }
}
