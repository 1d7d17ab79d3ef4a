//! Module implementing the probes, i.e., the recorders of the signals of a network during simulation.
use nalgebra::{DMatrix, DVector};

use crate::core::synapse::Synapse;

/// The signal recorded by a probe.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ProbeTarget {
    /// The (decoded) value represented by an ensemble.
    Ensemble(usize),
    /// The neuron activities of an ensemble.
    Neurons(usize),
    /// The filtered output of a connection.
    Connection(usize),
    /// The output of a node.
    Node(usize),
}

/// The description of a probe in a network.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ProbeSpec {
    pub target: ProbeTarget,
    pub synapse: Synapse,
}

/// A probe attached to a running simulation.
#[derive(Debug, PartialEq, Clone)]
pub struct Probe {
    target: ProbeTarget,
    synapse: Synapse,
    /// Decoders of the represented value, for probes on neural ensembles.
    decoders: Option<DMatrix<f64>>,
    state: DVector<f64>,
    data: Vec<DVector<f64>>,
}

impl Probe {
    pub fn new(spec: &ProbeSpec, size: usize, decoders: Option<DMatrix<f64>>) -> Self {
        Probe {
            target: spec.target,
            synapse: spec.synapse,
            decoders,
            state: DVector::zeros(size),
            data: vec![],
        }
    }

    pub fn target(&self) -> ProbeTarget {
        self.target
    }

    /// Record a new sample of the signal, decoded and filtered if necessary.
    pub fn record(&mut self, signal: &DVector<f64>, dt: f64) {
        match &self.decoders {
            Some(decoders) => {
                let value = decoders.tr_mul(signal);
                self.synapse.filter(&mut self.state, &value, dt);
            }
            None => self.synapse.filter(&mut self.state, signal, dt),
        }
        self.data.push(self.state.clone());
    }

    /// Returns the recorded samples, one per simulation step.
    pub fn data(&self) -> &[DVector<f64>] {
        &self.data
    }

    /// Clear the recorded samples and the filter state.
    pub fn clear(&mut self) {
        self.state.fill(0.0);
        self.data.clear();
    }
}
