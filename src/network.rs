//! Module implementing the description of a network, i.e., the graph of nodes, ensembles, connections and probes.
//!
//! A network is only a description: it holds the tuning of the ensembles and the (solved) connections,
//! while the mutable simulation state lives in the [`Simulator`](crate::simulator::simulator::Simulator).
//! Cycles, e.g., self-connections or feedback between ensembles, are allowed.
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::ops::Range;

use crate::core::connection::{
    Connection, ConnectionParams, Endpoint, Function, ObjectRef, Slice,
};
use crate::core::ensemble::{Ensemble, EnsembleParams};
use crate::core::optim::Solver;
use crate::core::signal::Node;
use crate::core::synapse::Synapse;
use crate::core::MIN_PARALLEL_CONNECTIONS;
use crate::error::NEFError;
use crate::simulator::probe::{ProbeSpec, ProbeTarget};

/// A handle on an ensemble of a network.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct EnsembleRef {
    id: usize,
}

impl EnsembleRef {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Restrict the ensemble to a contiguous range of its dimensions.
    pub fn slice(&self, range: Range<usize>) -> Endpoint {
        Endpoint {
            object: ObjectRef::Ensemble(self.id),
            slice: Some(Slice::Range(range)),
        }
    }

    /// Restrict the ensemble to one of its dimensions.
    pub fn at(&self, index: usize) -> Endpoint {
        self.slice(index..index + 1)
    }

    /// Restrict the ensemble to an arbitrary selection of its dimensions.
    pub fn select(&self, indices: Vec<usize>) -> Endpoint {
        Endpoint {
            object: ObjectRef::Ensemble(self.id),
            slice: Some(Slice::Indices(indices)),
        }
    }

    /// Target the neuron activities of the ensemble (for probing).
    pub fn neurons(&self) -> ProbeTarget {
        ProbeTarget::Neurons(self.id)
    }
}

impl From<EnsembleRef> for Endpoint {
    fn from(ensemble: EnsembleRef) -> Self {
        Endpoint {
            object: ObjectRef::Ensemble(ensemble.id),
            slice: None,
        }
    }
}

impl From<EnsembleRef> for ProbeTarget {
    fn from(ensemble: EnsembleRef) -> Self {
        ProbeTarget::Ensemble(ensemble.id)
    }
}

/// A handle on a node of a network.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct NodeRef {
    id: usize,
}

impl NodeRef {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Restrict the node to a contiguous range of its dimensions.
    pub fn slice(&self, range: Range<usize>) -> Endpoint {
        Endpoint {
            object: ObjectRef::Node(self.id),
            slice: Some(Slice::Range(range)),
        }
    }
}

impl From<NodeRef> for Endpoint {
    fn from(node: NodeRef) -> Self {
        Endpoint {
            object: ObjectRef::Node(node.id),
            slice: None,
        }
    }
}

impl From<NodeRef> for ProbeTarget {
    fn from(node: NodeRef) -> Self {
        ProbeTarget::Node(node.id)
    }
}

/// A handle on a connection of a network.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ConnectionRef {
    id: usize,
}

impl ConnectionRef {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl From<ConnectionRef> for ProbeTarget {
    fn from(connection: ConnectionRef) -> Self {
        ProbeTarget::Connection(connection.id)
    }
}

/// A handle on a probe of a network, used to retrieve the recorded data after simulation.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct ProbeRef {
    id: usize,
}

impl ProbeRef {
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Represents a network of nodes and ensembles linked by connections.
#[derive(Debug, Clone, Default)]
pub struct Network {
    seed: Option<u64>,
    ensembles: Vec<Ensemble>,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    probes: Vec<ProbeSpec>,
}

impl Network {
    /// Create an empty network. Ensembles without an explicit seed are randomly tuned.
    pub fn new() -> Self {
        Network::default()
    }

    /// Create an empty network whose ensembles are seeded from `seed` and their index in the network.
    pub fn with_seed(seed: u64) -> Self {
        Network {
            seed: Some(seed),
            ..Network::default()
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Add an ensemble to the network.
    /// The function returns an error for invalid ensemble parameters.
    pub fn add_ensemble(&mut self, params: EnsembleParams) -> Result<EnsembleRef, NEFError> {
        let id = self.ensembles.len();
        let seed = match self.seed {
            Some(seed) => seed.wrapping_add(id as u64),
            None => rand::random::<u64>(),
        };
        let ensemble = Ensemble::build(id, params, seed)?;
        self.ensembles.push(ensemble);
        Ok(EnsembleRef { id })
    }

    /// Add a signal source to the network.
    pub fn add_node(&mut self, node: Node) -> NodeRef {
        let id = self.nodes.len();
        self.nodes.push(node);
        NodeRef { id }
    }

    /// Connect a source (node or ensemble, possibly sliced) to a destination ensemble (possibly sliced).
    /// The function returns an error if an endpoint does not exist or if the dimensions do not match.
    pub fn connect<S, D>(
        &mut self,
        source: S,
        destination: D,
        params: ConnectionParams,
    ) -> Result<ConnectionRef, NEFError>
    where
        S: Into<Endpoint>,
        D: Into<Endpoint>,
    {
        let source = source.into();
        let destination = destination.into();
        let source_size = self.object_dimensions(source.object)?;
        let destination_size = self.object_dimensions(destination.object)?;

        let id = self.connections.len();
        let connection = Connection::build(
            id,
            &source,
            source_size,
            &destination,
            destination_size,
            params,
        )?;
        self.connections.push(connection);
        Ok(ConnectionRef { id })
    }

    /// Record a signal of the network during simulation, filtered by the specified synapse.
    /// The function returns an error if the target does not exist or if the synapse is invalid.
    pub fn probe<T: Into<ProbeTarget>>(
        &mut self,
        target: T,
        synapse: Synapse,
    ) -> Result<ProbeRef, NEFError> {
        let target = target.into();
        self.target_size(target)?;
        let synapse = Synapse::lowpass(synapse.tau())?;

        let id = self.probes.len();
        self.probes.push(ProbeSpec { target, synapse });
        Ok(ProbeRef { id })
    }

    /// Returns the dimension of the signal recorded by a probe on the target.
    pub fn target_size(&self, target: ProbeTarget) -> Result<usize, NEFError> {
        match target {
            ProbeTarget::Ensemble(id) => self.object_dimensions(ObjectRef::Ensemble(id)),
            ProbeTarget::Node(id) => self.object_dimensions(ObjectRef::Node(id)),
            ProbeTarget::Neurons(id) => match self.ensembles.get(id) {
                Some(ensemble) if ensemble.is_direct() => Err(NEFError::ConfigurationError(
                    format!("Ensemble {} is direct and has no neurons to probe", id),
                )),
                Some(ensemble) => Ok(ensemble.n_neurons()),
                None => Err(NEFError::ConfigurationError(format!(
                    "Ensemble {} does not exist",
                    id
                ))),
            },
            ProbeTarget::Connection(id) => match self.connections.get(id) {
                Some(connection) => Ok(connection.size_out()),
                None => Err(NEFError::ConfigurationError(format!(
                    "Connection {} does not exist",
                    id
                ))),
            },
        }
    }

    fn object_dimensions(&self, object: ObjectRef) -> Result<usize, NEFError> {
        match object {
            ObjectRef::Ensemble(id) => self
                .ensembles
                .get(id)
                .map(|ensemble| ensemble.dimensions())
                .ok_or_else(|| {
                    NEFError::ConfigurationError(format!("Ensemble {} does not exist", id))
                }),
            ObjectRef::Node(id) => self
                .nodes
                .get(id)
                .map(|node| node.dimensions())
                .ok_or_else(|| NEFError::ConfigurationError(format!("Node {} does not exist", id))),
        }
    }

    /// Compute the decoders of every connection whose source is a neural ensemble.
    /// Connections are solved in parallel if there are enough of them.
    pub fn solve_decoders(&mut self) -> Result<(), NEFError> {
        let ensembles = &self.ensembles;
        let solve = |connection: &mut Connection| -> Result<(), NEFError> {
            if let ObjectRef::Ensemble(id) = connection.source() {
                let ensemble = &ensembles[id];
                if !ensemble.is_direct() {
                    let rmse = connection.solve(ensemble)?;
                    log::debug!(
                        "Connection {}: decoders solved from ensemble {} (RMSE: {:.4})",
                        connection.id(),
                        id,
                        rmse
                    );
                }
            }
            Ok(())
        };

        if self.connections.len() > MIN_PARALLEL_CONNECTIONS {
            self.connections.par_iter_mut().try_for_each(solve)
        } else {
            self.connections.iter_mut().try_for_each(solve)
        }
    }

    /// Returns the decoders of the identity function of an ensemble, used to probe its represented value.
    /// Direct ensembles need none.
    pub fn identity_decoders(&self, id: usize) -> Result<Option<DMatrix<f64>>, NEFError> {
        let ensemble = self.ensembles.get(id).ok_or_else(|| {
            NEFError::ConfigurationError(format!("Ensemble {} does not exist", id))
        })?;
        if ensemble.is_direct() {
            return Ok(None);
        }
        let identity = Function::new(|x: &[f64]| x.to_vec());
        let solution = Solver::default().solve(ensemble, &identity)?;
        Ok(Some(solution.decoders))
    }

    /// Returns the ensemble with the specified ID, if any.
    pub fn ensemble(&self, id: usize) -> Option<&Ensemble> {
        self.ensembles.get(id)
    }

    pub fn ensembles(&self) -> &[Ensemble] {
        &self.ensembles
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn probes(&self) -> &[ProbeSpec] {
        &self.probes
    }

    pub fn num_ensembles(&self) -> usize {
        self.ensembles.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Returns the total number of neurons of the (non-direct) ensembles.
    pub fn num_neurons(&self) -> usize {
        self.ensembles
            .iter()
            .filter(|ensemble| !ensemble.is_direct())
            .map(|ensemble| ensemble.n_neurons())
            .sum()
    }
}
