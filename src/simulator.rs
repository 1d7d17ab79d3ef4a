//! Simulation of networks of ensembles.
//!
//! This module provides two main components:
//! - `simulator`: Advances a built network in lock-step, with double-buffered ensemble outputs.
//! - `probe`: Records the signals of the network during simulation.
//!
//! # Example
//! ```rust
//! use rusty_nef::core::connection::ConnectionParams;
//! use rusty_nef::core::ensemble::EnsembleParams;
//! use rusty_nef::core::neuron::NeuronType;
//! use rusty_nef::core::signal::Node;
//! use rusty_nef::core::synapse::Synapse;
//! use rusty_nef::network::Network;
//! use rusty_nef::simulator::simulator::Simulator;
//! use rusty_nef::simulator::TIME_STEP;
//!
//! let mut network = Network::with_seed(42);
//! let stim = network.add_node(Node::constant(vec![0.5]).unwrap());
//! let ens = network
//!     .add_ensemble(EnsembleParams::new(1, 1).with_neuron_type(NeuronType::Direct))
//!     .unwrap();
//! network.connect(stim, ens, ConnectionParams::new().with_lowpass(0.01)).unwrap();
//! let probe = network.probe(ens, Synapse::Passthrough).unwrap();
//!
//! let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
//! simulator.run(0.1).unwrap();
//!
//! let data = simulator.data(probe).unwrap();
//! assert_eq!(data.len(), 100);
//! assert!((data[99][0] - 0.5).abs() < 1e-3);
//! ```

pub mod probe;
pub mod simulator;

/// The default time step used in the simulation (in seconds).
pub const TIME_STEP: f64 = 1e-3;
