//! This crate provides tools for building and simulating recurrent networks of neural ensembles in Rust,
//! following the principles of the Neural Engineering Framework (NEF).
//!
//! Populations of neurons jointly represent vectors, connections between populations compute
//! functions of these vectors through optimized decoders, and synapses filter the signals in time.
//! Networks may contain cycles, which makes them suitable to implement dynamical systems.
//!
//! # Building Networks
//!
//! ```rust
//! use rusty_nef::core::connection::ConnectionParams;
//! use rusty_nef::core::ensemble::EnsembleParams;
//! use rusty_nef::core::signal::Node;
//! use rusty_nef::network::Network;
//!
//! // Init an empty network with a seed for reproducible tuning curves
//! let mut network = Network::with_seed(42);
//!
//! // A sine wave fed to a population of 100 neurons, whose square is sent to another population
//! let stim = network.add_node(Node::function(|t| vec![(10.0 * t).sin()]).unwrap());
//! let a = network.add_ensemble(EnsembleParams::new(100, 1)).unwrap();
//! let b = network.add_ensemble(EnsembleParams::new(100, 1)).unwrap();
//! network.connect(stim, a, ConnectionParams::new()).unwrap();
//! network
//!     .connect(a, b, ConnectionParams::new().with_function(|x| vec![x[0] * x[0]]).with_lowpass(0.01))
//!     .unwrap();
//!
//! assert_eq!(network.num_neurons(), 200);
//! assert_eq!(network.num_connections(), 2);
//! ```
//!
//! # Simulating Networks
//!
//! ```rust
//! use rusty_nef::core::connection::ConnectionParams;
//! use rusty_nef::core::ensemble::EnsembleParams;
//! use rusty_nef::core::neuron::NeuronType;
//! use rusty_nef::core::synapse::Synapse;
//! use rusty_nef::network::Network;
//! use rusty_nef::simulator::simulator::Simulator;
//! use rusty_nef::simulator::TIME_STEP;
//!
//! // A recurrent memory whose value decays as dx/dt = (x^2 - x) / tau
//! let mut network = Network::with_seed(0);
//! let x = network
//!     .add_ensemble(EnsembleParams::new(1, 1).with_neuron_type(NeuronType::Direct))
//!     .unwrap();
//! let params = ConnectionParams::new()
//!     .with_function(|x| vec![x[0] * x[0]])
//!     .with_lowpass(0.05)
//!     .with_initial_value(vec![0.5]);
//! network.connect(x, x, params).unwrap();
//! let probe = network.probe(x, Synapse::Passthrough).unwrap();
//!
//! let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
//! simulator.run(1.0).unwrap();
//!
//! let data = simulator.data(probe).unwrap();
//! assert_eq!(data.len(), 1000);
//! assert!(data[999][0].abs() < 0.01);
//! ```

pub mod core;
pub mod error;
pub mod network;
pub mod simulator;
