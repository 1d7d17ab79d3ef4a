//! Core module defining the main components of the Rusty NEF library.
//!
//! This module provides the fundamental building blocks for representing vectors
//! with populations of neurons and for transforming them along connections.
//! It consists of the following components:
//!
//! - [`neuron`]: Implements the neuron models and their tuning curves
//! - [`ensemble`]: Populations of neurons jointly encoding a vector
//! - [`signal`]: Time-varying signal sources feeding the network
//! - [`synapse`]: Temporal filtering applied to connections
//! - [`connection`]: Functions, transforms and slices along a connection
//! - [`optim`]: Least-squares computation of the decoders realizing a function
//! - [`sampler`]: Uniform sampling of hyperspheres and balls
//!
//! # Examples
//!
//! ```
//! use nalgebra::DVector;
//! use rusty_nef::core::ensemble::{Ensemble, EnsembleParams};
//! use rusty_nef::core::optim::Solver;
//! use rusty_nef::core::connection::Function;
//!
//! // A population of 200 neurons representing a scalar in [-1, 1]
//! let ensemble = Ensemble::build(0, EnsembleParams::new(200, 1), 42).unwrap();
//!
//! // Find the decoders approximating the square function
//! let square = Function::new(|x: &[f64]| vec![x[0] * x[0]]);
//! let solution = Solver::default().solve(&ensemble, &square).unwrap();
//!
//! let activities = ensemble.encode(&DVector::from_vec(vec![0.5]));
//! let value = ensemble.decode(&activities, &solution.decoders);
//! assert!((value[0] - 0.25).abs() < 0.05);
//! ```
pub mod connection;
pub mod ensemble;
pub mod neuron;
pub mod optim;
pub mod sampler;
pub mod signal;
pub mod synapse;

/// The default radius of an ensemble, i.e., the expected magnitude of the represented vectors.
pub const DEFAULT_RADIUS: f64 = 1.0;
/// Minimum number of neurons to consider parallel processing.
pub const MIN_PARALLEL_NEURONS: usize = 1_000;
/// Minimum number of connections to consider parallel processing.
pub const MIN_PARALLEL_CONNECTIONS: usize = 32;
