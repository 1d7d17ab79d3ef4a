//! This module contains the simulator advancing a network in time.
//!
//! Every tick reads the nodes at the current time, evaluates all connections against the outputs
//! of the ensembles at the previous tick, steps all ensembles, and only then publishes their new
//! outputs. The order in which connections and ensembles were added has therefore no effect.
use itertools::izip;
use nalgebra::DVector;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::probe::Probe;
use crate::core::connection::{Connection, ObjectRef};
use crate::core::ensemble::EnsembleState;
use crate::core::{MIN_PARALLEL_CONNECTIONS, MIN_PARALLEL_NEURONS};
use crate::error::NEFError;
use crate::network::{Network, ProbeRef};
use crate::simulator::probe::ProbeTarget;

/// The lifecycle of a simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimulatorState {
    /// Built and not yet advanced (or reset).
    Built,
    /// Advancing through a call to `run` or `run_steps`.
    Running,
    /// Done advancing, either because the requested duration elapsed or because a stop was
    /// requested. After a requested stop, a reset is required to run again.
    Stopped,
}

/// A handle to request the end of a simulation from another thread or from a node function.
/// The request is honoured at the next tick boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        StopHandle::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Simulation of a network with a fixed time step.
#[derive(Debug)]
pub struct Simulator {
    network: Network,
    dt: f64,
    state: SimulatorState,
    n_steps: usize,
    stop: StopHandle,
    ensemble_states: Vec<EnsembleState>,
    /// Outputs of the ensembles at the last completed tick.
    outputs: Vec<DVector<f64>>,
    /// Back buffer the ensembles are stepped into.
    next_outputs: Vec<DVector<f64>>,
    node_outputs: Vec<DVector<f64>>,
    /// Filtered outputs of the connections.
    connection_states: Vec<DVector<f64>>,
    probes: Vec<Probe>,
    trange: Vec<f64>,
    /// Time of the first input beyond the radius of each ensemble, if any.
    radius_warned: Vec<Option<f64>>,
}

impl Simulator {
    /// Prepare the simulation of the network with the specified time step.
    /// The decoders of all connections from neural ensembles are computed once here.
    /// The function returns an error for an invalid time step or if some decoders cannot be computed.
    pub fn build(mut network: Network, dt: f64) -> Result<Self, NEFError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(NEFError::ConfigurationError(format!(
                "The time step must be positive, got {}",
                dt
            )));
        }

        network.solve_decoders()?;

        let mut probes = Vec::with_capacity(network.probes().len());
        for spec in network.probes() {
            let size = network.target_size(spec.target)?;
            let decoders = match spec.target {
                ProbeTarget::Ensemble(id) => network.identity_decoders(id)?,
                _ => None,
            };
            probes.push(Probe::new(spec, size, decoders));
        }

        log::info!(
            "Network built: {} ensembles ({} neurons), {} nodes, {} connections, {} probes",
            network.num_ensembles(),
            network.num_neurons(),
            network.num_nodes(),
            network.num_connections(),
            probes.len()
        );

        let outputs: Vec<DVector<f64>> = network
            .ensembles()
            .iter()
            .map(|ensemble| DVector::zeros(ensemble.output_size()))
            .collect();

        Ok(Simulator {
            dt,
            state: SimulatorState::Built,
            n_steps: 0,
            stop: StopHandle::new(),
            ensemble_states: network
                .ensembles()
                .iter()
                .map(|ensemble| ensemble.init_state())
                .collect(),
            next_outputs: outputs.clone(),
            outputs,
            node_outputs: network
                .nodes()
                .iter()
                .map(|node| DVector::zeros(node.dimensions()))
                .collect(),
            connection_states: network
                .connections()
                .iter()
                .map(|connection| connection.initial_value().clone())
                .collect(),
            probes,
            trange: vec![],
            radius_warned: vec![None; network.num_ensembles()],
            network,
        })
    }

    /// Use the provided handle to request the end of the simulation.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Returns a handle to request the end of the simulation.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.n_steps as f64 * self.dt
    }

    /// Returns the times of the recorded samples.
    pub fn trange(&self) -> &[f64] {
        &self.trange
    }

    /// Returns the samples recorded by a probe, one per step.
    /// The function returns an error if the probe does not belong to the simulated network.
    pub fn data(&self, probe: ProbeRef) -> Result<&[DVector<f64>], NEFError> {
        self.probes
            .get(probe.id())
            .map(|probe| probe.data())
            .ok_or_else(|| {
                NEFError::ConfigurationError(format!("Probe {} does not exist", probe.id()))
            })
    }

    /// Run the simulation for the specified duration, i.e., for `round(duration / dt)` steps.
    /// The function returns an error for a negative or non-finite duration.
    pub fn run(&mut self, duration: f64) -> Result<(), NEFError> {
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(NEFError::ConfigurationError(format!(
                "The duration must be non-negative, got {}",
                duration
            )));
        }
        self.run_steps((duration / self.dt).round() as usize)
    }

    /// Run the simulation for the specified number of steps, unless a stop is requested.
    /// The simulation is left in the `Stopped` state, from which it can be run further unless a
    /// stop has been requested. In the latter case, the function returns an error until reset.
    pub fn run_steps(&mut self, num_steps: usize) -> Result<(), NEFError> {
        if self.stop.is_stopped() {
            return Err(NEFError::ConfigurationError(
                "The simulation has been stopped, reset it to run again".to_string(),
            ));
        }

        log::info!("Starting simulation...");
        self.state = SimulatorState::Running;
        let log_interval = (num_steps / 100).max(1);

        for k in 0..num_steps {
            if self.stop.is_stopped() {
                log::info!("Simulation stopped at t = {:.4}", self.time());
                self.state = SimulatorState::Stopped;
                return Ok(());
            }
            self.tick();

            if (k + 1) % log_interval == 0 {
                log::debug!(
                    "Simulation progress: {:.2}% (Time: {:.3})",
                    100.0 * (k + 1) as f64 / num_steps as f64,
                    self.time()
                );
            }
        }

        self.state = SimulatorState::Stopped;
        log::info!("Simulation completed successfully!");
        Ok(())
    }

    /// Advance the simulation by a single step.
    pub fn step(&mut self) -> Result<(), NEFError> {
        self.run_steps(1)
    }

    /// Bring the simulation back to time zero: ensemble, connection and probe states are reinitialized.
    /// The decoders are kept.
    pub fn reset(&mut self) {
        self.n_steps = 0;
        self.stop.clear();
        self.state = SimulatorState::Built;
        self.trange.clear();
        self.radius_warned.fill(None);

        for (ensemble, state, output, next_output) in izip!(
            self.network.ensembles(),
            self.ensemble_states.iter_mut(),
            self.outputs.iter_mut(),
            self.next_outputs.iter_mut()
        ) {
            *state = ensemble.init_state();
            output.fill(0.0);
            next_output.fill(0.0);
        }
        for output in self.node_outputs.iter_mut() {
            output.fill(0.0);
        }
        for (connection, state) in self
            .network
            .connections()
            .iter()
            .zip(self.connection_states.iter_mut())
        {
            state.copy_from(connection.initial_value());
        }
        for probe in self.probes.iter_mut() {
            probe.clear();
        }
    }

    fn tick(&mut self) {
        let dt = self.dt;
        let t = self.time();

        for (node, output) in self.network.nodes().iter().zip(self.node_outputs.iter_mut()) {
            *output = node.value_at(t);
        }

        // connections only read the outputs of the previous tick
        let outputs = &self.outputs;
        let node_outputs = &self.node_outputs;
        let connections = self.network.connections();
        let evaluate = |(connection, state): (&Connection, &mut DVector<f64>)| {
            let source_output = match connection.source() {
                ObjectRef::Ensemble(id) => &outputs[id],
                ObjectRef::Node(id) => &node_outputs[id],
            };
            connection.evaluate(source_output, state, dt);
        };
        if connections.len() > MIN_PARALLEL_CONNECTIONS {
            connections
                .par_iter()
                .zip(self.connection_states.par_iter_mut())
                .for_each(evaluate);
        } else {
            connections
                .iter()
                .zip(self.connection_states.iter_mut())
                .for_each(evaluate);
        }

        let ensembles = self.network.ensembles();
        let mut inputs: Vec<DVector<f64>> = ensembles
            .iter()
            .map(|ensemble| DVector::zeros(ensemble.dimensions()))
            .collect();
        for (connection, state) in connections.iter().zip(self.connection_states.iter()) {
            inputs[connection.destination()] += state;
        }

        for (ensemble, input, warned) in
            izip!(ensembles, inputs.iter(), self.radius_warned.iter_mut())
        {
            if warned.is_none() && input.norm() > ensemble.radius() {
                log::warn!(
                    "Ensemble {} receives an input of norm {:.3} beyond its radius {} at t = {:.3}",
                    ensemble.id(),
                    input.norm(),
                    ensemble.radius(),
                    t
                );
                *warned = Some(t);
            }
        }

        if self.network.num_neurons() > MIN_PARALLEL_NEURONS {
            (
                ensembles,
                &inputs,
                &mut self.ensemble_states,
                &mut self.next_outputs,
            )
                .into_par_iter()
                .for_each(|(ensemble, input, state, output)| {
                    ensemble.step(input, state, dt, output)
                });
        } else {
            for (ensemble, input, state, output) in izip!(
                ensembles,
                inputs.iter(),
                self.ensemble_states.iter_mut(),
                self.next_outputs.iter_mut()
            ) {
                ensemble.step(input, state, dt, output);
            }
        }
        std::mem::swap(&mut self.outputs, &mut self.next_outputs);

        self.n_steps += 1;
        self.trange.push(self.time());

        for probe in self.probes.iter_mut() {
            let signal = match probe.target() {
                ProbeTarget::Ensemble(id) | ProbeTarget::Neurons(id) => &self.outputs[id],
                ProbeTarget::Connection(id) => &self.connection_states[id],
                ProbeTarget::Node(id) => &self.node_outputs[id],
            };
            probe.record(signal, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::{ConnectionParams, Transform};
    use crate::core::ensemble::EnsembleParams;
    use crate::core::neuron::NeuronType;
    use crate::core::signal::Node;
    use crate::core::synapse::Synapse;
    use crate::simulator::TIME_STEP;
    use approx::assert_relative_eq;

    fn direct(dimensions: usize) -> EnsembleParams {
        EnsembleParams::new(1, dimensions).with_neuron_type(NeuronType::Direct)
    }

    #[test]
    fn test_build_invalid_time_step() {
        assert!(matches!(
            Simulator::build(Network::new(), 0.0),
            Err(NEFError::ConfigurationError(_))
        ));
        assert!(matches!(
            Simulator::build(Network::new(), f64::NAN),
            Err(NEFError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_run_steps_and_time() {
        let mut network = Network::new();
        let stim = network.add_node(Node::function(|t| vec![t]).unwrap());
        let probe = network.probe(stim, Synapse::Passthrough).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        assert_eq!(simulator.state(), SimulatorState::Built);
        assert_eq!(simulator.dt(), TIME_STEP);
        assert_eq!(simulator.network().num_nodes(), 1);

        simulator.run(0.01).unwrap();
        assert_eq!(simulator.n_steps(), 10);
        assert_eq!(simulator.state(), SimulatorState::Stopped);
        assert_relative_eq!(simulator.time(), 0.01, epsilon = 1e-12);
        assert_eq!(simulator.trange().len(), 10);
        assert_relative_eq!(simulator.trange()[0], 0.001, epsilon = 1e-12);

        // nodes are read at the start of each step
        let data = simulator.data(probe).unwrap();
        assert_eq!(data[0][0], 0.0);
        assert_relative_eq!(data[9][0], 0.009, epsilon = 1e-12);

        simulator.step().unwrap();
        assert_eq!(simulator.n_steps(), 11);
        assert!(simulator.run(-1.0).is_err());
    }

    #[test]
    fn test_unconnected_ensemble_gets_zero_input() {
        let mut network = Network::new();
        let a = network.add_ensemble(direct(2)).unwrap();
        let probe = network.probe(a, Synapse::Passthrough).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run_steps(5).unwrap();
        assert!(simulator
            .data(probe)
            .unwrap()
            .iter()
            .all(|x| x.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_synchronous_update() {
        // a receives 1 + 2 b, b receives a, both through passthrough connections
        let mut network = Network::new();
        let stim = network.add_node(Node::constant(vec![1.0]).unwrap());
        let a = network.add_ensemble(direct(1)).unwrap();
        let b = network.add_ensemble(direct(1)).unwrap();
        network.connect(stim, a, ConnectionParams::new()).unwrap();
        network
            .connect(b, a, ConnectionParams::new().with_transform(Transform::Scalar(2.0)))
            .unwrap();
        network.connect(a, b, ConnectionParams::new()).unwrap();
        let probe_a = network.probe(a, Synapse::Passthrough).unwrap();
        let probe_b = network.probe(b, Synapse::Passthrough).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run_steps(5).unwrap();

        let xa: Vec<f64> = simulator.data(probe_a).unwrap().iter().map(|x| x[0]).collect();
        let xb: Vec<f64> = simulator.data(probe_b).unwrap().iter().map(|x| x[0]).collect();
        assert_eq!(xa, vec![1.0, 1.0, 3.0, 3.0, 7.0]);
        assert_eq!(xb, vec![0.0, 1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_connection_probe_and_initial_value() {
        let mut network = Network::new();
        let a = network.add_ensemble(direct(1)).unwrap();
        let params = ConnectionParams::new()
            .with_lowpass(0.1)
            .with_initial_value(vec![1.0]);
        let conn = network.connect(a, a, params).unwrap();
        let probe = network.probe(conn, Synapse::Passthrough).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run_steps(2).unwrap();

        // the ensemble output is zero before the first step, then holds the filtered value
        let data = simulator.data(probe).unwrap();
        assert_relative_eq!(data[0][0], 0.99, epsilon = 1e-12);
        assert_relative_eq!(data[1][0], 0.99, epsilon = 1e-12);
    }

    #[test]
    fn test_stop_and_reset() {
        let stop = StopHandle::new();
        let trigger = stop.clone();

        let mut network = Network::new();
        let stim = network.add_node(
            Node::function(move |t| {
                if t >= 0.0995 {
                    trigger.stop();
                }
                vec![t]
            })
            .unwrap(),
        );
        let a = network.add_ensemble(direct(1)).unwrap();
        network.connect(stim, a, ConnectionParams::new()).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP)
            .unwrap()
            .with_stop_handle(stop.clone());
        simulator.run(1.0).unwrap();
        assert_eq!(simulator.state(), SimulatorState::Stopped);
        assert_eq!(simulator.n_steps(), 101);
        assert!(simulator.run(1.0).is_err());

        simulator.reset();
        assert_eq!(simulator.state(), SimulatorState::Built);
        assert_eq!(simulator.n_steps(), 0);
        assert!(simulator.trange().is_empty());
        assert!(!stop.is_stopped());

        simulator.run(0.05).unwrap();
        assert_eq!(simulator.n_steps(), 50);
        assert_eq!(simulator.state(), SimulatorState::Stopped);
    }

    #[test]
    fn test_completed_run_is_stopped() {
        let mut network = Network::new();
        let stim = network.add_node(Node::function(|t| vec![t]).unwrap());
        let a = network.add_ensemble(direct(1)).unwrap();
        network.connect(stim, a, ConnectionParams::new()).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run(0.01).unwrap();
        assert_eq!(simulator.state(), SimulatorState::Stopped);
        assert!(!simulator.stop_handle().is_stopped());

        // a completed run can be continued, unlike a run stopped on request
        simulator.run(0.01).unwrap();
        assert_eq!(simulator.n_steps(), 20);
        assert_eq!(simulator.state(), SimulatorState::Stopped);
        assert_relative_eq!(simulator.time(), 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_input_beyond_radius_is_flagged_once() {
        let mut network = Network::new();
        let stim = network.add_node(
            Node::piecewise(vec![(0.0, vec![0.5]), (0.1005, vec![2.0]), (0.2005, vec![3.0])])
                .unwrap(),
        );
        let inside = network.add_node(Node::constant(vec![0.5]).unwrap());
        let a = network.add_ensemble(direct(1)).unwrap();
        let b = network.add_ensemble(direct(1)).unwrap();
        network.connect(stim, a, ConnectionParams::new()).unwrap();
        network.connect(inside, b, ConnectionParams::new()).unwrap();
        let probe = network.probe(a, Synapse::Passthrough).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run(0.3).unwrap();
        assert_eq!(simulator.n_steps(), 300);
        assert_eq!(simulator.state(), SimulatorState::Stopped);

        // the input is not clipped, and only the first violation is recorded
        assert_eq!(simulator.data(probe).unwrap()[299][0], 3.0);
        assert_eq!(simulator.radius_warned.len(), 2);
        assert_relative_eq!(simulator.radius_warned[0].unwrap(), 0.101, epsilon = 1e-12);
        assert_eq!(simulator.radius_warned[1], None);

        simulator.reset();
        assert_eq!(simulator.radius_warned, vec![None, None]);
    }

    #[test]
    fn test_stop_before_run() {
        let mut network = Network::new();
        network.add_ensemble(direct(1)).unwrap();
        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();

        simulator.stop_handle().stop();
        assert!(simulator.run(0.1).is_err());
        assert_eq!(simulator.n_steps(), 0);
        assert_eq!(simulator.state(), SimulatorState::Built);

        simulator.reset();
        simulator.run(0.1).unwrap();
        assert_eq!(simulator.n_steps(), 100);
    }

    #[test]
    fn test_node_output_of_wrong_length() {
        let mut network = Network::new();
        let stim = network.add_node(
            Node::function(|t| if t < 0.05 { vec![1.0] } else { vec![1.0, 1.0] }).unwrap(),
        );
        let a = network.add_ensemble(direct(1)).unwrap();
        network.connect(stim, a, ConnectionParams::new()).unwrap();
        let probe = network.probe(a, Synapse::Passthrough).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run(0.1).unwrap();
        assert_eq!(simulator.n_steps(), 100);
        let data = simulator.data(probe).unwrap();
        assert!(data.iter().all(|x| x.len() == 1 && x[0] == 1.0));
    }

    #[test]
    fn test_reset_reproduces_spiking_run() {
        let mut network = Network::with_seed(1);
        let stim = network.add_node(Node::constant(vec![0.3]).unwrap());
        let a = network.add_ensemble(EnsembleParams::new(40, 1)).unwrap();
        network.connect(stim, a, ConnectionParams::new()).unwrap();
        let probe = network.probe(a, Synapse::Lowpass { tau: 0.01 }).unwrap();

        let mut simulator = Simulator::build(network, TIME_STEP).unwrap();
        simulator.run(0.2).unwrap();
        let first = simulator.data(probe).unwrap().to_vec();

        simulator.reset();
        simulator.run(0.2).unwrap();
        assert_eq!(simulator.data(probe).unwrap(), &first[..]);
    }
}
