//! Per-scenario simulation driver.
//!
//! `Constructing -> Ready -> Running -> Destroyed`. Constructing is the body
//! of `Simulation::new`, which wires the scenario and computes its seeds; a
//! driver is only handed out once it is `Ready`. `start` initializes the
//! graph exactly once; every `tick` mirrors pointer and time into kernel
//! parameters, runs the scenario sequence `sub_steps` times and refreshes the
//! display binding.

use std::fmt;

use gpgpu::{Backend, ComputeGraph, GraphError, KernelId, ParamValue, SeedMap};
use thiserror::Error;

use crate::display::{DisplayBinder, DisplayFrame};
use crate::pointer::{PointerSample, PointerTracker};
use crate::scenarios::{self, boids, heat, nbody, ScenarioConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Ready,
    Running,
    Destroyed,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("simulation is not running (state {0:?})")]
    NotRunning(DriverState),
    #[error("simulation already started")]
    AlreadyStarted,
    #[error("simulation has been destroyed")]
    Destroyed,
    #[error("no kernel declares parameter `{0}`")]
    UnknownParameter(String),
    #[error("parameter `{0}` is fixed at construction")]
    FixedParameter(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Per-frame input: wall time plus the pointer snapshot for this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub elapsed: f32,
    pub pointer: PointerSample,
}

/// Scenario-specific health numbers for logging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Diagnostics {
    Heat { min: f32, max: f32, mean: f32 },
    Boids { mean_speed: f32 },
    NBody(nbody::Energy),
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostics::Heat { min, max, mean } => {
                write!(f, "heat min {:.4} max {:.4} mean {:.4}", min, max, mean)
            }
            Diagnostics::Boids { mean_speed } => write!(f, "boids mean speed {:.4}", mean_speed),
            Diagnostics::NBody(e) => write!(
                f,
                "energy kinetic {:.3} potential {:.3} total {:.3}",
                e.kinetic, e.potential, e.total
            ),
        }
    }
}

pub struct Simulation<B: Backend> {
    config: ScenarioConfig,
    graph: ComputeGraph<B>,
    sequence: Vec<KernelId>,
    pointer_kernels: Vec<KernelId>,
    seeds: Option<SeedMap>,
    display: DisplayBinder,
    pointer: Option<PointerTracker>,
    sub_steps: u32,
    elapsed: f32,
    frames: u64,
    state: DriverState,
}

impl<B: Backend> Simulation<B> {
    /// Wires `config` onto a fresh graph over `backend` and computes seeds.
    pub fn new(backend: B, config: &ScenarioConfig) -> DriverResult<Self> {
        let dims = config.dims()?;
        let mut graph = ComputeGraph::new(dims, backend);
        let wiring = scenarios::wire(&mut graph, config)?;
        let mut display = DisplayBinder::new();
        for spec in wiring.display {
            display.add_display_variable(dims, spec)?;
        }
        log::info!(
            "{} scenario ready: {}x{} grid, {} kernels per sub-step, {} sub-steps",
            config.name(),
            dims.width(),
            dims.height(),
            wiring.sequence.len(),
            wiring.sub_steps
        );
        Ok(Self {
            config: config.clone(),
            graph,
            sequence: wiring.sequence,
            pointer_kernels: wiring.pointer_kernels,
            seeds: Some(wiring.seeds),
            display,
            pointer: Some(PointerTracker::new()),
            sub_steps: wiring.sub_steps.max(1),
            elapsed: 0.0,
            frames: 0,
            state: DriverState::Ready,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn graph(&self) -> &ComputeGraph<B> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ComputeGraph<B> {
        &mut self.graph
    }

    /// Kernels run once per sub-step, in order.
    pub fn sequence(&self) -> &[KernelId] {
        &self.sequence
    }

    pub fn sub_steps(&self) -> u32 {
        self.sub_steps
    }

    pub fn set_sub_steps(&mut self, sub_steps: u32) {
        self.sub_steps = sub_steps.max(1);
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn display(&self) -> &DisplayBinder {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplayBinder {
        &mut self.display
    }

    /// Pointer adapter; gone after `destroy`.
    pub fn pointer_mut(&mut self) -> Option<&mut PointerTracker> {
        self.pointer.as_mut()
    }

    /// One-shot transition to `Running`. `external` seeds replace the
    /// generated seed of the same variable.
    pub fn start(&mut self, external: SeedMap) -> DriverResult<()> {
        match self.state {
            DriverState::Ready => {}
            DriverState::Running => return Err(DriverError::AlreadyStarted),
            DriverState::Destroyed => return Err(DriverError::Destroyed),
        }
        let mut seeds = self.seeds.clone().unwrap_or_default();
        let overridden = external.len();
        seeds.extend(external);
        self.graph.initialize(seeds)?;
        self.seeds = None;
        self.display.sync(&self.graph, self.elapsed)?;
        self.state = DriverState::Running;
        log::info!(
            "{} scenario running ({} external seeds)",
            self.config.name(),
            overridden
        );
        Ok(())
    }

    /// Advances one display frame using the owned pointer tracker.
    pub fn tick(&mut self, elapsed: f32) -> DriverResult<&DisplayFrame> {
        let pointer = self
            .pointer
            .as_ref()
            .map(PointerTracker::snapshot)
            .unwrap_or_default();
        self.tick_with(&FrameInput { elapsed, pointer })
    }

    pub fn tick_with(&mut self, input: &FrameInput) -> DriverResult<&DisplayFrame> {
        self.ensure_running()?;
        for &kernel in &self.pointer_kernels {
            self.graph.set_parameter(kernel, "pointer_uv", input.pointer.uv)?;
            self.graph.set_parameter(kernel, "prev_pointer_uv", input.pointer.prev_uv)?;
            self.graph.set_parameter(kernel, "pointer_active", input.pointer.active)?;
        }
        self.graph.broadcast_parameter("time", input.elapsed)?;

        for _ in 0..self.sub_steps {
            self.graph.execute_sequence(&self.sequence)?;
        }
        self.elapsed = input.elapsed;
        self.frames += 1;
        Ok(self.display.sync(&self.graph, input.elapsed)?)
    }

    /// Sets `name` on every kernel that declares it. Names in
    /// [`scenarios::FIXED_PARAMS`] are rejected.
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) -> DriverResult<usize> {
        if self.state == DriverState::Destroyed {
            return Err(DriverError::Destroyed);
        }
        if scenarios::FIXED_PARAMS.contains(&name) {
            return Err(DriverError::FixedParameter(name.to_string()));
        }
        match self.graph.broadcast_parameter(name, value)? {
            0 => Err(DriverError::UnknownParameter(name.to_string())),
            n => Ok(n),
        }
    }

    /// Reads state back and summarizes it.
    pub fn diagnostics(&mut self) -> DriverResult<Diagnostics> {
        self.ensure_running()?;
        let diagnostics = match &self.config {
            ScenarioConfig::Heat(_) => {
                let id = self.graph.variable_id(heat::HEAT)?;
                let data = self.graph.read_state(id)?;
                let temps = data.chunks_exact(4).map(|t| t[0]);
                let (mut min, mut max, mut sum, mut n) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f64, 0usize);
                for t in temps {
                    min = min.min(t);
                    max = max.max(t);
                    sum += t as f64;
                    n += 1;
                }
                Diagnostics::Heat {
                    min,
                    max,
                    mean: (sum / n.max(1) as f64) as f32,
                }
            }
            ScenarioConfig::Boids(p) => {
                let id = self.graph.variable_id(boids::VELOCITIES)?;
                let data = self.graph.read_state(id)?;
                Diagnostics::Boids {
                    mean_speed: boids::mean_speed(&data, p.particle_count),
                }
            }
            ScenarioConfig::NBody(p) => {
                let pm = self.graph.variable_id(nbody::POSITIONS_MASSES)?;
                let vel = self.graph.variable_id(nbody::VELOCITIES)?;
                let pm = self.graph.read_state(pm)?;
                let vel = self.graph.read_state(vel)?;
                let bodies = nbody::bodies_from_state(&pm, &vel, p.particle_count);
                Diagnostics::NBody(nbody::total_energy(&bodies))
            }
        };
        Ok(diagnostics)
    }

    /// Tears down the graph and drops the pointer adapter. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == DriverState::Destroyed {
            return;
        }
        self.graph.teardown();
        self.pointer = None;
        self.seeds = None;
        self.display.clear();
        self.state = DriverState::Destroyed;
        log::info!("{} scenario destroyed after {} frames", self.config.name(), self.frames);
    }

    fn ensure_running(&self) -> DriverResult<()> {
        match self.state {
            DriverState::Running => Ok(()),
            DriverState::Destroyed => Err(DriverError::Destroyed),
            other => Err(DriverError::NotRunning(other)),
        }
    }
}
