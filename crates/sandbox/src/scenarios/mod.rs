//! Scenario wiring: variables, kernels, seeds and per-frame sequence.
//!
//! Scenarios are a closed set. Each one is a plain `wire` function that
//! declares its variables and kernels on a fresh graph and returns the
//! sequence the driver runs every sub-step.

pub mod boids;
pub mod heat;
pub mod nbody;

use gpgpu::{Backend, ComputeGraph, Fragment, GraphResult, GridDims, KernelId, SeedMap};
use serde::{Deserialize, Serialize};

use crate::display::DisplaySpec;

pub use boids::BoidsParams;
pub use heat::HeatParams;
pub use nbody::NBodyParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioConfig {
    Heat(HeatParams),
    Boids(BoidsParams),
    #[serde(rename = "nbody")]
    NBody(NBodyParams),
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig::Heat(HeatParams::default())
    }
}

impl ScenarioConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioConfig::Heat(_) => "heat",
            ScenarioConfig::Boids(_) => "boids",
            ScenarioConfig::NBody(_) => "nbody",
        }
    }

    /// Grid size: as configured for heat, smallest square for particles.
    pub fn dims(&self) -> GraphResult<GridDims> {
        match self {
            ScenarioConfig::Heat(p) => GridDims::new(p.width, p.height),
            ScenarioConfig::Boids(p) => GridDims::for_elements(p.particle_count),
            ScenarioConfig::NBody(p) => GridDims::for_elements(p.particle_count),
        }
    }

    pub fn timestep(&self) -> f32 {
        match self {
            ScenarioConfig::Heat(p) => p.timestep,
            ScenarioConfig::Boids(p) => p.timestep,
            ScenarioConfig::NBody(p) => p.timestep,
        }
    }
}

/// Parameters baked into a scenario's grid layout. The driver refuses to
/// change them after construction.
pub const FIXED_PARAMS: &[&str] = &["particle_count"];

/// Live particle count, capped at the grid so particle loads stay in range.
pub(crate) fn live_count(frag: &Fragment<'_>) -> usize {
    (frag.scalar("particle_count") as usize).min(frag.dims.cell_count())
}

/// What a scenario hands the driver after declaring its graph.
#[derive(Debug)]
pub struct Wiring {
    /// Kernels run in order, once per sub-step.
    pub sequence: Vec<KernelId>,
    /// Kernels that receive pointer parameters each tick.
    pub pointer_kernels: Vec<KernelId>,
    pub display: Vec<DisplaySpec>,
    pub seeds: SeedMap,
    pub sub_steps: u32,
}

/// Declares the scenario's variables and kernels on `graph`.
pub fn wire<B: Backend>(graph: &mut ComputeGraph<B>, config: &ScenarioConfig) -> GraphResult<Wiring> {
    match config {
        ScenarioConfig::Heat(params) => heat::wire(graph, params),
        ScenarioConfig::Boids(params) => boids::wire(graph, params),
        ScenarioConfig::NBody(params) => nbody::wire(graph, params),
    }
}
