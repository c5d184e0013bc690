//! Heat diffusion on a grid with pointer-driven heat sources.
//!
//! Channel 0 holds temperature. Channel 3 is seeded with noise and carried
//! through every pass untouched.

use glam::Vec2;
use gpgpu::{Backend, CellProgram, ComputeGraph, Fragment, GraphResult, GridDims, ParamSet, Program, SeedMap};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::Wiring;
use crate::display::{ColormapSettings, DisplaySpec};

pub const HEAT: &str = "Heat";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatParams {
    pub width: u32,
    pub height: u32,
    pub timestep: f32,
    pub conductivity: f32,
    pub source_strength: f32,
    /// Injection radius in uv units.
    pub source_radius: f32,
    pub boundary_temperature: f32,
    pub timesteps_per_frame: u32,
    pub rng_seed: u64,
    pub colormap: ColormapSettings,
}

impl Default for HeatParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            timestep: 0.1,
            conductivity: 1.0,
            source_strength: 1.0,
            source_radius: 0.01,
            boundary_temperature: 0.0,
            timesteps_per_frame: 1,
            rng_seed: 2,
            colormap: ColormapSettings::default(),
        }
    }
}

/// Distance from `p` to the segment `a..b`.
pub fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_squared();
    let t = if len2 > 0.0 {
        ((p - a).dot(ab) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p - (a + ab * t)).length()
}

/// Explicit diffusion step: `T + dt * K * laplacian(T)`, plus injection along
/// the pointer segment while the pointer is active.
pub struct HeatTransfer;

impl CellProgram for HeatTransfer {
    fn shade(&self, frag: &Fragment<'_>) -> [f32; 4] {
        let heat = frag.input(0);
        let (x, y) = frag.coord();
        let center = heat.load(x, y);
        let t = center.x;
        let laplacian = heat.load(x - 1, y).x + heat.load(x + 1, y).x + heat.load(x, y - 1).x
            + heat.load(x, y + 1).x
            - 4.0 * t;
        let dt = frag.scalar("timestep");
        let mut next = t + dt * frag.scalar("conductivity") * laplacian;

        if frag.scalar("pointer_active") > 0.5 {
            let radius = frag.scalar("source_radius");
            let d = segment_distance(frag.uv(), frag.vec2("prev_pointer_uv"), frag.vec2("pointer_uv"));
            if d < radius {
                next += frag.scalar("source_strength") * dt * (1.0 - d / radius);
            }
        }
        [next, center.y, center.z, center.w]
    }
}

/// Pins border cells to `boundary_temperature`.
pub struct BoundaryConditions;

impl CellProgram for BoundaryConditions {
    fn shade(&self, frag: &Fragment<'_>) -> [f32; 4] {
        let (x, y) = frag.coord();
        let current = frag.input(0).load(x, y);
        let border = frag.x == 0
            || frag.y == 0
            || frag.x == frag.dims.width() - 1
            || frag.y == frag.dims.height() - 1;
        if border {
            [frag.scalar("boundary_temperature"), current.y, current.z, current.w]
        } else {
            current.to_array()
        }
    }
}

pub fn heat_transfer_program() -> Program {
    Program::new("heat_transfer")
        .with_cpu(HeatTransfer)
        .with_wgsl(include_str!("../shaders/heat_transfer.wgsl"))
}

pub fn boundary_program() -> Program {
    Program::new("boundary_conditions")
        .with_cpu(BoundaryConditions)
        .with_wgsl(include_str!("../shaders/boundary_conditions.wgsl"))
}

pub fn heat_kernel_params(params: &HeatParams) -> ParamSet {
    ParamSet::new()
        .with("timestep", params.timestep)
        .with("conductivity", params.conductivity)
        .with("source_strength", params.source_strength)
        .with("source_radius", params.source_radius)
        .with("pointer_uv", [999.0, 999.0])
        .with("prev_pointer_uv", [999.0, 999.0])
        .with("pointer_active", 0.0)
        .with("time", 0.0)
}

pub fn boundary_kernel_params(params: &HeatParams) -> ParamSet {
    ParamSet::new()
        .with("boundary_temperature", params.boundary_temperature)
        .with("time", 0.0)
}

/// Zero temperature, uniform noise in channel 3.
pub fn seed(dims: GridDims, rng_seed: u64) -> gpgpu::Seed {
    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
    let mut seed = dims.zeroed();
    for texel in seed.texels_mut() {
        texel[3] = rng.gen::<f32>();
    }
    seed
}

pub fn wire<B: Backend>(graph: &mut ComputeGraph<B>, params: &HeatParams) -> GraphResult<Wiring> {
    let heat = graph.add_variable(HEAT)?;
    let transfer = graph.add_kernel(
        "heat_transfer",
        heat_transfer_program(),
        HEAT,
        &[HEAT],
        heat_kernel_params(params),
    )?;
    let boundary = graph.add_kernel(
        "boundary_conditions",
        boundary_program(),
        HEAT,
        &[HEAT],
        boundary_kernel_params(params),
    )?;

    let mut seeds = SeedMap::new();
    seeds.insert(HEAT.to_string(), seed(graph.dims(), params.rng_seed));

    Ok(Wiring {
        sequence: vec![transfer, boundary],
        pointer_kernels: vec![transfer],
        display: vec![DisplaySpec::grid("heat", heat, params.colormap.clone())],
        seeds,
        sub_steps: params.timesteps_per_frame.max(1),
    })
}
