//! Flocking: separation, alignment and cohesion over every particle pair.
//!
//! One particle per cell in row-major order; cells past `particle_count` are
//! padding and are copied through untouched.

use glam::{Vec3, Vec4Swizzles};
use gpgpu::{Backend, CellProgram, ComputeGraph, Fragment, GraphResult, GridDims, ParamSet, Program, Seed, SeedMap};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{live_count, Wiring};
use crate::display::DisplaySpec;

pub const VELOCITIES: &str = "Velocities";
pub const POSITIONS: &str = "Positions";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoidsParams {
    pub particle_count: usize,
    pub timestep: f32,
    pub separation_range: f32,
    pub separation_factor: f32,
    pub visible_range: f32,
    pub alignment_factor: f32,
    pub cohesion_factor: f32,
    pub speed_min_max: [f32; 2],
    /// Half-extent of the periodic domain; zero or less disables wrapping.
    pub bounds: f32,
    pub timesteps_per_frame: u32,
    pub rng_seed: u64,
    pub point_size: f32,
}

impl Default for BoidsParams {
    fn default() -> Self {
        Self {
            particle_count: 1000,
            timestep: 1.0,
            separation_range: 0.8,
            separation_factor: 5e-2,
            visible_range: 4.0,
            alignment_factor: 5e-2,
            cohesion_factor: 5e-4,
            speed_min_max: [0.3, 1.0],
            bounds: 5.0,
            timesteps_per_frame: 1,
            rng_seed: 3,
            point_size: 0.05,
        }
    }
}

/// Wraps `p` into `[-bounds, bounds)` per axis.
pub fn wrap_periodic(p: Vec3, bounds: f32) -> Vec3 {
    if bounds <= 0.0 {
        return p;
    }
    let span = 2.0 * bounds;
    let shifted = p + Vec3::splat(bounds);
    shifted - span * (shifted / span).floor() - Vec3::splat(bounds)
}

/// Rescales `v` so its length lies in `[min, max]`. Zero stays zero.
pub fn clamp_speed(v: Vec3, min: f32, max: f32) -> Vec3 {
    let speed = v.length();
    if speed > 0.0 {
        v / speed * speed.clamp(min, max)
    } else {
        v
    }
}

pub struct VelocityUpdate;

impl CellProgram for VelocityUpdate {
    fn shade(&self, frag: &Fragment<'_>) -> [f32; 4] {
        let velocities = frag.input(0);
        let positions = frag.input(1);
        let index = frag.index();
        let count = live_count(frag);
        let current = velocities.texel(index);
        if index >= count {
            return current.to_array();
        }

        let p = positions.texel(index).xyz();
        let v = current.xyz();
        let separation_range = frag.scalar("separation_range");
        let visible_range = frag.scalar("visible_range");

        let mut separation = Vec3::ZERO;
        let mut alignment = Vec3::ZERO;
        let mut cohesion = Vec3::ZERO;
        let mut neighbours = 0.0f32;
        for j in (0..count).filter(|&j| j != index) {
            let q = positions.texel(j).xyz();
            let d = q - p;
            let dist = d.length();
            if dist > 0.0 && dist < separation_range {
                separation -= d / (dist * dist);
            }
            if dist < visible_range {
                alignment += velocities.texel(j).xyz();
                cohesion += q;
                neighbours += 1.0;
            }
        }

        let mut accel = separation * frag.scalar("separation_factor");
        if neighbours > 0.0 {
            accel += (alignment / neighbours - v) * frag.scalar("alignment_factor")
                + (cohesion / neighbours - p) * frag.scalar("cohesion_factor");
        }
        let limits = frag.vec2("speed_min_max");
        let next = clamp_speed(v + accel * frag.scalar("timestep"), limits.x, limits.y);
        next.extend(current.w).to_array()
    }
}

pub struct PositionUpdate;

impl CellProgram for PositionUpdate {
    fn shade(&self, frag: &Fragment<'_>) -> [f32; 4] {
        let index = frag.index();
        let current = frag.input(0).texel(index);
        if index >= live_count(frag) {
            return current.to_array();
        }
        let v = frag.input(1).texel(index).xyz();
        let next = wrap_periodic(current.xyz() + v * frag.scalar("timestep"), frag.scalar("bounds"));
        next.extend(current.w).to_array()
    }
}

pub fn velocity_program() -> Program {
    Program::new("boids_velocity")
        .with_cpu(VelocityUpdate)
        .with_wgsl(include_str!("../shaders/boids_velocity.wgsl"))
}

pub fn position_program() -> Program {
    Program::new("boids_position")
        .with_cpu(PositionUpdate)
        .with_wgsl(include_str!("../shaders/boids_position.wgsl"))
}

pub fn velocity_params(params: &BoidsParams) -> ParamSet {
    ParamSet::new()
        .with("timestep", params.timestep)
        .with("separation_range", params.separation_range)
        .with("separation_factor", params.separation_factor)
        .with("visible_range", params.visible_range)
        .with("alignment_factor", params.alignment_factor)
        .with("cohesion_factor", params.cohesion_factor)
        .with("speed_min_max", params.speed_min_max)
        .with("particle_count", params.particle_count as f32)
        .with("time", 0.0)
}

pub fn position_params(params: &BoidsParams) -> ParamSet {
    ParamSet::new()
        .with("timestep", params.timestep)
        .with("bounds", params.bounds)
        .with("particle_count", params.particle_count as f32)
        .with("time", 0.0)
}

/// Positions uniform in `[-2.5, 2.5)^3`, velocities uniform in `[-1, 1)^3`.
pub fn seeds(dims: GridDims, params: &BoidsParams) -> GraphResult<(Seed, Seed)> {
    dims.ensure_fits(params.particle_count)?;
    let mut rng = ChaCha8Rng::seed_from_u64(params.rng_seed);
    let mut positions = dims.zeroed();
    let mut velocities = dims.zeroed();
    for i in 0..params.particle_count {
        let p = Vec3::new(rng.gen(), rng.gen(), rng.gen()) - Vec3::splat(0.5);
        let v = Vec3::new(rng.gen(), rng.gen(), rng.gen()) - Vec3::splat(0.5);
        positions.set_texel(i, (p * 5.0).extend(0.0).to_array());
        velocities.set_texel(i, (v * 2.0).extend(0.0).to_array());
    }
    Ok((positions, velocities))
}

pub fn wire<B: Backend>(graph: &mut ComputeGraph<B>, params: &BoidsParams) -> GraphResult<Wiring> {
    let velocities = graph.add_variable(VELOCITIES)?;
    let positions = graph.add_variable(POSITIONS)?;
    let velocity_update = graph.add_kernel(
        "velocity_update",
        velocity_program(),
        VELOCITIES,
        &[VELOCITIES, POSITIONS],
        velocity_params(params),
    )?;
    let position_update = graph.add_kernel(
        "position_update",
        position_program(),
        POSITIONS,
        &[POSITIONS, VELOCITIES],
        position_params(params),
    )?;

    let (position_seed, velocity_seed) = seeds(graph.dims(), params)?;
    let mut seed_map = SeedMap::new();
    seed_map.insert(POSITIONS.to_string(), position_seed);
    seed_map.insert(VELOCITIES.to_string(), velocity_seed);

    Ok(Wiring {
        sequence: vec![velocity_update, position_update],
        pointer_kernels: Vec::new(),
        display: vec![
            DisplaySpec::particles("positions", positions, params.particle_count, params.point_size),
            DisplaySpec::particles("velocities", velocities, params.particle_count, params.point_size),
        ],
        seeds: seed_map,
        sub_steps: params.timesteps_per_frame.max(1),
    })
}

/// Mean speed over the first `count` texels of a velocity readback.
pub fn mean_speed(velocities: &[f32], count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    let texels: &[[f32; 4]] = bytemuck::cast_slice(velocities);
    let total: f32 = texels
        .iter()
        .take(count)
        .map(|t| Vec3::new(t[0], t[1], t[2]).length())
        .sum();
    total / count as f32
}
