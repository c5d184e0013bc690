//! Direct-sum N-body gravity.
//!
//! `PositionsMasses` stores xyz position with mass in w; `Velocities` stores
//! xyz velocity. Seeding removes net momentum and radial velocity so the
//! cloud neither drifts nor collapses head-on.

use glam::{Vec3, Vec4Swizzles};
use gpgpu::{Backend, CellProgram, ComputeGraph, Fragment, GraphResult, GridDims, ParamSet, Program, Seed, SeedMap};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{live_count, Wiring};
use crate::display::DisplaySpec;

pub const POSITIONS_MASSES: &str = "PositionsMasses";
pub const VELOCITIES: &str = "Velocities";

/// Added to pair distances in the potential energy sum.
const ENERGY_EPSILON: f32 = 1e-10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NBodyParams {
    pub particle_count: usize,
    pub timestep: f32,
    pub gravity: f32,
    pub softening: f32,
    pub timesteps_per_frame: u32,
    pub rng_seed: u64,
    pub point_size: f32,
}

impl Default for NBodyParams {
    fn default() -> Self {
        Self {
            particle_count: 2000,
            timestep: 0.01,
            gravity: 1.0,
            softening: 0.05,
            timesteps_per_frame: 1,
            rng_seed: 4,
            point_size: 0.02,
        }
    }
}

/// Point mass with velocity, the seeding-side view of one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Body {
    pub position: Vec3,
    pub mass: f32,
    pub velocity: Vec3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Energy {
    pub kinetic: f32,
    pub potential: f32,
    pub total: f32,
}

/// Positions in `[-1, 1)^3`, masses in `[1, 6)`, velocities in `[-50, 50)^3`.
pub fn random_bodies(count: usize, rng_seed: u64) -> Vec<Body> {
    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
    (0..count)
        .map(|_| {
            let position = (Vec3::new(rng.gen(), rng.gen(), rng.gen()) - Vec3::splat(0.5)) * 2.0;
            let mass = rng.gen::<f32>() * 5.0 + 1.0;
            let velocity = (Vec3::new(rng.gen(), rng.gen(), rng.gen()) - Vec3::splat(0.5)) * 100.0;
            Body {
                position,
                mass,
                velocity,
            }
        })
        .collect()
}

pub fn total_momentum(bodies: &[Body]) -> Vec3 {
    bodies.iter().map(|b| b.velocity * b.mass).sum()
}

/// Subtracts the mass-weighted mean velocity from every body so total
/// momentum becomes zero.
pub fn remove_net_momentum(bodies: &mut [Body]) {
    let total_mass: f32 = bodies.iter().map(|b| b.mass).sum();
    if total_mass <= 0.0 {
        return;
    }
    let drift = total_momentum(bodies) / total_mass;
    for body in bodies {
        body.velocity -= drift;
    }
}

/// Removes each body's velocity component along its position from the origin.
/// A body at the origin keeps its velocity.
pub fn remove_radial_velocity(bodies: &mut [Body]) {
    for body in bodies {
        let radial = body.position.normalize_or_zero();
        body.velocity -= radial * body.velocity.dot(radial);
    }
}

/// Kinetic `sum(0.5 m v^2)` and pairwise potential `-sum(m_i m_j / r_ij)`.
pub fn total_energy(bodies: &[Body]) -> Energy {
    let kinetic: f32 = bodies
        .iter()
        .map(|b| 0.5 * b.mass * b.velocity.length_squared())
        .sum();
    let mut potential = 0.0;
    for (i, a) in bodies.iter().enumerate() {
        for b in &bodies[i + 1..] {
            let r = a.position.distance(b.position);
            potential -= a.mass * b.mass / (r + ENERGY_EPSILON);
        }
    }
    Energy {
        kinetic,
        potential,
        total: kinetic + potential,
    }
}

/// Rebuilds bodies from `PositionsMasses` and `Velocities` readbacks.
pub fn bodies_from_state(positions_masses: &[f32], velocities: &[f32], count: usize) -> Vec<Body> {
    let pm: &[[f32; 4]] = bytemuck::cast_slice(positions_masses);
    let vel: &[[f32; 4]] = bytemuck::cast_slice(velocities);
    pm.iter()
        .zip(vel)
        .take(count)
        .map(|(p, v)| Body {
            position: Vec3::new(p[0], p[1], p[2]),
            mass: p[3],
            velocity: Vec3::new(v[0], v[1], v[2]),
        })
        .collect()
}

/// Packs bodies into `(PositionsMasses, Velocities)` seeds; padding stays zero.
pub fn pack_seeds(dims: GridDims, bodies: &[Body]) -> GraphResult<(Seed, Seed)> {
    dims.ensure_fits(bodies.len())?;
    let mut positions_masses = dims.zeroed();
    let mut velocities = dims.zeroed();
    for (i, body) in bodies.iter().enumerate() {
        positions_masses.set_texel(i, body.position.extend(body.mass).to_array());
        velocities.set_texel(i, body.velocity.extend(0.0).to_array());
    }
    Ok((positions_masses, velocities))
}

/// Random bodies with momentum and radial velocity removed.
pub fn seed_bodies(params: &NBodyParams) -> Vec<Body> {
    let mut bodies = random_bodies(params.particle_count, params.rng_seed);
    remove_net_momentum(&mut bodies);
    remove_radial_velocity(&mut bodies);
    bodies
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
        let softening = frag.scalar("softening");
        let eps2 = softening * softening;
        let mut accel = Vec3::ZERO;
        for j in (0..count).filter(|&j| j != index) {
            let other = positions.texel(j);
            let d = other.xyz() - p;
            let r2 = d.length_squared() + eps2;
            if r2 > 0.0 {
                accel += other.w * d / (r2 * r2.sqrt());
            }
        }
        let next = current.xyz() + frag.scalar("gravity") * accel * frag.scalar("timestep");
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
        (current.xyz() + v * frag.scalar("timestep"))
            .extend(current.w)
            .to_array()
    }
}

pub fn velocity_program() -> Program {
    Program::new("nbody_velocity")
        .with_cpu(VelocityUpdate)
        .with_wgsl(include_str!("../shaders/nbody_velocity.wgsl"))
}

pub fn position_program() -> Program {
    Program::new("nbody_position")
        .with_cpu(PositionUpdate)
        .with_wgsl(include_str!("../shaders/nbody_position.wgsl"))
}

pub fn velocity_params(params: &NBodyParams) -> ParamSet {
    ParamSet::new()
        .with("timestep", params.timestep)
        .with("gravity", params.gravity)
        .with("softening", params.softening)
        .with("particle_count", params.particle_count as f32)
        .with("time", 0.0)
}

pub fn position_params(params: &NBodyParams) -> ParamSet {
    ParamSet::new()
        .with("timestep", params.timestep)
        .with("particle_count", params.particle_count as f32)
        .with("time", 0.0)
}

pub fn wire<B: Backend>(graph: &mut ComputeGraph<B>, params: &NBodyParams) -> GraphResult<Wiring> {
    let positions = graph.add_variable(POSITIONS_MASSES)?;
    let velocities = graph.add_variable(VELOCITIES)?;
    let velocity_update = graph.add_kernel(
        "velocity_update",
        velocity_program(),
        VELOCITIES,
        &[VELOCITIES, POSITIONS_MASSES],
        velocity_params(params),
    )?;
    let position_update = graph.add_kernel(
        "position_update",
        position_program(),
        POSITIONS_MASSES,
        &[POSITIONS_MASSES, VELOCITIES],
        position_params(params),
    )?;

    let bodies = seed_bodies(params);
    let energy = total_energy(&bodies);
    log::info!(
        "N-body seed: {} bodies, kinetic {:.3}, potential {:.3}, total {:.3}",
        bodies.len(),
        energy.kinetic,
        energy.potential,
        energy.total
    );
    let (pm_seed, vel_seed) = pack_seeds(graph.dims(), &bodies)?;
    let mut seeds = SeedMap::new();
    seeds.insert(POSITIONS_MASSES.to_string(), pm_seed);
    seeds.insert(VELOCITIES.to_string(), vel_seed);

    Ok(Wiring {
        sequence: vec![velocity_update, position_update],
        pointer_kernels: Vec::new(),
        display: vec![
            DisplaySpec::particles("positions", positions, params.particle_count, params.point_size),
            DisplaySpec::particles("velocities", velocities, params.particle_count, params.point_size),
        ],
        seeds,
        sub_steps: params.timesteps_per_frame.max(1),
    })
}
