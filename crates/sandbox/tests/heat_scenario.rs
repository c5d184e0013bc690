//! Heat scenario on the CPU backend
//!
//! Checks the diffusion stencil against hand-computed values, the border
//! pass, pointer injection and sub-step equivalence.

use glam::Vec2;
use gpgpu::{CpuBackend, ParamValue, SeedMap};
use sandbox::pointer::{PointerSample, OFF_SURFACE};
use sandbox::scenarios::{heat, HeatParams, ScenarioConfig};
use sandbox::{FrameInput, Simulation};

const EPS: f32 = 1e-6;

fn heat_sim(params: HeatParams) -> Simulation<CpuBackend> {
    Simulation::new(CpuBackend::new(), &ScenarioConfig::Heat(params)).unwrap()
}

fn small(width: u32, height: u32) -> HeatParams {
    HeatParams {
        width,
        height,
        ..HeatParams::default()
    }
}

/// Seed with a single hot cell at `(x, y)`.
fn hot_cell(sim: &Simulation<CpuBackend>, x: u32, y: u32, temperature: f32) -> SeedMap {
    let dims = sim.graph().dims();
    let mut seed = dims.zeroed();
    seed.set_texel(dims.index(x, y), [temperature, 0.0, 0.0, 0.0]);
    let mut seeds = SeedMap::new();
    seeds.insert(heat::HEAT.to_string(), seed);
    seeds
}

fn temperatures(sim: &mut Simulation<CpuBackend>) -> Vec<f32> {
    let id = sim.graph().variable_id(heat::HEAT).unwrap();
    let data = sim.graph_mut().read_state(id).unwrap();
    data.chunks_exact(4).map(|t| t[0]).collect()
}

// ============================================================================
// Stencil
// ============================================================================

#[test]
fn test_single_transfer_pass_matches_stencil() {
    let mut sim = heat_sim(small(3, 3));
    let seeds = hot_cell(&sim, 1, 1, 1.0);
    sim.start(seeds).unwrap();
    sim.graph_mut().execute_named("heat_transfer").unwrap();

    let t = temperatures(&mut sim);
    // dt = 0.1, K = 1: centre loses 4 * 0.1, edge neighbours gain 0.1
    assert!((t[4] - 0.6).abs() < EPS, "centre {}", t[4]);
    for i in [1, 3, 5, 7] {
        assert!((t[i] - 0.1).abs() < EPS, "edge {} = {}", i, t[i]);
    }
    for i in [0, 2, 6, 8] {
        assert_eq!(t[i], 0.0, "corner {}", i);
    }
}

#[test]
fn test_full_tick_pins_border() {
    let mut sim = heat_sim(small(3, 3));
    let seeds = hot_cell(&sim, 1, 1, 1.0);
    sim.start(seeds).unwrap();
    sim.tick(0.0).unwrap();

    let t = temperatures(&mut sim);
    assert!((t[4] - 0.6).abs() < EPS);
    for (i, &v) in t.iter().enumerate().filter(|&(i, _)| i != 4) {
        assert_eq!(v, 0.0, "border cell {}", i);
    }
}

#[test]
fn test_boundary_temperature_parameter() {
    let mut sim = heat_sim(HeatParams {
        boundary_temperature: 2.0,
        ..small(4, 4)
    });
    sim.start(SeedMap::new()).unwrap();
    sim.graph_mut().execute_named("boundary_conditions").unwrap();

    let t = temperatures(&mut sim);
    let dims = sim.graph().dims();
    for y in 0..4 {
        for x in 0..4 {
            let border = x == 0 || y == 0 || x == 3 || y == 3;
            let expected = if border { 2.0 } else { 0.0 };
            assert_eq!(t[dims.index(x, y)], expected, "cell ({}, {})", x, y);
        }
    }
}

#[test]
fn test_noise_channel_carried_through() {
    let params = small(8, 8);
    let mut sim = heat_sim(params.clone());
    sim.start(SeedMap::new()).unwrap();
    for frame in 1..=3 {
        sim.tick(frame as f32).unwrap();
    }
    let id = sim.graph().variable_id(heat::HEAT).unwrap();
    let data = sim.graph_mut().read_state(id).unwrap();
    let expected = heat::seed(sim.graph().dims(), params.rng_seed);
    for (texel, seeded) in data.chunks_exact(4).zip(expected.texels()) {
        assert_eq!(texel[3], seeded[3]);
    }
}

// ============================================================================
// Pointer injection
// ============================================================================

fn pointer_at(uv: Vec2, active: bool) -> PointerSample {
    PointerSample {
        ndc: Vec2::ZERO,
        uv,
        prev_uv: uv,
        active,
    }
}

#[test]
fn test_active_pointer_injects_heat() {
    let mut sim = heat_sim(HeatParams {
        source_radius: 0.1,
        ..small(16, 16)
    });
    sim.start(SeedMap::new()).unwrap();
    let input = FrameInput {
        elapsed: 0.0,
        pointer: pointer_at(Vec2::splat(0.5), true),
    };
    sim.tick_with(&input).unwrap();

    let t = temperatures(&mut sim);
    let dims = sim.graph().dims();
    assert!(t[dims.index(7, 7)] > 0.0);
    assert!(t[dims.index(8, 8)] > 0.0);
    assert_eq!(t[dims.index(2, 2)], 0.0);

    let transfer = sim.graph().kernel_id("heat_transfer").unwrap();
    assert_eq!(
        sim.graph().parameter(transfer, "pointer_active"),
        Some(ParamValue::Scalar(1.0))
    );
}

#[test]
fn test_inactive_pointer_injects_nothing() {
    let mut sim = heat_sim(HeatParams {
        source_radius: 0.1,
        ..small(16, 16)
    });
    sim.start(SeedMap::new()).unwrap();
    sim.tick_with(&FrameInput {
        elapsed: 0.0,
        pointer: pointer_at(Vec2::splat(0.5), false),
    })
    .unwrap();
    sim.tick_with(&FrameInput {
        elapsed: 0.1,
        pointer: pointer_at(OFF_SURFACE, true),
    })
    .unwrap();
    assert!(temperatures(&mut sim).iter().all(|&t| t == 0.0));
}

// ============================================================================
// Sub-steps
// ============================================================================

#[test]
fn test_sub_steps_match_manual_sequence() {
    let params = HeatParams {
        timesteps_per_frame: 3,
        ..small(6, 5)
    };
    let mut stepped = heat_sim(params.clone());
    let mut manual = heat_sim(params);
    assert_eq!(stepped.sub_steps(), 3);

    let seeds = hot_cell(&stepped, 2, 2, 5.0);
    stepped.start(seeds.clone()).unwrap();
    manual.start(seeds).unwrap();

    stepped.tick(0.0).unwrap();
    let sequence = manual.sequence().to_vec();
    for _ in 0..3 {
        manual.graph_mut().execute_sequence(&sequence).unwrap();
    }

    let a = temperatures(&mut stepped);
    let b = temperatures(&mut manual);
    assert_eq!(a, b);
    assert!(a.iter().any(|&t| t != 0.0));
}

#[test]
fn test_diagnostics_track_temperature() {
    let mut sim = heat_sim(small(3, 3));
    let seeds = hot_cell(&sim, 1, 1, 1.0);
    sim.start(seeds).unwrap();
    match sim.diagnostics().unwrap() {
        sandbox::Diagnostics::Heat { min, max, mean } => {
            assert_eq!(min, 0.0);
            assert_eq!(max, 1.0);
            assert!((mean - 1.0 / 9.0).abs() < EPS);
        }
        other => panic!("unexpected diagnostics {:?}", other),
    }
}
