//! Property-based tests for the compute graph using proptest
//!
//! Invariants checked across random grid sizes and seeds:
//! - Pass-through copies never change committed state
//! - Current index parity follows the number of executes
//! - Both buffers hold the seed right after initialization

use gpgpu::{ComputeGraph, CpuBackend, GridDims, ParamSet, Program, SeedMap};
use proptest::prelude::*;

fn seeded_copy_graph(width: u32, height: u32, data: Vec<f32>) -> ComputeGraph<CpuBackend> {
    let dims = GridDims::new(width, height).unwrap();
    let mut graph = ComputeGraph::new(dims, CpuBackend::new());
    graph.add_variable("Field").unwrap();
    graph
        .add_kernel("copy", Program::passthrough("Field"), "Field", &["Field"], ParamSet::new())
        .unwrap();
    let mut seeds = SeedMap::new();
    seeds.insert("Field".into(), dims.seed(data).unwrap());
    graph.initialize(seeds).unwrap();
    graph
}

fn grid_and_seed() -> impl Strategy<Value = (u32, u32, Vec<f32>)> {
    (1u32..9, 1u32..9).prop_flat_map(|(w, h)| {
        let len = (w * h * 4) as usize;
        (
            Just(w),
            Just(h),
            prop::collection::vec(-1.0e3f32..1.0e3, len..=len),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_copy_is_identity((w, h, data) in grid_and_seed(), steps in 0usize..12) {
        let mut graph = seeded_copy_graph(w, h, data.clone());
        let field = graph.variable_id("Field").unwrap();
        let copy = graph.kernel_id("copy").unwrap();

        prop_assert_eq!(graph.read_alternate(field).unwrap(), data.clone());
        for _ in 0..steps {
            graph.execute(copy).unwrap();
        }
        prop_assert_eq!(graph.read_state(field).unwrap(), data);
        prop_assert_eq!(graph.variable(field).unwrap().current_index(), steps % 2);
    }

    #[test]
    fn prop_commit_twice_is_identity(toggles in 0usize..20) {
        let mut buffer = gpgpu::StateBuffer::new("Field", gpgpu::WrapMode::default());
        for _ in 0..toggles {
            buffer.commit();
            buffer.commit();
        }
        prop_assert_eq!(buffer.current_index(), 0);
    }
}
