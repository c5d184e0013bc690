//! Compute graph behaviour on the CPU backend
//!
//! Covers seeding, ping-pong commit bookkeeping, readiness and configuration
//! failures, and parameter updates.

use gpgpu::{
    Backend, ComputeGraph, CpuBackend, CpuKernel, GraphError, GraphPhase, GridDims, ParamSet,
    ParamValue, PassLayout, Program, SeedMap, TextureId, WrapMode,
};

fn ramp_seed(dims: GridDims) -> Vec<f32> {
    (0..dims.seed_len()).map(|i| i as f32 * 0.25).collect()
}

fn copy_graph(width: u32, height: u32) -> ComputeGraph<CpuBackend> {
    let dims = GridDims::new(width, height).unwrap();
    let mut graph = ComputeGraph::new(dims, CpuBackend::new());
    graph.add_variable("State").unwrap();
    graph
        .add_kernel("copy", Program::passthrough("State"), "State", &["State"], ParamSet::new())
        .unwrap();
    graph
}

fn seeds_for(graph: &ComputeGraph<CpuBackend>, name: &str, data: Vec<f32>) -> SeedMap {
    let mut seeds = SeedMap::new();
    seeds.insert(name.to_string(), graph.dims().seed(data).unwrap());
    seeds
}

// ============================================================================
// Seeding
// ============================================================================

#[test]
fn test_unseeded_variable_reads_zeros() {
    let mut graph = copy_graph(3, 5);
    graph.initialize(SeedMap::new()).unwrap();
    let state = graph.variable_id("State").unwrap();

    let data = graph.read_state(state).unwrap();
    assert_eq!(data.len(), 3 * 5 * 4);
    assert!(data.iter().all(|&v| v == 0.0));
}

#[test]
fn test_seed_populates_both_buffers() {
    let mut graph = copy_graph(4, 4);
    let seed = ramp_seed(graph.dims());
    graph.initialize(seeds_for(&graph, "State", seed.clone())).unwrap();
    let state = graph.variable_id("State").unwrap();

    assert_eq!(graph.read_state(state).unwrap(), seed);
    assert_eq!(graph.read_alternate(state).unwrap(), seed);

    graph.execute_named("copy").unwrap();
    assert_eq!(graph.read_state(state).unwrap(), seed);
    assert_eq!(graph.read_alternate(state).unwrap(), seed);
}

#[test]
fn test_copy_ten_times_is_identity() {
    let mut graph = copy_graph(4, 4);
    let seed = ramp_seed(graph.dims());
    graph.initialize(seeds_for(&graph, "State", seed.clone())).unwrap();
    let copy = graph.kernel_id("copy").unwrap();
    let state = graph.variable_id("State").unwrap();

    for _ in 0..10 {
        graph.execute(copy).unwrap();
    }
    assert_eq!(graph.read_state(state).unwrap(), seed);
    assert_eq!(graph.variable(state).unwrap().current_index(), 0);
}

#[test]
fn test_reseed_overwrites_both_buffers() {
    let mut graph = copy_graph(2, 2);
    graph.initialize(SeedMap::new()).unwrap();
    let state = graph.variable_id("State").unwrap();
    graph.execute_named("copy").unwrap();

    let seed = graph.dims().seed(vec![2.0; 16]).unwrap();
    graph.reseed(state, &seed).unwrap();
    assert_eq!(graph.read_state(state).unwrap(), vec![2.0; 16]);
    assert_eq!(graph.read_alternate(state).unwrap(), vec![2.0; 16]);
}

// ============================================================================
// Commit bookkeeping
// ============================================================================

#[test]
fn test_self_referencing_executes_track_parity() {
    let mut graph = copy_graph(2, 2);
    graph.initialize(SeedMap::new()).unwrap();
    let copy = graph.kernel_id("copy").unwrap();
    let state = graph.variable_id("State").unwrap();

    for n in 1..=7 {
        let before = graph.current_state(state).unwrap();
        graph.execute(copy).unwrap();
        let after = graph.current_state(state).unwrap();
        assert_ne!(before, after, "execute {} must swap buffers", n);
        assert_eq!(graph.variable(state).unwrap().current_index(), n % 2);
    }
}

#[test]
fn test_inputs_see_committed_state_of_earlier_kernels() {
    let dims = GridDims::new(2, 1).unwrap();
    let mut graph = ComputeGraph::new(dims, CpuBackend::new());
    graph.add_variable("A").unwrap();
    graph.add_variable("B").unwrap();
    graph
        .add_kernel(
            "bump_a",
            Program::new("bump_a").with_cpu_fn(|frag| {
                let (x, y) = frag.coord();
                (frag.input(0).load(x, y) + frag.scalar("amount")).to_array()
            }),
            "A",
            &["A"],
            ParamSet::new().with("amount", 1.0),
        )
        .unwrap();
    graph
        .add_kernel(
            "double_into_b",
            Program::new("double_into_b").with_cpu_fn(|frag| {
                let (x, y) = frag.coord();
                (frag.input(0).load(x, y) * 2.0).to_array()
            }),
            "B",
            &["A"],
            ParamSet::new(),
        )
        .unwrap();
    graph.initialize(SeedMap::new()).unwrap();

    let sequence = [
        graph.kernel_id("bump_a").unwrap(),
        graph.kernel_id("double_into_b").unwrap(),
    ];
    graph.execute_sequence(&sequence).unwrap();
    graph.execute_sequence(&sequence).unwrap();

    let b = graph.variable_id("B").unwrap();
    assert_eq!(graph.read_state(b).unwrap(), vec![4.0; 8]);
}

#[test]
fn test_wrap_mode_reaches_kernels() {
    let dims = GridDims::new(3, 1).unwrap();
    let mut graph = ComputeGraph::new(dims, CpuBackend::new());
    graph.add_variable_with_wrap("Ring", WrapMode::Repeat).unwrap();
    graph
        .add_kernel(
            "shift_right",
            Program::new("shift_right").with_cpu_fn(|frag| {
                let (x, y) = frag.coord();
                frag.input(0).load(x - 1, y).to_array()
            }),
            "Ring",
            &["Ring"],
            ParamSet::new(),
        )
        .unwrap();
    let seed: Vec<f32> = [1.0, 2.0, 3.0].iter().flat_map(|&v| [v; 4]).collect();
    graph.initialize(seeds_for(&graph, "Ring", seed)).unwrap();
    graph.execute_named("shift_right").unwrap();

    let ring = graph.variable_id("Ring").unwrap();
    let firsts: Vec<f32> = graph.read_state(ring).unwrap().chunks(4).map(|c| c[0]).collect();
    assert_eq!(firsts, vec![3.0, 1.0, 2.0]);
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_unknown_names_fail_at_registration() {
    let mut graph = copy_graph(2, 2);
    let err = graph
        .add_kernel("k", Program::passthrough("State"), "Missing", &[], ParamSet::new())
        .unwrap_err();
    assert_eq!(err, GraphError::UnknownVariable("Missing".into()));

    let err = graph
        .add_kernel("k", Program::passthrough("State"), "State", &["State", "Nope"], ParamSet::new())
        .unwrap_err();
    assert_eq!(err, GraphError::UnknownVariable("Nope".into()));
    assert!(graph.kernel_id("k").is_err());
}

#[test]
fn test_duplicate_and_invalid_names() {
    let mut graph = copy_graph(2, 2);
    assert_eq!(
        graph.add_variable("State"),
        Err(GraphError::DuplicateVariable("State".into()))
    );
    assert_eq!(
        graph
            .add_kernel("copy", Program::passthrough("State"), "State", &[], ParamSet::new())
            .unwrap_err(),
        GraphError::DuplicateKernel("copy".into())
    );
    assert!(matches!(graph.add_variable("9lives"), Err(GraphError::InvalidName(_))));
    assert!(matches!(
        graph.add_kernel(
            "k2",
            Program::passthrough("State"),
            "State",
            &[],
            ParamSet::new().with("bad name", 1.0)
        ),
        Err(GraphError::InvalidName(_))
    ));
}

#[test]
fn test_snake_case_collisions_are_rejected() {
    let mut graph = copy_graph(2, 2);
    graph.add_variable("fooBar").unwrap();
    assert_eq!(
        graph.add_variable("foo_bar"),
        Err(GraphError::NameCollision {
            name: "foo_bar".into(),
            existing: "fooBar".into(),
        })
    );
    // `STATE` and `State` both become `state`
    assert!(matches!(graph.add_variable("STATE"), Err(GraphError::NameCollision { .. })));
    assert!(graph.variable_id("foo_bar").is_err());

    let err = graph
        .add_kernel(
            "mix",
            Program::passthrough("State"),
            "State",
            &["State", "fooBar"],
            ParamSet::new().with("pointerUv", [0.0, 0.0]).with("pointer_uv", [1.0, 1.0]),
        )
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::NameCollision {
            name: "pointer_uv".into(),
            existing: "pointerUv".into(),
        }
    );
    assert!(err.is_configuration());

    let err = graph
        .add_kernel(
            "scaled",
            Program::passthrough("State"),
            "State",
            &["State"],
            ParamSet::new().with("Resolution", 1.0),
        )
        .unwrap_err();
    assert!(matches!(err, GraphError::NameCollision { existing, .. } if existing == "resolution"));
    assert!(graph.kernel_id("mix").is_err());
    assert!(graph.kernel_id("scaled").is_err());
}

#[test]
fn test_bad_seeds_are_rejected() {
    let mut graph = copy_graph(4, 4);
    let mut seeds = SeedMap::new();
    seeds.insert("Ghost".into(), graph.dims().zeroed());
    assert_eq!(
        graph.initialize(seeds),
        Err(GraphError::UnknownVariable("Ghost".into()))
    );

    let mut seeds = SeedMap::new();
    seeds.insert("State".into(), GridDims::new(2, 2).unwrap().zeroed());
    assert!(matches!(
        graph.initialize(seeds),
        Err(GraphError::SeedLength { actual: 16, expected: 64, .. })
    ));
    assert_eq!(graph.phase(), GraphPhase::Building);
    assert_eq!(graph.backend().texture_count(), 0);
}

#[test]
fn test_missing_cpu_program_releases_textures() {
    let mut graph = copy_graph(2, 2);
    graph
        .add_kernel(
            "gpu_only",
            Program::new("gpu_only").with_wgsl("fn shade() {}"),
            "State",
            &[],
            ParamSet::new(),
        )
        .unwrap();
    let err = graph.initialize(SeedMap::new()).unwrap_err();
    assert!(matches!(err, GraphError::UnsupportedProgram { .. }));
    assert!(err.is_configuration());
    assert_eq!(graph.backend().texture_count(), 0);
    assert_eq!(graph.phase(), GraphPhase::Building);
}

// ============================================================================
// Readiness errors
// ============================================================================

#[test]
fn test_lifecycle_is_enforced() {
    let mut graph = copy_graph(2, 2);
    let copy = graph.kernel_id("copy").unwrap();
    let state = graph.variable_id("State").unwrap();

    assert_eq!(graph.execute(copy), Err(GraphError::NotInitialized));
    assert_eq!(graph.current_state(state), Err(GraphError::NotInitialized));

    graph.initialize(SeedMap::new()).unwrap();
    assert_eq!(graph.initialize(SeedMap::new()), Err(GraphError::AlreadyInitialized));
    assert_eq!(graph.add_variable("Late"), Err(GraphError::GraphSealed("Late".into())));
    assert_eq!(graph.backend().texture_count(), 2);

    graph.teardown();
    graph.teardown();
    assert_eq!(graph.phase(), GraphPhase::TornDown);
    assert_eq!(graph.backend().texture_count(), 0);
    assert_eq!(graph.execute(copy), Err(GraphError::TornDown));
    assert_eq!(graph.read_state(state), Err(GraphError::TornDown));
    assert!(graph.execute(copy).unwrap_err().is_readiness());
}

/// CPU backend whose passes and allocations can be made to fail on demand.
struct FlakyBackend {
    inner: CpuBackend,
    fail_next: bool,
    allocations_left: usize,
}

impl FlakyBackend {
    fn new() -> Self {
        Self {
            inner: CpuBackend::new(),
            fail_next: false,
            allocations_left: usize::MAX,
        }
    }
}

impl Backend for FlakyBackend {
    type Compiled = CpuKernel;

    fn name(&self) -> &'static str {
        "flaky"
    }

    fn create_texture(&mut self, dims: GridDims, wrap: WrapMode, data: &[f32]) -> gpgpu::GraphResult<TextureId> {
        if self.allocations_left == 0 {
            return Err(GraphError::Backend("out of memory".into()));
        }
        self.allocations_left -= 1;
        self.inner.create_texture(dims, wrap, data)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> gpgpu::GraphResult<()> {
        self.inner.write_texture(texture, data)
    }

    fn read_texture(&mut self, texture: TextureId) -> gpgpu::GraphResult<Vec<f32>> {
        self.inner.read_texture(texture)
    }

    fn release_texture(&mut self, texture: TextureId) -> gpgpu::GraphResult<()> {
        self.inner.release_texture(texture)
    }

    fn compile(&mut self, program: &Program, layout: &PassLayout<'_>) -> gpgpu::GraphResult<CpuKernel> {
        self.inner.compile(program, layout)
    }

    fn run_pass(
        &mut self,
        compiled: &CpuKernel,
        inputs: &[TextureId],
        params: &ParamSet,
        target: TextureId,
    ) -> gpgpu::GraphResult<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(GraphError::Backend("device lost".into()));
        }
        self.inner.run_pass(compiled, inputs, params, target)
    }
}

#[test]
fn test_failed_execute_keeps_current_index() {
    let dims = GridDims::new(2, 2).unwrap();
    let mut graph = ComputeGraph::new(dims, FlakyBackend::new());
    graph.add_variable("State").unwrap();
    let copy = graph
        .add_kernel("copy", Program::passthrough("State"), "State", &["State"], ParamSet::new())
        .unwrap();
    graph.initialize(SeedMap::new()).unwrap();
    let state = graph.variable_id("State").unwrap();

    graph.execute(copy).unwrap();
    let committed = graph.current_state(state).unwrap();

    graph.backend_mut().fail_next = true;
    assert!(matches!(graph.execute(copy), Err(GraphError::Backend(_))));
    assert_eq!(graph.current_state(state).unwrap(), committed);
    assert_eq!(graph.variable(state).unwrap().current_index(), 1);

    graph.execute(copy).unwrap();
    assert_eq!(graph.variable(state).unwrap().current_index(), 0);
}

#[test]
fn test_failed_allocation_releases_partial_pair() {
    let dims = GridDims::new(2, 2).unwrap();
    let mut graph = ComputeGraph::new(dims, FlakyBackend::new());
    graph.add_variable("A").unwrap();
    graph.add_variable("B").unwrap();
    // B gets its front buffer, then its back buffer fails
    graph.backend_mut().allocations_left = 3;

    let err = graph.initialize(SeedMap::new()).unwrap_err();
    assert_eq!(err, GraphError::Backend("out of memory".into()));
    assert_eq!(graph.phase(), GraphPhase::Building);
    assert_eq!(graph.backend().inner.texture_count(), 0);

    graph.backend_mut().allocations_left = usize::MAX;
    graph.initialize(SeedMap::new()).unwrap();
    assert_eq!(graph.backend().inner.texture_count(), 4);
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_parameter_updates() {
    let dims = GridDims::new(1, 1).unwrap();
    let mut graph = ComputeGraph::new(dims, CpuBackend::new());
    graph.add_variable("A").unwrap();
    graph.add_variable("B").unwrap();
    let ka = graph
        .add_kernel(
            "write_a",
            Program::new("write_a").with_cpu_fn(|frag| [frag.scalar("timestep"); 4]),
            "A",
            &[],
            ParamSet::new().with("timestep", 0.1).with("pointer_uv", [0.0, 0.0]),
        )
        .unwrap();
    let kb = graph
        .add_kernel(
            "write_b",
            Program::new("write_b").with_cpu_fn(|frag| [frag.scalar("timestep"); 4]),
            "B",
            &[],
            ParamSet::new().with("timestep", 0.1),
        )
        .unwrap();

    graph.set_parameter(ka, "pointer_uv", [0.5, 0.25]).unwrap();
    assert_eq!(graph.parameter(ka, "pointer_uv"), Some(ParamValue::Vec2([0.5, 0.25])));

    assert!(matches!(
        graph.set_parameter(kb, "pointer_uv", [0.5, 0.25]),
        Err(GraphError::UnknownParameter { .. })
    ));
    assert_eq!(
        graph.set_parameter(ka, "timestep", [1.0, 2.0]),
        Err(GraphError::ParameterType {
            kernel: "write_a".into(),
            name: "timestep".into(),
            expected: "scalar",
            actual: "vec2",
        })
    );

    assert_eq!(graph.broadcast_parameter("timestep", 2.0).unwrap(), 2);
    assert_eq!(graph.broadcast_parameter("missing", 2.0).unwrap(), 0);
    assert!(graph.broadcast_parameter("timestep", [1.0, 1.0, 1.0]).is_err());
    assert_eq!(graph.parameter(kb, "timestep"), Some(ParamValue::Scalar(2.0)));

    graph.initialize(SeedMap::new()).unwrap();
    graph.execute(kb).unwrap();
    let b = graph.variable_id("B").unwrap();
    assert_eq!(graph.read_state(b).unwrap(), vec![2.0; 4]);
    assert_eq!(graph.read_state(graph.variable_id("A").unwrap()).unwrap(), vec![0.0; 4]);
}
