//! The compute graph: registry of variables and kernels over one backend.
//!
//! Lifecycle is `Building -> Initialized -> TornDown`. Variables and kernels
//! are declared while building; `initialize` allocates and seeds both buffers
//! of every variable and compiles every kernel. There is no scheduling: the
//! caller decides which kernel runs when.

use std::collections::HashMap;

use crate::backend::{Backend, InputDecl, PassLayout, TextureId};
use crate::error::{GraphError, GraphResult};
use crate::grid::{GridDims, Seed, WrapMode};
use crate::kernel::{Kernel, KernelId};
use crate::naming::{snake_case, validate_identifier, RESOLUTION_FIELD};
use crate::params::{ParamSet, ParamValue};
use crate::program::Program;
use crate::variable::{StateBuffer, VariableId};

/// Initial state per variable name. Variables without an entry start zeroed.
pub type SeedMap = HashMap<String, Seed>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphPhase {
    Building,
    Initialized,
    TornDown,
}

pub struct ComputeGraph<B: Backend> {
    dims: GridDims,
    backend: B,
    variables: Vec<StateBuffer>,
    variable_names: HashMap<String, VariableId>,
    kernels: Vec<Kernel<B::Compiled>>,
    kernel_names: HashMap<String, KernelId>,
    phase: GraphPhase,
}

impl<B: Backend> ComputeGraph<B> {
    pub fn new(dims: GridDims, backend: B) -> Self {
        Self {
            dims,
            backend,
            variables: Vec::new(),
            variable_names: HashMap::new(),
            kernels: Vec::new(),
            kernel_names: HashMap::new(),
            phase: GraphPhase::Building,
        }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn phase(&self) -> GraphPhase {
        self.phase
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Registers a clamp-to-edge variable.
    pub fn add_variable(&mut self, name: &str) -> GraphResult<VariableId> {
        self.add_variable_with_wrap(name, WrapMode::ClampToEdge)
    }

    pub fn add_variable_with_wrap(&mut self, name: &str, wrap: WrapMode) -> GraphResult<VariableId> {
        self.ensure_building(name)?;
        validate_identifier(name)?;
        if self.variable_names.contains_key(name) {
            return Err(GraphError::DuplicateVariable(name.to_string()));
        }
        // shader helpers are named after the snake_case form
        let snake = snake_case(name);
        if let Some(existing) = self.variable_names.keys().find(|other| snake_case(other) == snake) {
            return Err(GraphError::NameCollision {
                name: name.to_string(),
                existing: existing.clone(),
            });
        }
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(StateBuffer::new(name, wrap));
        self.variable_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Registers a kernel writing `output` and reading `inputs` in slot order.
    pub fn add_kernel(
        &mut self,
        name: &str,
        program: Program,
        output: &str,
        inputs: &[&str],
        params: ParamSet,
    ) -> GraphResult<KernelId> {
        self.ensure_building(name)?;
        validate_identifier(name)?;
        if self.kernel_names.contains_key(name) {
            return Err(GraphError::DuplicateKernel(name.to_string()));
        }
        let mut fields: Vec<(String, &str)> = vec![(RESOLUTION_FIELD.to_string(), RESOLUTION_FIELD)];
        for (param, _) in params.iter() {
            validate_identifier(param)?;
            let snake = snake_case(param);
            if let Some((_, existing)) = fields.iter().find(|(field, _)| *field == snake) {
                return Err(GraphError::NameCollision {
                    name: param.to_string(),
                    existing: existing.to_string(),
                });
            }
            fields.push((snake, param));
        }
        let output = self.variable_id(output)?;
        let inputs = inputs
            .iter()
            .map(|input| self.variable_id(input))
            .collect::<GraphResult<Vec<_>>>()?;

        let id = KernelId(self.kernels.len() as u32);
        self.kernels.push(Kernel {
            name: name.to_string(),
            program,
            output,
            inputs,
            params,
            compiled: None,
        });
        self.kernel_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn variable_id(&self, name: &str) -> GraphResult<VariableId> {
        self.variable_names
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownVariable(name.to_string()))
    }

    pub fn kernel_id(&self, name: &str) -> GraphResult<KernelId> {
        self.kernel_names
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownKernel(name.to_string()))
    }

    pub fn variable(&self, id: VariableId) -> GraphResult<&StateBuffer> {
        self.variables
            .get(id.index())
            .ok_or_else(|| GraphError::UnknownVariable(format!("#{}", id.0)))
    }

    pub fn kernel(&self, id: KernelId) -> GraphResult<&Kernel<B::Compiled>> {
        self.kernels
            .get(id.index())
            .ok_or_else(|| GraphError::UnknownKernel(format!("#{}", id.0)))
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &StateBuffer)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VariableId(i as u32), v))
    }

    /// Allocates and seeds both buffers of every variable, then compiles
    /// every kernel. On failure everything allocated so far is released and
    /// the graph stays in `Building`.
    pub fn initialize(&mut self, seeds: SeedMap) -> GraphResult<()> {
        match self.phase {
            GraphPhase::Building => {}
            GraphPhase::Initialized => return Err(GraphError::AlreadyInitialized),
            GraphPhase::TornDown => return Err(GraphError::TornDown),
        }
        let mut names: Vec<&String> = seeds.keys().collect();
        names.sort();
        for name in names {
            self.variable_id(name)?;
        }
        for seed in seeds.values() {
            self.check_seed(seed)?;
        }

        if let Err(err) = self.allocate(&seeds).and_then(|_| self.compile_all()) {
            self.release_all();
            return Err(err);
        }
        self.phase = GraphPhase::Initialized;
        log::info!(
            "compute graph initialized on {}: {}x{} grid, {} variables, {} kernels, {} seeded",
            self.backend.name(),
            self.dims.width(),
            self.dims.height(),
            self.variables.len(),
            self.kernels.len(),
            seeds.len()
        );
        Ok(())
    }

    fn allocate(&mut self, seeds: &SeedMap) -> GraphResult<()> {
        let zeroed = self.dims.zeroed();
        for buffer in &mut self.variables {
            let data = seeds.get(buffer.name()).unwrap_or(&zeroed).as_slice();
            let front = self.backend.create_texture(self.dims, buffer.wrap(), data)?;
            let back = match self.backend.create_texture(self.dims, buffer.wrap(), data) {
                Ok(back) => back,
                Err(err) => {
                    if let Err(release) = self.backend.release_texture(front) {
                        log::warn!("failed to release {:?} of `{}`: {}", front, buffer.name(), release);
                    }
                    return Err(err);
                }
            };
            buffer.attach([front, back]);
        }
        Ok(())
    }

    fn compile_all(&mut self) -> GraphResult<()> {
        for kernel in &mut self.kernels {
            let inputs = kernel
                .inputs
                .iter()
                .map(|id| {
                    let buffer = &self.variables[id.index()];
                    InputDecl {
                        name: buffer.name().to_string(),
                        wrap: buffer.wrap(),
                    }
                })
                .collect();
            let layout = PassLayout {
                kernel: &kernel.name,
                inputs,
                params: &kernel.params,
                dims: self.dims,
            };
            let compiled = self.backend.compile(&kernel.program, &layout)?;
            kernel.compiled = Some(compiled);
        }
        Ok(())
    }

    fn release_all(&mut self) {
        for kernel in &mut self.kernels {
            if let Some(compiled) = kernel.compiled.take() {
                self.backend.release_program(compiled);
            }
        }
        for buffer in &mut self.variables {
            if let Some(textures) = buffer.detach() {
                for texture in textures {
                    if let Err(err) = self.backend.release_texture(texture) {
                        log::warn!("failed to release {:?} of `{}`: {}", texture, buffer.name(), err);
                    }
                }
            }
        }
    }

    /// Runs one pass of `kernel` and commits its output.
    ///
    /// Inputs are bound to their current buffers on every call. The output's
    /// current index only flips if the pass succeeds.
    pub fn execute(&mut self, kernel: KernelId) -> GraphResult<()> {
        self.ensure_ready()?;
        let entry = self
            .kernels
            .get(kernel.index())
            .ok_or_else(|| GraphError::UnknownKernel(format!("#{}", kernel.0)))?;
        let compiled = entry.compiled.as_ref().ok_or(GraphError::NotInitialized)?;
        let inputs = entry
            .inputs
            .iter()
            .map(|id| self.variables[id.index()].read())
            .collect::<GraphResult<Vec<TextureId>>>()?;
        let output = &mut self.variables[entry.output.index()];
        let target = output.write_target()?;

        self.backend.run_pass(compiled, &inputs, &entry.params, target)?;
        output.commit();
        log::debug!(
            "executed `{}` -> `{}` (current {})",
            entry.name,
            output.name(),
            output.current_index()
        );
        Ok(())
    }

    pub fn execute_named(&mut self, kernel: &str) -> GraphResult<()> {
        let id = self.kernel_id(kernel)?;
        self.execute(id)
    }

    /// Executes `sequence` in order, stopping at the first failure.
    pub fn execute_sequence(&mut self, sequence: &[KernelId]) -> GraphResult<()> {
        for &kernel in sequence {
            self.execute(kernel)?;
        }
        Ok(())
    }

    /// Buffer holding the latest committed state of `variable`.
    ///
    /// The handle changes on every commit and must be fetched again after
    /// each execute that targets the variable.
    pub fn current_state(&self, variable: VariableId) -> GraphResult<TextureId> {
        self.ensure_ready()?;
        self.variable(variable)?.read()
    }

    /// Reads back the committed state as flat RGBA floats.
    pub fn read_state(&mut self, variable: VariableId) -> GraphResult<Vec<f32>> {
        let texture = self.current_state(variable)?;
        self.backend.read_texture(texture)
    }

    /// Reads back the non-current buffer.
    pub fn read_alternate(&mut self, variable: VariableId) -> GraphResult<Vec<f32>> {
        self.ensure_ready()?;
        let texture = self.variable(variable)?.alternate()?;
        self.backend.read_texture(texture)
    }

    pub fn parameter(&self, kernel: KernelId, name: &str) -> Option<ParamValue> {
        self.kernels.get(kernel.index())?.params.get(name).copied()
    }

    /// Updates one parameter of one kernel. The name must already be
    /// declared and the value must keep its kind.
    pub fn set_parameter(&mut self, kernel: KernelId, name: &str, value: impl Into<ParamValue>) -> GraphResult<()> {
        if self.phase == GraphPhase::TornDown {
            return Err(GraphError::TornDown);
        }
        let value = value.into();
        let entry = self
            .kernels
            .get_mut(kernel.index())
            .ok_or_else(|| GraphError::UnknownKernel(format!("#{}", kernel.0)))?;
        let slot = entry
            .params
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownParameter {
                kernel: entry.name.clone(),
                name: name.to_string(),
            })?;
        if !slot.same_kind(&value) {
            return Err(GraphError::ParameterType {
                kernel: entry.name.clone(),
                name: name.to_string(),
                expected: slot.kind_name(),
                actual: value.kind_name(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Sets `name` on every kernel that declares it and returns how many
    /// kernels were updated. Nothing is written if any kind mismatches.
    pub fn broadcast_parameter(&mut self, name: &str, value: impl Into<ParamValue>) -> GraphResult<usize> {
        if self.phase == GraphPhase::TornDown {
            return Err(GraphError::TornDown);
        }
        let value = value.into();
        for kernel in &self.kernels {
            if let Some(current) = kernel.params.get(name) {
                if !current.same_kind(&value) {
                    return Err(GraphError::ParameterType {
                        kernel: kernel.name.clone(),
                        name: name.to_string(),
                        expected: current.kind_name(),
                        actual: value.kind_name(),
                    });
                }
            }
        }
        let mut updated = 0;
        for kernel in &mut self.kernels {
            if let Some(slot) = kernel.params.get_mut(name) {
                *slot = value;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Overwrites both buffers of `variable` with `seed`.
    pub fn reseed(&mut self, variable: VariableId, seed: &Seed) -> GraphResult<()> {
        self.ensure_ready()?;
        self.check_seed(seed)?;
        let buffer = self.variable(variable)?;
        let front = buffer.read()?;
        let back = buffer.alternate()?;
        self.backend.write_texture(front, seed.as_slice())?;
        self.backend.write_texture(back, seed.as_slice())
    }

    /// Releases every texture and compiled program. Repeated calls are no-ops;
    /// every other operation fails afterwards.
    pub fn teardown(&mut self) {
        if self.phase == GraphPhase::TornDown {
            return;
        }
        self.release_all();
        self.phase = GraphPhase::TornDown;
        log::info!("compute graph torn down");
    }

    fn check_seed(&self, seed: &Seed) -> GraphResult<()> {
        if seed.dims() != self.dims {
            return Err(GraphError::SeedLength {
                actual: seed.as_slice().len(),
                expected: self.dims.seed_len(),
                width: self.dims.width(),
                height: self.dims.height(),
            });
        }
        Ok(())
    }

    fn ensure_building(&self, name: &str) -> GraphResult<()> {
        match self.phase {
            GraphPhase::Building => Ok(()),
            GraphPhase::Initialized => Err(GraphError::GraphSealed(name.to_string())),
            GraphPhase::TornDown => Err(GraphError::TornDown),
        }
    }

    fn ensure_ready(&self) -> GraphResult<()> {
        match self.phase {
            GraphPhase::Initialized => Ok(()),
            GraphPhase::Building => Err(GraphError::NotInitialized),
            GraphPhase::TornDown => Err(GraphError::TornDown),
        }
    }
}
