//! Kernel declarations.

use crate::params::ParamSet;
use crate::program::Program;
use crate::variable::VariableId;

/// Typed handle to a kernel registered in a [`crate::ComputeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub(crate) u32);

impl KernelId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A full-grid pass: reads `inputs` (current buffers), writes `output`.
pub struct Kernel<C> {
    pub(crate) name: String,
    pub(crate) program: Program,
    pub(crate) output: VariableId,
    pub(crate) inputs: Vec<VariableId>,
    pub(crate) params: ParamSet,
    pub(crate) compiled: Option<C>,
}

impl<C> Kernel<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn output(&self) -> VariableId {
        self.output
    }

    pub fn inputs(&self) -> &[VariableId] {
        &self.inputs
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }
}
