//! Double-buffered compute graph for grid and particle simulations.
//!
//! State lives in 2D four-channel float textures ("variables"). A kernel reads
//! the current buffer of zero or more variables plus a set of named parameters
//! and writes the other buffer of exactly one variable, which is then
//! committed. Kernels run in whatever order the caller issues them.
//!
//! Two backends implement [`Backend`]: the [`CpuBackend`] here, which runs
//! Rust [`CellProgram`]s with rayon, and a wgpu backend in the `sandbox` crate
//! which runs WGSL bodies.

pub mod backend;
pub mod cpu;
pub mod error;
pub mod graph;
pub mod grid;
pub mod kernel;
pub mod naming;
pub mod params;
pub mod program;
pub mod variable;

pub use backend::{Backend, InputDecl, PassLayout, TextureId, TextureSlab};
pub use cpu::{CpuBackend, CpuKernel};
pub use error::{GraphError, GraphResult};
pub use graph::{ComputeGraph, GraphPhase, SeedMap};
pub use grid::{GridDims, Seed, WrapMode, CHANNELS};
pub use kernel::{Kernel, KernelId};
pub use params::{ParamSet, ParamValue};
pub use program::{CellProgram, Fragment, Program, Sampler};
pub use variable::{StateBuffer, VariableId};
