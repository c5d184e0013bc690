//! Error taxonomy for graph construction and execution.
//!
//! Configuration errors (bad names, unregistered variables, malformed seeds)
//! surface at construction time and abort scenario setup. Readiness errors
//! (executing before `initialize` or after `teardown`) are programmer errors
//! and fail fast. Numerical problems are never detected here.

use thiserror::Error;

use crate::backend::TextureId;

/// Convenience alias used throughout the crate.
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("grid dimensions must be non-zero (got {width} x {height})")]
    EmptyGrid { width: u32, height: u32 },

    #[error("invalid name `{0}`: expected ASCII letters, digits or '_' without a leading digit")]
    InvalidName(String),

    #[error("variable `{0}` is already registered")]
    DuplicateVariable(String),

    #[error("`{name}` collides with `{existing}` once converted to snake_case")]
    NameCollision { name: String, existing: String },

    #[error("kernel `{0}` is already registered")]
    DuplicateKernel(String),

    #[error("variable not found: {0}")]
    UnknownVariable(String),

    #[error("kernel not found: {0}")]
    UnknownKernel(String),

    #[error("invalid data length ({actual}) for texture size {width} x {height} (expected {expected})")]
    SeedLength {
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
    },

    #[error("attribute builder must return length {expected} (got {actual} for element {index})")]
    AttributeLength {
        expected: usize,
        actual: usize,
        index: usize,
    },

    #[error("{count} elements do not fit a {width} x {height} grid")]
    GridTooSmall { count: usize, width: u32, height: u32 },

    #[error("kernel `{kernel}` has no parameter `{name}`")]
    UnknownParameter { kernel: String, name: String },

    #[error("parameter `{name}` of kernel `{kernel}` is a {expected}, cannot assign a {actual}")]
    ParameterType {
        kernel: String,
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("kernel `{kernel}` has no program for the {backend} backend")]
    UnsupportedProgram {
        kernel: String,
        backend: &'static str,
    },

    #[error("kernel `{kernel}` failed to compile: {message}")]
    ProgramCompile { kernel: String, message: String },

    #[error("graph is initialized, `{0}` can no longer be registered")]
    GraphSealed(String),

    #[error("graph has not been initialized")]
    NotInitialized,

    #[error("graph is already initialized")]
    AlreadyInitialized,

    #[error("graph has been torn down")]
    TornDown,

    #[error("texture {0:?} is not resident")]
    StaleTexture(TextureId),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl GraphError {
    /// True for errors caused by how the graph was declared or seeded.
    pub fn is_configuration(&self) -> bool {
        !self.is_readiness() && !matches!(self, GraphError::Backend(_) | GraphError::StaleTexture(_))
    }

    /// True for errors caused by calling an operation in the wrong phase.
    pub fn is_readiness(&self) -> bool {
        matches!(
            self,
            GraphError::NotInitialized | GraphError::AlreadyInitialized | GraphError::TornDown
        )
    }
}
