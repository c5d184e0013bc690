//! Double-buffered state variables.

use crate::backend::TextureId;
use crate::error::{GraphError, GraphResult};
use crate::grid::WrapMode;

/// Typed handle to a variable registered in a [`crate::ComputeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub(crate) u32);

impl VariableId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Two same-format textures plus the index of the one holding committed state.
#[derive(Clone, Debug)]
pub struct StateBuffer {
    name: String,
    wrap: WrapMode,
    textures: Option<[TextureId; 2]>,
    current: usize,
}

impl StateBuffer {
    pub fn new(name: impl Into<String>, wrap: WrapMode) -> Self {
        Self {
            name: name.into(),
            wrap,
            textures: None,
            current: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wrap(&self) -> WrapMode {
        self.wrap
    }

    pub fn is_allocated(&self) -> bool {
        self.textures.is_some()
    }

    /// Buffer holding the latest committed state.
    pub fn read(&self) -> GraphResult<TextureId> {
        let textures = self.textures.ok_or(GraphError::NotInitialized)?;
        Ok(textures[self.current])
    }

    /// Buffer the next pass targeting this variable writes into.
    pub fn write_target(&self) -> GraphResult<TextureId> {
        let textures = self.textures.ok_or(GraphError::NotInitialized)?;
        Ok(textures[self.current ^ 1])
    }

    /// Same buffer as [`StateBuffer::write_target`], named for read-back.
    pub fn alternate(&self) -> GraphResult<TextureId> {
        self.write_target()
    }

    /// Makes the last written buffer current.
    pub fn commit(&mut self) {
        self.current ^= 1;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub(crate) fn attach(&mut self, textures: [TextureId; 2]) {
        self.textures = Some(textures);
        self.current = 0;
    }

    pub(crate) fn detach(&mut self) -> Option<[TextureId; 2]> {
        self.current = 0;
        self.textures.take()
    }
}
