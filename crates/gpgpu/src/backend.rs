//! Backend abstraction: texture storage plus per-cell pass execution.
//!
//! A backend owns every texture it allocates; the graph only ever holds
//! [`TextureId`] handles. `release_texture` frees the slot and later
//! allocations recycle it, so a released handle is only reported as stale
//! until its index is handed out again. Callers drop handles on release.

use crate::error::{GraphError, GraphResult};
use crate::grid::{GridDims, WrapMode};
use crate::params::ParamSet;
use crate::program::Program;

/// Opaque handle to a backend-resident texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

impl TextureId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One input slot of a kernel as seen by the backend compiler.
#[derive(Clone, Debug, PartialEq)]
pub struct InputDecl {
    pub name: String,
    pub wrap: WrapMode,
}

/// Everything a backend needs to compile a kernel program.
#[derive(Clone, Debug)]
pub struct PassLayout<'a> {
    pub kernel: &'a str,
    pub inputs: Vec<InputDecl>,
    pub params: &'a ParamSet,
    pub dims: GridDims,
}

/// Storage and execution backend for a [`crate::ComputeGraph`].
pub trait Backend {
    /// Backend-specific compiled form of a [`Program`].
    type Compiled;

    /// Short identifier used in error messages.
    fn name(&self) -> &'static str;

    /// Allocates a texture and fills it with `data` (`dims.seed_len()` floats).
    fn create_texture(&mut self, dims: GridDims, wrap: WrapMode, data: &[f32]) -> GraphResult<TextureId>;

    /// Overwrites the full contents of a texture.
    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> GraphResult<()>;

    /// Reads a texture back as a flat RGBA `Vec<f32>`.
    fn read_texture(&mut self, texture: TextureId) -> GraphResult<Vec<f32>>;

    fn release_texture(&mut self, texture: TextureId) -> GraphResult<()>;

    fn compile(&mut self, program: &Program, layout: &PassLayout<'_>) -> GraphResult<Self::Compiled>;

    /// Evaluates `compiled` over every cell of `target`.
    ///
    /// `inputs[i]` is bound to slot `i`. `target` is never one of `inputs`.
    /// On error the target contents are unspecified but the handle stays valid.
    fn run_pass(
        &mut self,
        compiled: &Self::Compiled,
        inputs: &[TextureId],
        params: &ParamSet,
        target: TextureId,
    ) -> GraphResult<()>;

    fn release_program(&mut self, _compiled: Self::Compiled) {}
}

enum Slot<T> {
    Live(T),
    Borrowed,
    Free,
}

/// Slot storage for backend textures.
///
/// `take`/`restore` lets a pass move the write target out while inputs stay
/// borrowed from the slab, so a target can never alias an input.
pub struct TextureSlab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Default for TextureSlab<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> TextureSlab<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> TextureId {
        if let Some(index) = self.free.pop() {
            self.slots[index] = Slot::Live(value);
            return TextureId(index as u32);
        }
        self.slots.push(Slot::Live(value));
        TextureId((self.slots.len() - 1) as u32)
    }

    pub fn get(&self, id: TextureId) -> GraphResult<&T> {
        match self.slots.get(id.index()) {
            Some(Slot::Live(value)) => Ok(value),
            _ => Err(GraphError::StaleTexture(id)),
        }
    }

    pub fn get_mut(&mut self, id: TextureId) -> GraphResult<&mut T> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Live(value)) => Ok(value),
            _ => Err(GraphError::StaleTexture(id)),
        }
    }

    /// Moves a live texture out, leaving the slot reserved.
    pub fn take(&mut self, id: TextureId) -> GraphResult<T> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(GraphError::StaleTexture(id))?;
        match std::mem::replace(slot, Slot::Borrowed) {
            Slot::Live(value) => Ok(value),
            other => {
                *slot = other;
                Err(GraphError::StaleTexture(id))
            }
        }
    }

    /// Returns a texture previously moved out with [`TextureSlab::take`].
    pub fn restore(&mut self, id: TextureId, value: T) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if matches!(slot, Slot::Borrowed) {
                *slot = Slot::Live(value);
            }
        }
    }

    pub fn remove(&mut self, id: TextureId) -> GraphResult<T> {
        let value = self.take(id)?;
        self.slots[id.index()] = Slot::Free;
        self.free.push(id.index());
        Ok(value)
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot, Slot::Free))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_take_restore() {
        let mut slab = TextureSlab::new();
        let a = slab.insert(1);
        let b = slab.insert(2);
        assert_eq!(slab.live_count(), 2);

        let value = slab.take(a).unwrap();
        assert_eq!(value, 1);
        assert_eq!(slab.get(a), Err(GraphError::StaleTexture(a)));
        assert_eq!(slab.take(a), Err(GraphError::StaleTexture(a)));
        assert_eq!(*slab.get(b).unwrap(), 2);

        slab.restore(a, 10);
        assert_eq!(*slab.get(a).unwrap(), 10);
    }

    #[test]
    fn test_slab_reuses_freed_slots() {
        let mut slab = TextureSlab::new();
        let a = slab.insert("a");
        slab.insert("b");
        assert_eq!(slab.remove(a).unwrap(), "a");
        assert_eq!(slab.live_count(), 1);
        assert!(slab.remove(a).is_err());
        assert_eq!(slab.get(a), Err(GraphError::StaleTexture(a)));

        // recycled index: the old handle now resolves to the new texture
        let c = slab.insert("c");
        assert_eq!(c, a);
        assert_eq!(*slab.get(a).unwrap(), "c");
        assert_eq!(slab.live_count(), 2);
    }
}
