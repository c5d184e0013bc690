//! CPU reference backend.
//!
//! Each pass evaluates the kernel's [`CellProgram`] for every cell, one row per
//! rayon task. The write target is moved out of the slab for the duration of
//! the pass so it can be mutated while inputs are borrowed.

use std::sync::Arc;

use rayon::prelude::*;

use crate::backend::{Backend, PassLayout, TextureId, TextureSlab};
use crate::error::{GraphError, GraphResult};
use crate::grid::{GridDims, WrapMode};
use crate::params::ParamSet;
use crate::program::{CellProgram, Fragment, Program, Sampler};

struct CpuTexture {
    dims: GridDims,
    wrap: WrapMode,
    texels: Vec<[f32; 4]>,
}

/// A kernel ready to run on the CPU.
pub struct CpuKernel {
    label: String,
    program: Arc<dyn CellProgram>,
    dims: GridDims,
}

#[derive(Default)]
pub struct CpuBackend {
    textures: TextureSlab<CpuTexture>,
    passes: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures currently allocated.
    pub fn texture_count(&self) -> usize {
        self.textures.live_count()
    }

    /// Total passes run since creation.
    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    fn evaluate(
        &self,
        kernel: &CpuKernel,
        inputs: &[TextureId],
        params: &ParamSet,
        out: &mut CpuTexture,
    ) -> GraphResult<()> {
        if out.dims != kernel.dims {
            return Err(GraphError::Backend(format!(
                "kernel `{}` compiled for {:?}, target is {:?}",
                kernel.label, kernel.dims, out.dims
            )));
        }
        let samplers = inputs
            .iter()
            .map(|&id| {
                self.textures
                    .get(id)
                    .map(|tex| Sampler::new(&tex.texels, tex.dims, tex.wrap))
            })
            .collect::<GraphResult<Vec<_>>>()?;

        let dims = out.dims;
        let width = dims.width() as usize;
        let program = kernel.program.as_ref();
        out.texels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    let frag = Fragment {
                        x: x as u32,
                        y: y as u32,
                        dims,
                        inputs: &samplers,
                        params,
                    };
                    *cell = program.shade(&frag);
                }
            });
        Ok(())
    }
}

impl Backend for CpuBackend {
    type Compiled = CpuKernel;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_texture(&mut self, dims: GridDims, wrap: WrapMode, data: &[f32]) -> GraphResult<TextureId> {
        let seed = dims.seed(data.to_vec())?;
        Ok(self.textures.insert(CpuTexture {
            dims,
            wrap,
            texels: seed.texels().to_vec(),
        }))
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> GraphResult<()> {
        let tex = self.textures.get_mut(texture)?;
        let seed = tex.dims.seed(data.to_vec())?;
        tex.texels.copy_from_slice(seed.texels());
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> GraphResult<Vec<f32>> {
        let tex = self.textures.get(texture)?;
        Ok(bytemuck::cast_slice(&tex.texels).to_vec())
    }

    fn release_texture(&mut self, texture: TextureId) -> GraphResult<()> {
        self.textures.remove(texture).map(drop)
    }

    fn compile(&mut self, program: &Program, layout: &PassLayout<'_>) -> GraphResult<CpuKernel> {
        let cpu = program.cpu.clone().ok_or_else(|| GraphError::UnsupportedProgram {
            kernel: layout.kernel.to_string(),
            backend: self.name(),
        })?;
        Ok(CpuKernel {
            label: layout.kernel.to_string(),
            program: cpu,
            dims: layout.dims,
        })
    }

    fn run_pass(
        &mut self,
        compiled: &CpuKernel,
        inputs: &[TextureId],
        params: &ParamSet,
        target: TextureId,
    ) -> GraphResult<()> {
        let mut out = self.textures.take(target)?;
        let result = self.evaluate(compiled, inputs, params, &mut out);
        self.textures.restore(target, out);
        if result.is_ok() {
            self.passes += 1;
        }
        result
    }
}
