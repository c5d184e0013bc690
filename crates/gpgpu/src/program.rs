//! Kernel programs and the per-cell evaluation context.
//!
//! A [`Program`] carries up to two renditions of the same kernel: a Rust
//! [`CellProgram`] for the CPU backend and a WGSL `shade` body for the GPU
//! backend. Either side only sees the bound inputs, the parameters, and the
//! cell coordinate with the grid resolution.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};

use crate::grid::{GridDims, WrapMode};
use crate::naming::snake_case;
use crate::params::ParamSet;

/// Per-cell kernel body for the CPU backend.
pub trait CellProgram: Send + Sync {
    fn shade(&self, frag: &Fragment<'_>) -> [f32; 4];
}

impl<F> CellProgram for F
where
    F: Fn(&Fragment<'_>) -> [f32; 4] + Send + Sync,
{
    fn shade(&self, frag: &Fragment<'_>) -> [f32; 4] {
        self(frag)
    }
}

/// Read-only view of one bound input texture.
#[derive(Clone, Copy)]
pub struct Sampler<'a> {
    texels: &'a [[f32; 4]],
    dims: GridDims,
    wrap: WrapMode,
}

impl<'a> Sampler<'a> {
    pub fn new(texels: &'a [[f32; 4]], dims: GridDims, wrap: WrapMode) -> Self {
        Self { texels, dims, wrap }
    }

    /// Integer texel load; out-of-range coordinates follow the wrap mode.
    pub fn load(&self, x: i32, y: i32) -> Vec4 {
        let x = self.wrap.resolve(x, self.dims.width());
        let y = self.wrap.resolve(y, self.dims.height());
        Vec4::from_array(self.texels[self.dims.index(x, y)])
    }

    /// Nearest-neighbour sample at normalized `uv`.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let x = (uv.x * self.dims.width() as f32).floor() as i32;
        let y = (uv.y * self.dims.height() as f32).floor() as i32;
        self.load(x, y)
    }

    /// Load by linear row-major index, used by particle kernels.
    pub fn texel(&self, index: usize) -> Vec4 {
        Vec4::from_array(self.texels[index])
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }
}

/// Evaluation context for a single output cell.
pub struct Fragment<'a> {
    pub x: u32,
    pub y: u32,
    pub dims: GridDims,
    pub inputs: &'a [Sampler<'a>],
    pub params: &'a ParamSet,
}

impl<'a> Fragment<'a> {
    pub fn coord(&self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }

    pub fn index(&self) -> usize {
        self.dims.index(self.x, self.y)
    }

    /// Texel-centre uv of this cell.
    pub fn uv(&self) -> Vec2 {
        Vec2::new(
            (self.x as f32 + 0.5) / self.dims.width() as f32,
            (self.y as f32 + 0.5) / self.dims.height() as f32,
        )
    }

    pub fn resolution(&self) -> Vec2 {
        Vec2::new(self.dims.width() as f32, self.dims.height() as f32)
    }

    /// Input bound to `slot`, in kernel declaration order.
    pub fn input(&self, slot: usize) -> &Sampler<'a> {
        &self.inputs[slot]
    }

    pub fn scalar(&self, name: &str) -> f32 {
        self.params.scalar(name)
    }

    pub fn vec2(&self, name: &str) -> Vec2 {
        self.params.vec2(name)
    }

    pub fn vec3(&self, name: &str) -> Vec3 {
        self.params.vec3(name)
    }
}

/// A kernel body in one or both backend languages.
#[derive(Clone, Default)]
pub struct Program {
    pub label: String,
    pub cpu: Option<Arc<dyn CellProgram>>,
    pub wgsl: Option<Cow<'static, str>>,
}

impl Program {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_cpu(mut self, program: impl CellProgram + 'static) -> Self {
        self.cpu = Some(Arc::new(program));
        self
    }

    /// Closure form of [`Program::with_cpu`].
    pub fn with_cpu_fn<F>(self, shade: F) -> Self
    where
        F: for<'f, 'i> Fn(&'f Fragment<'i>) -> [f32; 4] + Send + Sync + 'static,
    {
        self.with_cpu(shade)
    }

    /// Sets the WGSL body. It must define
    /// `fn shade(coord: vec2<i32>, uv: vec2<f32>) -> vec4<f32>`.
    pub fn with_wgsl(mut self, body: impl Into<Cow<'static, str>>) -> Self {
        self.wgsl = Some(body.into());
        self
    }

    /// Copies input slot 0 unchanged.
    pub fn passthrough(variable: &str) -> Self {
        let body = format!(
            "fn shade(coord: vec2<i32>, uv: vec2<f32>) -> vec4<f32> {{\n    return load_{}(coord);\n}}\n",
            snake_case(variable)
        );
        Self::new("copy")
            .with_cpu_fn(|frag| {
                let (x, y) = frag.coord();
                frag.input(0).load(x, y).to_array()
            })
            .with_wgsl(body)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("label", &self.label)
            .field("cpu", &self.cpu.is_some())
            .field("wgsl", &self.wgsl.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_wraps_and_samples_nearest() {
        let dims = GridDims::new(2, 2).unwrap();
        let texels = [[0.0; 4], [1.0; 4], [2.0; 4], [3.0; 4]];
        let clamp = Sampler::new(&texels, dims, WrapMode::ClampToEdge);
        assert_eq!(clamp.load(-3, 5).x, 2.0);
        assert_eq!(clamp.sample(Vec2::new(0.9, 0.1)).x, 1.0);

        let repeat = Sampler::new(&texels, dims, WrapMode::Repeat);
        assert_eq!(repeat.load(-1, 0).x, 1.0);
        assert_eq!(repeat.texel(3).w, 3.0);
    }

    #[test]
    fn test_passthrough_body_names_variable_helper() {
        let program = Program::passthrough("PositionsMasses");
        assert!(program.cpu.is_some());
        assert!(program.wgsl.unwrap().contains("load_positions_masses(coord)"));
    }
}
