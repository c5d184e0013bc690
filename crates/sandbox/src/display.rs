//! Display binding: maps committed state textures to rendering inputs.
//!
//! The renderer itself lives outside this crate. Each frame it receives a
//! [`DisplayFrame`] listing, per display slot, the variable and the texture
//! that currently holds its committed state, plus the uniforms it needs to
//! draw a colormapped grid or a point cloud.

use bytemuck::{Pod, Zeroable};
use gpgpu::{Backend, ComputeGraph, GraphResult, GridDims, TextureId, VariableId};
use serde::{Deserialize, Serialize};

/// Colour ramps, in the order the grid shader indexes them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    #[default]
    Turbo,
    Viridis,
    Inferno,
    Fire,
    Bipolar,
    Seismic,
}

impl Colormap {
    pub const ALL: [Colormap; 6] = [
        Colormap::Turbo,
        Colormap::Viridis,
        Colormap::Inferno,
        Colormap::Fire,
        Colormap::Bipolar,
        Colormap::Seismic,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColormapSettings {
    pub vmin: f32,
    pub vmax: f32,
    pub map: Colormap,
    pub reverse: bool,
}

impl Default for ColormapSettings {
    fn default() -> Self {
        Self {
            vmin: 0.0,
            vmax: 1.0,
            map: Colormap::Turbo,
            reverse: false,
        }
    }
}

impl ColormapSettings {
    /// Maps `value` to `[0, 1]` the way the grid shader does.
    pub fn normalize(&self, value: f32) -> f32 {
        let span = self.vmax - self.vmin;
        let t = if span != 0.0 { (value - self.vmin) / span } else { 0.0 };
        let t = t.clamp(0.0, 1.0);
        if self.reverse {
            1.0 - t
        } else {
            t
        }
    }

    pub fn uniforms(&self) -> ColormapUniforms {
        ColormapUniforms {
            vmin: self.vmin,
            vmax: self.vmax,
            map: self.map.index(),
            reverse: self.reverse as u32,
        }
    }
}

/// Uniform block for the grid colormap shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ColormapUniforms {
    pub vmin: f32,
    pub vmax: f32,
    pub map: u32,
    pub reverse: u32,
}

/// Point-cloud draw inputs for particle variables.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleLayout {
    pub count: usize,
    /// Texel-centre uv per particle, two floats each.
    pub uvs: Vec<f32>,
    pub point_size: f32,
    pub texture_size: [u32; 2],
}

impl ParticleLayout {
    pub fn new(dims: GridDims, count: usize, point_size: f32) -> GraphResult<Self> {
        let uvs = dims.build_attribute(count, 2, |_, _, i| dims.texel_uv(i).to_vec())?;
        Ok(Self {
            count,
            uvs,
            point_size,
            texture_size: [dims.width(), dims.height()],
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DisplayLayout {
    /// Colormapped plane of width `2 * w / h` and height 2.
    Grid {
        colormap: ColormapSettings,
        plane_size: [f32; 2],
    },
    Particles(ParticleLayout),
}

/// Declared by a scenario: what to show and how.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplaySpec {
    pub label: String,
    pub variable: VariableId,
    pub kind: DisplayKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DisplayKind {
    Grid(ColormapSettings),
    Particles { count: usize, point_size: f32 },
}

impl DisplaySpec {
    pub fn grid(label: &str, variable: VariableId, colormap: ColormapSettings) -> Self {
        Self {
            label: label.to_string(),
            variable,
            kind: DisplayKind::Grid(colormap),
        }
    }

    pub fn particles(label: &str, variable: VariableId, count: usize, point_size: f32) -> Self {
        Self {
            label: label.to_string(),
            variable,
            kind: DisplayKind::Particles { count, point_size },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisplayBinding {
    pub label: String,
    pub variable: VariableId,
    pub texture: TextureId,
}

/// Everything the renderer needs for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayFrame {
    pub bindings: Vec<DisplayBinding>,
    pub elapsed: f32,
}

impl DisplayFrame {
    pub fn binding(&self, label: &str) -> Option<&DisplayBinding> {
        self.bindings.iter().find(|b| b.label == label)
    }
}

struct DisplaySlot {
    label: String,
    variable: VariableId,
    layout: DisplayLayout,
}

#[derive(Default)]
pub struct DisplayBinder {
    slots: Vec<DisplaySlot>,
    last_frame: Option<DisplayFrame>,
}

impl DisplayBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a display slot; layouts are precomputed from the grid.
    pub fn add_display_variable(&mut self, dims: GridDims, spec: DisplaySpec) -> GraphResult<()> {
        let layout = match spec.kind {
            DisplayKind::Grid(colormap) => DisplayLayout::Grid {
                colormap,
                plane_size: [2.0 * dims.width() as f32 / dims.height() as f32, 2.0],
            },
            DisplayKind::Particles { count, point_size } => {
                DisplayLayout::Particles(ParticleLayout::new(dims, count, point_size)?)
            }
        };
        self.slots.push(DisplaySlot {
            label: spec.label,
            variable: spec.variable,
            layout,
        });
        Ok(())
    }

    pub fn layout(&self, label: &str) -> Option<&DisplayLayout> {
        self.slots.iter().find(|s| s.label == label).map(|s| &s.layout)
    }

    pub fn set_colormap(&mut self, label: &str, settings: ColormapSettings) -> bool {
        match self.slots.iter_mut().find(|s| s.label == label) {
            Some(DisplaySlot {
                layout: DisplayLayout::Grid { colormap, .. },
                ..
            }) => {
                *colormap = settings;
                true
            }
            _ => false,
        }
    }

    /// Re-fetches the committed texture of every slot.
    pub fn sync<B: Backend>(&mut self, graph: &ComputeGraph<B>, elapsed: f32) -> GraphResult<&DisplayFrame> {
        let bindings = self
            .slots
            .iter()
            .map(|slot| {
                graph.current_state(slot.variable).map(|texture| DisplayBinding {
                    label: slot.label.clone(),
                    variable: slot.variable,
                    texture,
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;
        Ok(self.last_frame.insert(DisplayFrame { bindings, elapsed }))
    }

    pub fn last_frame(&self) -> Option<&DisplayFrame> {
        self.last_frame.as_ref()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.last_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colormap_order_and_normalize() {
        assert_eq!(Colormap::Turbo.index(), 0);
        assert_eq!(Colormap::Seismic.index(), 5);
        assert_eq!(Colormap::ALL.len(), 6);

        let settings = ColormapSettings {
            vmin: -1.0,
            vmax: 1.0,
            map: Colormap::Bipolar,
            reverse: true,
        };
        assert_eq!(settings.normalize(0.0), 0.5);
        assert_eq!(settings.normalize(1.0), 0.0);
        assert_eq!(settings.normalize(5.0), 0.0);
        assert_eq!(settings.uniforms().map, 4);
        assert_eq!(settings.uniforms().reverse, 1);
        assert_eq!(std::mem::size_of::<ColormapUniforms>(), 16);
    }

    #[test]
    fn test_particle_uvs_follow_row_major_texels() {
        let dims = GridDims::new(4, 2).unwrap();
        let layout = ParticleLayout::new(dims, 6, 0.05).unwrap();
        assert_eq!(layout.uvs.len(), 12);
        for i in 0..6 {
            let expected = [
                ((i % 4) as f32 + 0.5) / 4.0,
                ((i / 4) as f32 + 0.5) / 2.0,
            ];
            assert_eq!(&layout.uvs[2 * i..2 * i + 2], &expected);
        }
        assert!(ParticleLayout::new(dims, 9, 0.05).is_err());
    }

    #[test]
    fn test_grid_plane_aspect_and_sync() {
        let dims = GridDims::new(200, 100).unwrap();
        let mut graph = ComputeGraph::new(dims, gpgpu::CpuBackend::new());
        let heat = graph.add_variable("Heat").unwrap();

        let mut binder = DisplayBinder::new();
        binder
            .add_display_variable(dims, DisplaySpec::grid("heat", heat, ColormapSettings::default()))
            .unwrap();
        match binder.layout("heat") {
            Some(DisplayLayout::Grid { plane_size, .. }) => assert_eq!(*plane_size, [4.0, 2.0]),
            other => panic!("unexpected layout {:?}", other),
        }
        assert!(binder.set_colormap("heat", ColormapSettings::default()));
        assert!(!binder.set_colormap("missing", ColormapSettings::default()));

        assert!(binder.sync(&graph, 0.0).is_err());
        graph.initialize(gpgpu::SeedMap::new()).unwrap();
        let frame = binder.sync(&graph, 1.5).unwrap().clone();
        assert_eq!(frame.elapsed, 1.5);
        let binding = frame.binding("heat").unwrap();
        assert_eq!(binding.variable, heat);
        assert_eq!(binding.texture, graph.current_state(heat).unwrap());
    }
}
