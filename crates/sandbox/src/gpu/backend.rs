//! wgpu compute backend.
//!
//! Each variable buffer is an `Rgba32Float` texture usable both as a sampled
//! input and as a storage write target. Each kernel compiles to one compute
//! pipeline with an explicit bind group layout and its own params uniform.
//! A pass rebuilds its bind group from the current input textures, dispatches
//! 8x8 workgroups over the grid and submits immediately.

use gpgpu::{Backend, GraphError, GraphResult, GridDims, ParamSet, PassLayout, Program, TextureId, TextureSlab, WrapMode};

use super::prelude::{self, WORKGROUP_SIZE};
use super::readback::{self, TEXEL_BYTES};
use super::{is_device_lost, GpuContext, GpuError};

pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    dims: GridDims,
}

/// A compiled kernel: pipeline, layout and params uniform.
pub struct GpuKernel {
    label: String,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    param_names: Vec<String>,
    input_count: usize,
    dims: GridDims,
}

impl GpuKernel {
    /// Uniform contents for one pass: resolution, then one vec4 per parameter.
    fn uniform_data(&self, params: &ParamSet) -> Vec<[f32; 4]> {
        let w = self.dims.width() as f32;
        let h = self.dims.height() as f32;
        let mut data = Vec::with_capacity(1 + self.param_names.len());
        data.push([w, h, 1.0 / w, 1.0 / h]);
        for name in &self.param_names {
            data.push(params.get(name).map(|v| v.as_vec4()).unwrap_or([0.0; 4]));
        }
        data
    }
}

pub struct GpuBackend {
    ctx: GpuContext,
    textures: TextureSlab<GpuTexture>,
}

impl GpuBackend {
    pub fn new(ctx: GpuContext) -> Self {
        Self {
            ctx,
            textures: TextureSlab::new(),
        }
    }

    /// Requests a headless device and wraps it.
    pub fn headless() -> Result<Self, GpuError> {
        Ok(Self::new(GpuContext::new_headless()?))
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Texture behind a handle, for binding by the rendering side.
    pub fn texture(&self, id: TextureId) -> GraphResult<&wgpu::Texture> {
        Ok(&self.textures.get(id)?.texture)
    }

    pub fn view(&self, id: TextureId) -> GraphResult<&wgpu::TextureView> {
        Ok(&self.textures.get(id)?.view)
    }

    fn upload(&self, tex: &GpuTexture, data: &[f32]) {
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(data),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(tex.dims.width() * TEXEL_BYTES),
                rows_per_image: Some(tex.dims.height()),
            },
            readback::extent(tex.dims),
        );
    }

    fn create_bind_group_layout(&self, label: &str, input_count: usize) -> wgpu::BindGroupLayout {
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: STATE_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ];
        for slot in 0..input_count {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: prelude::input_binding(slot),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        self.ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &entries,
            })
    }
}

impl Backend for GpuBackend {
    type Compiled = GpuKernel;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn create_texture(&mut self, dims: GridDims, _wrap: WrapMode, data: &[f32]) -> GraphResult<TextureId> {
        let seed = dims.seed(data.to_vec())?;
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("State Texture"),
            size: readback::extent(dims),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let tex = GpuTexture { texture, view, dims };
        self.upload(&tex, seed.as_slice());
        Ok(self.textures.insert(tex))
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> GraphResult<()> {
        let tex = self.textures.get(texture)?;
        let seed = tex.dims.seed(data.to_vec())?;
        self.upload(tex, seed.as_slice());
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> GraphResult<Vec<f32>> {
        let tex = self.textures.get(texture)?;
        Ok(readback::read_texture(&self.ctx, &tex.texture, tex.dims)?)
    }

    fn release_texture(&mut self, texture: TextureId) -> GraphResult<()> {
        let tex = self.textures.remove(texture)?;
        tex.texture.destroy();
        Ok(())
    }

    fn compile(&mut self, program: &Program, layout: &PassLayout<'_>) -> GraphResult<GpuKernel> {
        let body = program.wgsl.as_deref().ok_or_else(|| GraphError::UnsupportedProgram {
            kernel: layout.kernel.to_string(),
            backend: "gpu",
        })?;
        let source = prelude::assemble(layout, body);
        let device = &self.ctx.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(layout.kernel),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let bind_group_layout = self.create_bind_group_layout(layout.kernel, layout.inputs.len());
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(layout.kernel),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(layout.kernel),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            log::error!("Kernel `{}` failed to compile: {}", layout.kernel, err);
            return Err(GraphError::ProgramCompile {
                kernel: layout.kernel.to_string(),
                message: err.to_string(),
            });
        }

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params"),
            size: (prelude::param_vec4_count(layout) * std::mem::size_of::<[f32; 4]>()) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(GpuKernel {
            label: layout.kernel.to_string(),
            pipeline,
            bind_group_layout,
            params_buffer,
            param_names: layout.params.iter().map(|(name, _)| name.to_string()).collect(),
            input_count: layout.inputs.len(),
            dims: layout.dims,
        })
    }

    fn run_pass(
        &mut self,
        compiled: &GpuKernel,
        inputs: &[TextureId],
        params: &ParamSet,
        target: TextureId,
    ) -> GraphResult<()> {
        if is_device_lost() {
            return Err(GpuError::DeviceLost.into());
        }
        if inputs.len() != compiled.input_count {
            return Err(GraphError::Backend(format!(
                "kernel `{}` expects {} inputs, got {}",
                compiled.label,
                compiled.input_count,
                inputs.len()
            )));
        }
        let out = self.textures.get(target)?;
        let input_views = inputs
            .iter()
            .map(|&id| self.textures.get(id).map(|tex| &tex.view))
            .collect::<GraphResult<Vec<_>>>()?;

        let uniforms = compiled.uniform_data(params);
        self.ctx
            .queue
            .write_buffer(&compiled.params_buffer, 0, bytemuck::cast_slice(&uniforms));

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: compiled.params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&out.view),
            },
        ];
        for (slot, view) in input_views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: prelude::input_binding(slot),
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&compiled.label),
            layout: &compiled.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&compiled.label),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&compiled.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                out.dims.width().div_ceil(WORKGROUP_SIZE),
                out.dims.height().div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn release_program(&mut self, compiled: GpuKernel) {
        compiled.params_buffer.destroy();
    }
}
