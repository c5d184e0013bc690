//! Blocking texture readback for state variables.
//!
//! Copies an `Rgba32Float` texture into a staging buffer with rows padded to
//! `COPY_BYTES_PER_ROW_ALIGNMENT`, maps it, and strips the padding.

use std::sync::mpsc;

use gpgpu::GridDims;

use super::{await_buffer_map, GpuContext, GpuError};

/// Bytes per texel of an `Rgba32Float` texture.
pub const TEXEL_BYTES: u32 = 16;

/// Row pitch of the staging buffer for a texture `width` texels wide.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * TEXEL_BYTES;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// A single staging buffer sized for one texture.
struct StagingBuffer {
    buffer: wgpu::Buffer,
    padded_bpr: u32,
}

impl StagingBuffer {
    fn new(device: &wgpu::Device, dims: GridDims) -> Self {
        let padded_bpr = padded_bytes_per_row(dims.width());
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("State Readback Staging"),
                size: padded_bpr as u64 * dims.height() as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            padded_bpr,
        }
    }

    fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture, dims: GridDims) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bpr),
                    rows_per_image: Some(dims.height()),
                },
            },
            extent(dims),
        );
    }

    fn map_blocking(&self, device: &wgpu::Device) -> Result<(), GpuError> {
        let (tx, rx) = mpsc::channel();
        self.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        device.poll(wgpu::Maintain::Wait);
        await_buffer_map(rx)
    }

    fn read_rows(&self, dims: GridDims) -> Vec<f32> {
        let row_bytes = (dims.width() * TEXEL_BYTES) as usize;
        let mut out = Vec::with_capacity(dims.seed_len());
        {
            let data = self.buffer.slice(..).get_mapped_range();
            for row in data.chunks_exact(self.padded_bpr as usize) {
                out.extend_from_slice(bytemuck::cast_slice::<u8, f32>(&row[..row_bytes]));
            }
        }
        self.buffer.unmap();
        out
    }
}

pub fn extent(dims: GridDims) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dims.width(),
        height: dims.height(),
        depth_or_array_layers: 1,
    }
}

/// Reads the full texture back as flat RGBA floats, blocking on the device.
pub fn read_texture(ctx: &GpuContext, texture: &wgpu::Texture, dims: GridDims) -> Result<Vec<f32>, GpuError> {
    let staging = StagingBuffer::new(&ctx.device, dims);
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("State Readback Encoder"),
        });
    staging.copy_from(&mut encoder, texture, dims);
    ctx.queue.submit(Some(encoder.finish()));
    staging.map_blocking(&ctx.device)?;
    Ok(staging.read_rows(dims))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(16), 256);
        assert_eq!(padded_bytes_per_row(17), 512);
        assert_eq!(padded_bytes_per_row(1024), 16384);
    }
}
