pub mod backend;
pub mod prelude;
pub mod readback;

pub use backend::{GpuBackend, GpuKernel};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gpgpu::GraphError;

/// Global flag indicating GPU device was lost
static GPU_DEVICE_LOST: AtomicBool = AtomicBool::new(false);

/// Check if the GPU device has been lost
pub fn is_device_lost() -> bool {
    GPU_DEVICE_LOST.load(Ordering::SeqCst)
}

/// Reset the device lost flag (call after recreating device)
pub fn reset_device_lost() {
    GPU_DEVICE_LOST.store(false, Ordering::SeqCst);
}

/// GPU error type for device setup and buffer operations
#[derive(Debug)]
pub enum GpuError {
    NoAdapter,
    RequestDevice(wgpu::RequestDeviceError),
    DeviceLost,
    BufferMapFailed(wgpu::BufferAsyncError),
    ChannelDisconnected,
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No GPU adapter available"),
            GpuError::RequestDevice(e) => write!(f, "Device request failed: {}", e),
            GpuError::DeviceLost => write!(f, "GPU device lost"),
            GpuError::BufferMapFailed(e) => write!(f, "Buffer map failed: {:?}", e),
            GpuError::ChannelDisconnected => write!(f, "Channel disconnected"),
        }
    }
}

impl std::error::Error for GpuError {}

impl From<GpuError> for GraphError {
    fn from(err: GpuError) -> Self {
        GraphError::Backend(err.to_string())
    }
}

/// Wait for a buffer map operation to complete, returning Result instead of panicking.
pub fn await_buffer_map(
    rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    if is_device_lost() {
        return Err(GpuError::DeviceLost);
    }
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {:?}", e);
            Err(GpuError::BufferMapFailed(e))
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
            Err(GpuError::ChannelDisconnected)
        }
    }
}

/// Headless device and queue shared by the compute backend.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Blocking adapter + device request without a surface.
    pub fn new_headless() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Sandbox Compute Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(GpuError::RequestDevice)?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {:?}", error);
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
            }
        }));

        reset_device_lost();

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }
}
