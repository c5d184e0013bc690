//! Simulation sandbox on top of the `gpgpu` compute graph.
//!
//! - `gpu`: wgpu backend (storage-texture compute passes, readback)
//! - `scenarios`: heat diffusion, boids and N-body wiring
//! - `driver`: per-scenario lifecycle and frame loop
//! - `display`, `pointer`: renderer-facing bindings and pointer input
//! - `config`: JSON run configuration

pub mod config;
pub mod display;
pub mod driver;
pub mod gpu;
pub mod pointer;
pub mod scenarios;

pub use config::{BackendKind, ConfigError, SandboxConfig};
pub use driver::{Diagnostics, DriverError, DriverResult, DriverState, FrameInput, Simulation};
pub use scenarios::ScenarioConfig;
