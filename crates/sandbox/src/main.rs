//! Headless sandbox runner.
//!
//! Usage: `sandbox [config.json]`. Runs the configured scenario for a fixed
//! number of frames and logs diagnostics. Set `RUST_LOG=info` for output.

use std::path::PathBuf;
use std::process::ExitCode;

use gpgpu::{Backend, CpuBackend, SeedMap};
use sandbox::gpu::GpuBackend;
use sandbox::{BackendKind, SandboxConfig, Simulation};

fn run<B: Backend>(backend: B, config: &SandboxConfig) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Running {} on {} backend", config.scenario.name(), backend.name());
    let mut sim = Simulation::new(backend, &config.scenario)?;
    sim.start(SeedMap::new())?;

    let mut elapsed = 0.0;
    for frame in 1..=config.frames {
        elapsed += config.frame_dt;
        sim.tick(elapsed)?;
        if config.log_every > 0 && frame % config.log_every == 0 {
            log::info!("frame {}: {}", frame, sim.diagnostics()?);
        }
    }
    log::info!("final: {}", sim.diagnostics()?);
    sim.destroy();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match SandboxConfig::load_json(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => SandboxConfig::default(),
    };

    let result = match config.backend {
        BackendKind::Cpu => run(CpuBackend::new(), &config),
        BackendKind::Gpu => match GpuBackend::headless() {
            Ok(gpu) => run(gpu, &config),
            Err(e) => {
                log::warn!("GPU unavailable ({}), falling back to CPU", e);
                run(CpuBackend::new(), &config)
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Simulation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
