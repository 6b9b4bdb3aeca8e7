//! alertd - detection alerting HTTP daemon
//!
//! This daemon:
//! 1. Loads engine policy from config file + environment
//! 2. Registers detector backends and warms up the configured one
//! 3. Serves the detect API (/detect, /reset, /health, /stats, /config, /classes)
//! 4. Shuts down cleanly on Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::{mpsc, Arc};

use sightguard::api::{ApiConfig, ApiServer, ServerState};
use sightguard::{AlertdConfig, BackendRegistry, Engine, StubBackend};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AlertdConfig::load()?;

    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    registry.set_default(&config.backend)?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    {
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.warm_up()?;
        log::info!(
            "backend '{}' ready with {} classes",
            guard.name(),
            guard.class_names().len()
        );
    }

    let engine = Engine::new(config.engine.clone());
    let state = Arc::new(ServerState::new(engine, Some(backend), config.rotate_portrait));
    let api_handle = ApiServer::new(
        ApiConfig {
            addr: config.addr.clone(),
        },
        state,
    )
    .spawn()?;
    log::info!("alertd listening on {}", api_handle.addr);
    log::info!(
        "confidence={} cooldown={:?} max_detections={} priority_classes={}",
        config.engine.confidence_threshold,
        config.engine.cooldown,
        config.engine.max_detections,
        config.engine.priority_classes.len()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("alertd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
