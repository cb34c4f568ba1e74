//! Rotating triangle demo
//!
//! Draws one vertex-colored triangle from a render thread. Q and E change the spin,
//! Alt+Enter toggles fullscreen, Escape quits. Settings are read from `triangle.toml`
//! in the working directory when present.

use spin_engine::foundation::logging;
use spin_engine::prelude::*;
use std::process::ExitCode;

const CONFIG_PATH: &str = "triangle.toml";

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("PANIC: {panic_info}");
        eprintln!("PANIC: {panic_info}");
    }));

    let config = match ApplicationConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            logging::init_with_level("info");
            log::error!("Failed to load {CONFIG_PATH}: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_with_level(&config.engine.log_level);
    log::info!("Starting {}", config.renderer.application_name);

    match Application::new(config).and_then(Application::run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
