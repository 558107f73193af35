//! fancontrol daemon
//!
//! Drives PWM fan outputs from temperature sensors according to a
//! pwmconfig-style configuration file.
//!
//! # Usage
//! `fancontrol [CONFIG]` where `CONFIG` defaults to `/etc/fancontrol`.
//!
//! # Exit codes
//! - 0 after a termination signal (SIGINT, SIGTERM, SIGHUP, SIGQUIT)
//! - 1 on any configuration, path, lock or hardware error

mod fan_control;
mod signals;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use fc_core::constants::paths;
use fc_core::{
    fixup_legacy_paths, load_config, verify_attributes, ControlLoop, LifecycleManager, PathResolver,
    PidLock, RootKind, SysfsStore,
};
use fc_error::FancontrolError;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Startup helpers
// ============================================================================

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
        eprintln!("Fans may be left under manual control, verify they run at full speed");
    }));
}

/// Journal when available, stdout otherwise. Returns whether the journal is used.
fn init_logging(log_level: &str) -> bool {
    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

/// The single optional argument, if it names an existing file
fn config_path(arg: Option<String>) -> PathBuf {
    match arg {
        Some(arg) if Path::new(&arg).exists() => PathBuf::from(arg),
        Some(arg) => {
            warn!("{} does not exist, using {}", arg, paths::CONFIG_FILE);
            PathBuf::from(paths::CONFIG_FILE)
        }
        None => PathBuf::from(paths::CONFIG_FILE),
    }
}

// ============================================================================
// Main sequence
// ============================================================================

/// Everything up to process exit. Errors before the fans are enabled never
/// touch hardware, so they are returned instead of going through restore.
fn run(arg: Option<String>) -> anyhow::Result<i32> {
    let (config, hints) = load_config(&config_path(arg))?;

    let root = PathResolver::new().resolve_root(&config)?;
    let store = SysfsStore::new(&root.dir);

    let config = if root.kind == RootKind::HwmonClass {
        fixup_legacy_paths(&config, &hints, &store)
    } else {
        config
    };
    verify_attributes(&config, &store)?;

    let lock = PidLock::default();
    lock.ensure_absent()?;
    lock.acquire()?;

    let mut lifecycle = LifecycleManager::new(&config, &store, lock);

    if let Err(e) = signals::install_termination_handlers().context("installing signal handlers") {
        error!("{:#}", e);
        return Ok(lifecycle.restore(1));
    }

    if let Err(e) = lifecycle.enable_all() {
        error!("{}", e);
        return Ok(lifecycle.restore(e.exit_code()));
    }

    let control = ControlLoop::new(&config, &store);
    Ok(fan_control::run_control_loop(
        &mut lifecycle,
        &control,
        &signals::SHUTDOWN,
        Duration::from_secs(config.interval()),
    ))
}

fn main() {
    install_panic_hook();

    let log_level = std::env::var("FANCONTROL_LOG").unwrap_or_else(|_| "info".to_string());
    let use_journald = init_logging(&log_level);
    info!("fancontrol {} starting", VERSION);
    info!("Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    let code = match run(std::env::args().nth(1)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            e.downcast_ref::<FancontrolError>()
                .map(FancontrolError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}
