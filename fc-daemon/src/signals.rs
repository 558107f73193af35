//! Termination signal handling
//!
//! Handlers only raise [`SHUTDOWN`]. The control loop notices it after its
//! next sleep and runs the restore sequence outside signal context.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set once a termination signal has arrived
pub static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Catch SIGINT, SIGTERM, SIGHUP and SIGQUIT
pub fn install_termination_handlers() -> anyhow::Result<()> {
    // ctrlc runs this on its own thread, not in the signal handler itself
    ctrlc::set_handler(|| SHUTDOWN.store(true, Ordering::SeqCst))?;
    install_quit_handler()
}

extern "C" fn on_quit(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// ctrlc does not cover SIGQUIT
pub fn install_quit_handler() -> anyhow::Result<()> {
    let handler = on_quit as extern "C" fn(libc::c_int);
    // SAFETY: on_quit only performs an atomic store, which is async-signal-safe.
    let previous = unsafe { libc::signal(libc::SIGQUIT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        anyhow::bail!("failed to install SIGQUIT handler: {}", std::io::Error::last_os_error());
    }
    Ok(())
}
