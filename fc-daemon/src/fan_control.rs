//! The interval loop
//!
//! Ticks every `interval` until a tick fails or termination is requested,
//! then hands over to [`LifecycleManager::restore`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use fc_core::{AttributeStore, ControlLoop, LifecycleManager};
use tracing::{error, info};

/// Granularity at which a sleeping loop notices a termination request
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Run until a fatal error or a termination request. Returns the exit code.
pub fn run_control_loop<S: AttributeStore + ?Sized>(
    lifecycle: &mut LifecycleManager<'_, S>,
    control: &ControlLoop<'_, S>,
    shutdown: &AtomicBool,
    interval: Duration,
) -> i32 {
    loop {
        if let Err(e) = control.tick() {
            error!("{}", e);
            return lifecycle.restore(e.exit_code());
        }

        sleep_unless_shutdown(interval, shutdown);
        if shutdown.load(Ordering::SeqCst) {
            info!("Termination requested");
            return lifecycle.restore(0);
        }
    }
}

/// Sleep for `duration`, waking early once `shutdown` is set.
///
/// A duration too large to represent as a deadline sleeps until `shutdown`.
fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let step = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                SHUTDOWN_POLL.min(deadline - now)
            }
            None => SHUTDOWN_POLL,
        };
        thread::sleep(step);
    }
}
