//! Process-wide shutdown.
//!
//! Every handle opened with [`crate::Database::open`] lives in the global
//! [`Registry`]. [`finalize`] drains it: each handle aborts its active
//! transactions and closes its environment, then the exit listeners run.
//! Applications call it before exiting, or let [`install_signal_handler`]
//! do it on SIGINT/SIGTERM.

use crate::error::CoreResult;
use crate::registry::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Exit status used after a termination signal drained the registry.
pub const SIGNAL_EXIT_CODE: i32 = 130;

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Closes every database handle still open in the process, then runs the
/// exit listeners. Returns the number of handles closed.
///
/// Only the first call does any work; later opens fail with `ShuttingDown`.
pub fn finalize() -> usize {
    Registry::global().drain_all()
}

/// Registers a listener to run after [`finalize`] has closed every handle.
pub fn on_exit<F>(listener: F)
where
    F: FnOnce() + Send + 'static,
{
    Registry::global().on_exit(listener);
}

/// Installs a SIGINT/SIGTERM handler that finalizes the process and exits
/// with [`SIGNAL_EXIT_CODE`].
///
/// Installing more than once is a no-op.
///
/// # Errors
///
/// Returns `Signal` if another handler is already installed through
/// `ctrlc`, or the system call fails.
pub fn install_signal_handler() -> CoreResult<()> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let installed = ctrlc::set_handler(|| {
        let closed = finalize();
        info!(closed, "termination signal received, exiting");
        std::process::exit(SIGNAL_EXIT_CODE);
    });
    if let Err(e) = installed {
        HANDLER_INSTALLED.store(false, Ordering::SeqCst);
        return Err(e.into());
    }
    Ok(())
}
