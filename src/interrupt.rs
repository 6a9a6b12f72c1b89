//! Ctrl-C to [`CancelFlag`] bridge.
//!
//! The signal handler can't capture state, so the flag it sets is parked
//! here. Nothing else reads it; the frame loop sees only the flag it was
//! handed.

use std::io;
use std::sync::OnceLock;

use crate::controller::CancelFlag;

static INTERRUPT: OnceLock<CancelFlag> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_sigint(_signal: nix::libc::c_int) {
    if let Some(flag) = INTERRUPT.get() {
        flag.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Route SIGINT to `flag`. Only the first installed flag is used.
#[cfg(unix)]
pub fn install(flag: &CancelFlag) -> io::Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    if INTERRUPT.set(flag.clone()).is_err() {
        return Ok(());
    }
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // The handler only performs an atomic store.
    unsafe { sigaction(Signal::SIGINT, &action) }.map_err(io::Error::from)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install(flag: &CancelFlag) -> io::Result<()> {
    let _ = INTERRUPT.set(flag.clone());
    Ok(())
}
