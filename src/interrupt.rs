// src/interrupt.rs

//! Interruption handling
//!
//! Ctrl-C is honored between package operations but must not fire while
//! the target root is being mutated: a half-removed or half-installed
//! package is worse than a slow exit. Two mechanisms cooperate:
//!
//! - A process-wide SIGINT/SIGTERM handler records the signal in a flag;
//!   drivers poll [`pending`] between packages and unwind normally, which
//!   runs the scratch-directory cleanup.
//! - [`CriticalSection`] blocks delivery entirely for the duration of a
//!   filesystem mutation, restoring the previous mask on drop.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn note_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT/SIGTERM handler. Called once at startup.
pub fn install_handler() {
    let action = SigAction::new(
        SigHandler::Handler(note_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // Safety: the handler only stores to an atomic flag.
        if let Err(e) = unsafe { signal::sigaction(sig, &action) } {
            warn!("failed to install {} handler: {}", sig, e);
        }
    }
}

/// Whether an interrupt arrived since startup.
pub fn pending() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Guard that blocks SIGINT/SIGTERM delivery until dropped.
///
/// Wrap the incremental-install copy and the manifest-ordered removal in
/// one of these; everything else stays interruptible.
pub struct CriticalSection {
    previous: Option<SigSet>,
}

impl CriticalSection {
    pub fn enter() -> Self {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGINT);
        mask.add(Signal::SIGTERM);

        let mut previous = SigSet::empty();
        match signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&mask), Some(&mut previous)) {
            Ok(()) => Self {
                previous: Some(previous),
            },
            Err(e) => {
                // Unsupported platform: run unmasked; re-install idempotence
                // covers recovery from a mid-copy cancellation.
                warn!("failed to block signals: {}", e);
                Self { previous: None }
            }
        }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) =
                signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous), None)
            {
                warn!("failed to restore signal mask: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_section_restores_mask() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _guard = CriticalSection::enter();
            let during = SigSet::thread_get_mask().unwrap();
            assert!(during.contains(Signal::SIGINT));
            assert!(during.contains(Signal::SIGTERM));
        }
        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            after.contains(Signal::SIGINT),
            before.contains(Signal::SIGINT)
        );
    }
}
