//! Panic payload classification and panic-site stack capture.
//!
//! A handler that wants to abandon a request because the client went away
//! calls [`abort()`]. It unwinds with an [`AbortHandler`] payload, which the
//! recovery logger recognises: it logs at debug level and lets the unwind
//! continue so the server drops the connection. Every other payload is a bug
//! and is logged at error level with the stack of the panic site.
//!
//! By the time `catch_unwind` hands over a payload the panicking frames are
//! gone, so the stack is captured earlier, in a panic hook, and parked in a
//! thread-local. The recovery reads it back on the same thread within the
//! same poll. The slot is cleared before every poll of the guarded future,
//! so a stack left over from a panic caught elsewhere on the thread is never
//! reported. Unwinds that skip the hook (`resume_unwind`, or a replaced
//! hook) fall back to the stack of the recovery site.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::sync::Once;

/// Panic payload meaning "the client aborted; drop the connection".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AbortHandler;

impl fmt::Display for AbortHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("vigil: abort handler")
    }
}

/// Abandons the current request by unwinding with [`AbortHandler`].
pub fn abort() -> ! {
    panic::panic_any(AbortHandler)
}

/// What a caught unwind turned out to be.
pub(crate) enum Caught {
    Abort(Box<dyn Any + Send>),
    Failure { value: String, stack: String },
}

impl Caught {
    pub(crate) fn classify(payload: Box<dyn Any + Send>) -> Self {
        if payload.is::<AbortHandler>() {
            return Self::Abort(payload);
        }
        Self::Failure {
            value: describe(payload.as_ref()),
            stack: take_stack().unwrap_or_else(|| Backtrace::force_capture().to_string()),
        }
    }
}

/// Renders a panic payload the way `panic!` callers usually mean it.
pub(crate) fn describe(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if payload.is::<AbortHandler>() {
        AbortHandler.to_string()
    } else {
        "<non-string panic payload>".to_owned()
    }
}

// ── Stack capture ─────────────────────────────────────────────────────────────

thread_local! {
    static LAST_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the stack-capturing panic hook, once per process.
///
/// The previous hook still runs for ordinary panics. Abort panics are
/// silent: they are expected, and the recovery logger reports them.
pub(crate) fn install_stack_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().is::<AbortHandler>() {
                return;
            }
            let stack = Backtrace::force_capture().to_string();
            LAST_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

fn take_stack() -> Option<String> {
    LAST_STACK.with(|slot| slot.borrow_mut().take())
}

/// Forgets any stack parked on this thread.
pub(crate) fn clear_stack() {
    take_stack();
}
