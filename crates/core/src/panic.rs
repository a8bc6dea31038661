//! Capturing panics raised by request handlers.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// What the hook saw: the rendered message and the backtrace at the panic.
struct PanicSite {
    message: String,
    stack: String,
}

/// Install a process-wide panic hook that remembers the backtrace of the
/// latest panic on each thread, then defers to the previous hook.
///
/// Call once at startup, before serving. The hook captures a backtrace on
/// every panic in the process regardless of `RUST_BACKTRACE`. Without it,
/// recovered panics carry the backtrace of the recovery site instead of the
/// panic site. Idempotent.
pub fn install_backtrace_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let site = PanicSite {
                message: info.payload_as_str().unwrap_or("Box<dyn Any>").to_string(),
                stack: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

/// A recovered panic, ready to be attached to a log entry.
#[derive(Debug, Clone)]
pub struct CapturedPanic {
    pub message: String,
    pub stack: String,
}

impl CapturedPanic {
    /// Must be called on the thread that caught the panic.
    ///
    /// The hook's backtrace is used only if it was recorded for this
    /// payload; a payload re-raised with `resume_unwind` never passes the
    /// hook and gets a backtrace of the recovery site.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload_message(payload.as_ref());
        let stack = LAST_PANIC
            .with(|slot| slot.borrow_mut().take())
            .filter(|site| site.message == message)
            .map(|site| site.stack)
            .unwrap_or_else(|| Backtrace::force_capture().to_string());
        Self { message, stack }
    }
}

/// Backtrace recorded for the latest panic on this thread, left in place
/// for a later [`CapturedPanic::from_payload`].
pub fn last_backtrace() -> Option<String> {
    LAST_PANIC.with(|slot| slot.borrow().as_ref().map(|site| site.stack.clone()))
}

/// Forget the backtrace of a panic that was caught and will not be captured.
pub fn clear_backtrace() {
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
}

/// Render a panic payload. `panic!` produces `&str` or `String`; anything
/// else is opaque.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
