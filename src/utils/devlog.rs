//! Developer logging ("level 6") with a thread-local capture sink.
//! Store bookkeeping emits one JSON line per eviction round through `dev6!`; tests
//! enable the sink to assert on those lines without installing a global logger.

use std::cell::RefCell;

/// Log target for developer lines.
pub const DEV6_TARGET: &str = "adaptcache::dev6";

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables the thread-local sink on drop.
pub struct DevSinkGuard;

impl Drop for DevSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enable capture for the current thread.
pub fn enable_thread_sink() -> DevSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    DevSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain captured lines for the current thread. Empty when capture is off.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Emit a developer log line: captured by the thread sink when enabled, and routed to
/// the global logger at TRACE on the `adaptcache::dev6` target.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::utils::devlog::write_str(&__s);
        log::log!(target: $crate::utils::devlog::DEV6_TARGET, log::Level::Trace, "{}", __s);
    }};
}
