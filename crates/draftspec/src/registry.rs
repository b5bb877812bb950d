//! Body-key registry — the bridge between compiled `.dspec` manifests and the
//! Rust closures that actually run. A manifest's `it "does X" body = "pkg::does_x"`
//! line resolves `"pkg::does_x"` against this process-global table at link time
//! (see [`crate::host::compiler`]).
//!
//! Grounded on the teacher's thread-local `BUILDER` in `context.rs`, but global
//! and `OnceLock`-backed rather than thread-local: body keys are registered once
//! at host startup (typically via [`register_body!`]) and looked up from
//! whichever thread the runner's pipeline happens to execute on.

use crate::tree::HookFn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

fn table() -> &'static RwLock<HashMap<String, HookFn>> {
    static TABLE: OnceLock<RwLock<HashMap<String, HookFn>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Serializes tests that mutate the global registry via `clear`/`register`.
/// cargo's test harness runs every test in this crate (library `#[cfg(test)]`
/// modules and `tests/*.rs` integration binaries alike) concurrently by
/// default, and the registry is process-global state — two tests racing a
/// `clear()` against another's `register()` produces flaky "no body
/// registered for key" failures with no code defect behind them. Every test
/// that touches the registry should hold this guard for its duration:
///
/// ```ignore
/// let _guard = registry::lock();
/// registry::clear();
/// ```
///
/// Poison-tolerant: a prior test panicking while holding the lock must not
/// cascade into every later registry test failing too.
pub fn lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    match LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Registers `body` under `key`. Re-registering the same key overwrites the
/// previous entry, which is useful for test setup that rebuilds a registry
/// per-case but otherwise a likely sign of two bodies accidentally sharing a key.
pub fn register(key: impl Into<String>, body: impl Fn() + Send + Sync + 'static) {
    table()
        .write()
        .expect("draftspec: body registry lock poisoned")
        .insert(key.into(), Arc::new(body));
}

/// Looks up a previously registered body by key.
pub fn resolve(key: &str) -> Option<HookFn> {
    table()
        .read()
        .expect("draftspec: body registry lock poisoned")
        .get(key)
        .cloned()
}

/// True if `key` has a registered body — used by the compiler to report
/// unresolved body keys as a single batch of diagnostics rather than failing
/// one manifest line at a time.
pub fn contains(key: &str) -> bool {
    table()
        .read()
        .expect("draftspec: body registry lock poisoned")
        .contains_key(key)
}

/// Removes every registered body. Intended for test isolation between cases
/// that each populate their own registry; a long-running host process should
/// never need to call this.
pub fn clear() {
    table()
        .write()
        .expect("draftspec: body registry lock poisoned")
        .clear();
}

/// Registers a free function or closure under a string key.
///
/// ```ignore
/// draftspec::register_body!("calculator::adds", || assert_eq!(2 + 2, 4));
/// ```
#[macro_export]
macro_rules! register_body {
    ($key:expr, $body:expr) => {
        $crate::registry::register($key, $body)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve_round_trips() {
        let _guard = lock();
        clear();
        register("t::body", || {});
        assert!(contains("t::body"));
        assert!(resolve("t::body").is_some());
        assert!(resolve("missing::body").is_none());
    }
}
