//! Reporter Bus (C7, spec.md §4.5): a five-callback observer trait, fanned out
//! to every registered reporter concurrently, with one exception-isolated
//! reporter never able to take down the run or another reporter.
//!
//! `ConsoleReporter` lifts the teacher's `runner.rs` colored tree-printing
//! (`green`/`red`/`yellow`/`bold`/`dim`, `NO_COLOR`/`IsTerminal` handling,
//! `✓`/`✗`/`-` glyphs) behind this trait — the teacher prints inline during
//! traversal with no such interface; here the same rendering is reusable and
//! composes with other reporters instead of being the only way to see output.

use crate::tree::{RunReport, SpecExecutionContext, SpecResult, Status};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::error;

/// Observes a run's lifecycle. Every method has a default no-op body so a
/// reporter only needs to implement the callbacks it cares about.
pub trait Reporter: Send + Sync {
    fn on_run_start(&self, _total_specs: usize) {}
    fn on_spec_start(&self, _ctx: &SpecExecutionContext<'_>) {}
    fn on_spec_end(&self, _result: &SpecResult) {}
    /// Delivered once per context, after every one of its direct specs has
    /// finished (spec.md §4.4/§4.5): a context's specs run as one parallel
    /// batch, and reporters see that batch's results together here rather
    /// than as a stream of individual `on_spec_end` calls racing each other.
    fn on_batch_end(&self, _results: &[SpecResult]) {}
    fn on_run_end(&self, _report: &RunReport) {}
}

/// Fans events out to every registered reporter. A panicking reporter is
/// caught and logged via `tracing::error!`, never propagated — one broken
/// reporter must not take down the run or its siblings.
#[derive(Default)]
pub struct ReporterBus {
    reporters: Vec<Box<dyn Reporter>>,
}

impl ReporterBus {
    pub fn new() -> Self {
        ReporterBus::default()
    }

    pub fn register(&mut self, reporter: impl Reporter + 'static) -> &mut Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn on_run_start(&self, total_specs: usize) {
        self.fan_out(|r| r.on_run_start(total_specs));
    }

    pub fn on_spec_start(&self, ctx: &SpecExecutionContext<'_>) {
        self.fan_out(|r| r.on_spec_start(ctx));
    }

    pub fn on_spec_end(&self, result: &SpecResult) {
        self.fan_out(|r| r.on_spec_end(result));
    }

    pub fn on_batch_end(&self, results: &[SpecResult]) {
        self.fan_out(|r| r.on_batch_end(results));
    }

    pub fn on_run_end(&self, report: &RunReport) {
        self.fan_out(|r| r.on_run_end(report));
    }

    fn fan_out(&self, f: impl Fn(&dyn Reporter) + Sync) {
        if self.reporters.len() <= 1 {
            for reporter in &self.reporters {
                guarded_call(reporter.as_ref(), &f);
            }
            return;
        }
        std::thread::scope(|scope| {
            for reporter in &self.reporters {
                let f = &f;
                scope.spawn(move || guarded_call(reporter.as_ref(), f));
            }
        });
    }
}

fn guarded_call(reporter: &dyn Reporter, f: &(impl Fn(&dyn Reporter) + Sync)) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(reporter)));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(error = %message, "reporter callback panicked");
    }
}

// ---- ConsoleReporter: colored tree output, grounded on the teacher's runner.rs ----

fn use_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn paint(code: &str, s: &str) -> String {
    if use_color() {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

fn green(s: &str) -> String {
    paint("32", s)
}
fn red(s: &str) -> String {
    paint("31", s)
}
fn yellow(s: &str) -> String {
    paint("33", s)
}
fn dim(s: &str) -> String {
    paint("2", s)
}

/// Prints a `✓`/`✗`/`-` line per spec, one context's batch at a time, plus an
/// end-of-run summary. A batch is already declaration-ordered, but batches
/// across sibling contexts still only ever print depth-first — `RunReport.results`
/// is the place to look for the canonical flattened order after the run.
pub struct ConsoleReporter {
    printed: AtomicUsize,
    lock: Mutex<()>,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        ConsoleReporter {
            printed: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for ConsoleReporter {
    fn on_run_start(&self, total_specs: usize) {
        let _guard = self.lock.lock().expect("draftspec: console reporter lock poisoned");
        println!();
        println!("{}", dim(&format!("running {total_specs} specs")));
    }

    fn on_batch_end(&self, results: &[SpecResult]) {
        let _guard = self.lock.lock().expect("draftspec: console reporter lock poisoned");
        for result in results {
            self.printed.fetch_add(1, Ordering::SeqCst);

            let glyph = match result.status {
                Status::Passed => green("✓"),
                Status::Failed => red("✗"),
                Status::Skipped => dim("-"),
                Status::Pending => yellow("-"),
            };
            let description = result.full_description();
            let line = match result.status {
                Status::Failed => red(&description),
                _ => description,
            };
            println!("  {glyph} {line}");
            if let Some(failure) = &result.failure {
                println!("    {}", red(&format!("{failure}")));
            }
        }
    }

    fn on_run_end(&self, report: &RunReport) {
        let _guard = self.lock.lock().expect("draftspec: console reporter lock poisoned");
        let elapsed = format!("{:.3}s", report.duration.as_secs_f64());
        let parts: Vec<String> = [
            (report.passed > 0).then(|| green(&format!("{} passed", report.passed))),
            (report.failed > 0).then(|| red(&format!("{} failed", report.failed))),
            (report.pending > 0).then(|| yellow(&format!("{} pending", report.pending))),
            (report.skipped > 0).then(|| dim(&format!("{} skipped", report.skipped))),
        ]
        .into_iter()
        .flatten()
        .collect();

        println!();
        if report.failed > 0 {
            println!("{}", red("FAIL"));
        } else {
            println!("{}", green("PASS"));
        }
        println!("{} ({})", parts.join(", "), dim(&elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct PanicReporter;
    impl Reporter for PanicReporter {
        fn on_run_start(&self, _total_specs: usize) {
            panic!("boom");
        }
    }

    struct FlagReporter(Arc<AtomicBool>);
    impl Reporter for FlagReporter {
        fn on_run_start(&self, _total_specs: usize) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn one_panicking_reporter_does_not_stop_others() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut bus = ReporterBus::new();
        bus.register(PanicReporter);
        bus.register(FlagReporter(flag.clone()));

        bus.on_run_start(3);

        assert!(flag.load(Ordering::SeqCst));
    }
}
