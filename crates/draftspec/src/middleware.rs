//! Middleware Pipeline (C5, spec.md §4.3): a chain of `Middleware` wrapping a
//! terminal executor, each layer free to short-circuit, retry, or time out the
//! call beneath it.
//!
//! No direct teacher counterpart — `rsspec` dispatches tests by direct
//! recursive descent with no interposable layer. Shape grounded on the generic
//! middleware-stack pattern (first-registered-outermost composition around a
//! terminal handler) common across the pack's service-style crates; built-ins
//! are original to this spec but use the same trait-object-list polymorphism
//! spec.md documents and the teacher already uses for closures.

use crate::tree::{Failure, SpecExecutionContext, SpecResult, Status};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::warn;

/// One layer of the pipeline. `next` is the remainder of the chain, terminating
/// in the actual spec execution.
pub trait Middleware: Send + Sync {
    fn execute(
        &self,
        ctx: &SpecExecutionContext<'_>,
        next: &dyn Fn(&SpecExecutionContext<'_>) -> SpecResult,
    ) -> SpecResult;
}

/// Composes registered middleware around a terminal executor. Registration
/// order matters: **the first-registered middleware is outermost**, wrapping
/// everything registered after it — this is a contractual guarantee, not an
/// implementation detail, and the Timeout/Retry interaction in SPEC_FULL.md §9
/// depends on callers knowing it (register `Retry` before `Timeout` so each
/// retry attempt gets the full timeout budget).
pub struct Pipeline {
    layers: Vec<Box<dyn Middleware>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { layers: Vec::new() }
    }

    pub fn register(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.layers.push(Box::new(middleware));
        self
    }

    /// Runs `terminal` wrapped by every registered layer, outermost first.
    pub fn run(
        &self,
        ctx: &SpecExecutionContext<'_>,
        terminal: &dyn Fn(&SpecExecutionContext<'_>) -> SpecResult,
    ) -> SpecResult {
        fn chain<'a>(
            layers: &'a [Box<dyn Middleware>],
            terminal: &'a dyn Fn(&SpecExecutionContext<'_>) -> SpecResult,
        ) -> Box<dyn Fn(&SpecExecutionContext<'_>) -> SpecResult + 'a> {
            match layers.split_first() {
                None => Box::new(terminal),
                Some((head, rest)) => {
                    let inner = chain(rest, terminal);
                    Box::new(move |ctx| head.execute(ctx, &inner))
                }
            }
        }

        chain(&self.layers, terminal)(ctx)
    }
}

/// Rejects specs that don't match a predicate before they ever reach
/// beforeEach/body/afterEach — Testable Property 9 ("Filter short-circuit").
pub struct FilterMiddleware {
    predicate: Box<dyn Fn(&SpecExecutionContext<'_>) -> bool + Send + Sync>,
}

impl FilterMiddleware {
    pub fn new(predicate: impl Fn(&SpecExecutionContext<'_>) -> bool + Send + Sync + 'static) -> Self {
        FilterMiddleware {
            predicate: Box::new(predicate),
        }
    }
}

impl Middleware for FilterMiddleware {
    fn execute(
        &self,
        ctx: &SpecExecutionContext<'_>,
        next: &dyn Fn(&SpecExecutionContext<'_>) -> SpecResult,
    ) -> SpecResult {
        if (self.predicate)(ctx) {
            next(ctx)
        } else {
            SpecResult {
                description: ctx.spec.description.clone(),
                context_path: ctx.context_path.clone(),
                status: Status::Skipped,
                duration_body: Duration::ZERO,
                duration_before_each: Duration::ZERO,
                duration_after_each: Duration::ZERO,
                failure: None,
                source_file: ctx.spec.source_file.clone(),
                source_line: ctx.spec.source_line,
            }
        }
    }
}

/// Re-runs a failed spec up to `max_retries` additional times, waiting
/// `delay` between attempts.
pub struct RetryMiddleware {
    max_retries: u32,
    delay: Duration,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        RetryMiddleware { max_retries, delay }
    }
}

impl Middleware for RetryMiddleware {
    fn execute(
        &self,
        ctx: &SpecExecutionContext<'_>,
        next: &dyn Fn(&SpecExecutionContext<'_>) -> SpecResult,
    ) -> SpecResult {
        let mut attempt = 0;
        let mut duration_before_each = Duration::ZERO;
        let mut duration_body = Duration::ZERO;
        let mut duration_after_each = Duration::ZERO;

        loop {
            let result = next(ctx);
            // Preserve every attempt's durations in the accumulator rather than
            // discarding the failed attempts' timing (spec.md:87).
            duration_before_each += result.duration_before_each;
            duration_body += result.duration_body;
            duration_after_each += result.duration_after_each;

            if result.status != Status::Failed || attempt >= self.max_retries {
                return SpecResult {
                    duration_before_each,
                    duration_body,
                    duration_after_each,
                    ..result
                };
            }
            attempt += 1;
            warn!(
                spec = %ctx.full_description(),
                attempt,
                delay_ms = self.delay.as_millis(),
                "spec failed, retrying"
            );
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }
    }
}

/// Fails a spec if it runs longer than `timeout`. Cooperative: the call runs on
/// a helper thread and we stop *waiting* on it at the deadline, but the thread
/// itself keeps running to completion (Rust gives no safe way to forcibly kill
/// a thread) — matches spec.md §5's explicit "timeouts are cooperative" note.
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        TimeoutMiddleware { timeout }
    }
}

impl Middleware for TimeoutMiddleware {
    fn execute(
        &self,
        ctx: &SpecExecutionContext<'_>,
        next: &dyn Fn(&SpecExecutionContext<'_>) -> SpecResult,
    ) -> SpecResult {
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let result = next(ctx);
                let _ = tx.send(result);
            });

            match rx.recv_timeout(self.timeout) {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancelled.store(true, Ordering::SeqCst);
                    SpecResult {
                        description: ctx.spec.description.clone(),
                        context_path: ctx.context_path.clone(),
                        status: Status::Failed,
                        duration_body: start.elapsed(),
                        duration_before_each: Duration::ZERO,
                        duration_after_each: Duration::ZERO,
                        failure: Some(Failure::Timeout {
                            after_ms: self.timeout.as_millis() as u64,
                        }),
                        source_file: ctx.spec.source_file.clone(),
                        source_line: ctx.spec.source_line,
                    }
                }
            }
        })
    }
}
