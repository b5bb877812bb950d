//! Spec Runner (C6, spec.md §4.4/§4.6): traversal, focus/skip/pending
//! pre-check, bounded-parallel execution scoped one context at a time with
//! deterministic result ordering, a bail switch, external cancellation, and
//! the terminal three-phase executor.
//!
//! The terminal executor (`beforeEach` chain → body → `afterEach` chain,
//! independently timed, `afterEach` always runs) directly generalizes the
//! teacher's `run_nodes`, which already wraps each test body in
//! `catch_unwind(AssertUnwindSafe(...))` and prints colored `✓`/`✗`/`-` glyphs
//! — that printing now lives in [`crate::reporter::ConsoleReporter`], so this
//! module keeps only the traversal and execution the teacher's `run_nodes` and
//! `tree_has_focus` did inline. Bounded parallel dispatch over a dedicated
//! `rayon::ThreadPool` has no teacher counterpart (the teacher runs serially);
//! grounded on the scoped `rayon` pools `josongsong-semantica-codegraph` and
//! the `delan-autost` (`other_examples`) cache module build in front of
//! shared, read-mostly state. Per spec.md §4.4, contexts are never
//! parallelised against each other — only one context's direct specs run
//! concurrently at a time, child contexts are visited sequentially after
//! their parent's batch completes, and reporters see that batch as one
//! `on_batch_end` call rather than a stream of per-spec callbacks racing
//! each other.

use crate::error::{DraftSpecError, Result};
use crate::filter::{CompositeFilter, FilterSubject, Predicate};
use crate::middleware::{Pipeline, RetryMiddleware, TimeoutMiddleware};
use crate::reporter::ReporterBus;
use crate::tree::{
    Failure, HookFn, HookPhase, RunReport, SpecContext, SpecExecutionContext, SpecResult, Status,
};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::error;

/// Run-level configuration (spec.md §6's `HostOptions` table).
pub struct HostOptions {
    pub max_degree_of_parallelism: usize,
    pub bail: bool,
    pub filter: CompositeFilter,
    pub timeout_ms: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Checked before entering every context and before dispatching every
    /// spec. Set it from another thread (e.g. a Ctrl-C handler) to stop a
    /// run in progress; `Runner::run` then returns `UserCancelled`.
    pub cancellation: Arc<AtomicBool>,
}

impl Default for HostOptions {
    fn default() -> Self {
        HostOptions {
            max_degree_of_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            bail: false,
            filter: CompositeFilter::new(),
            timeout_ms: None,
            retries: 0,
            retry_delay_ms: 0,
            cancellation: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct Runner {
    options: HostOptions,
    pipeline: Pipeline,
}

impl Runner {
    pub fn new(options: HostOptions) -> Self {
        let mut pipeline = Pipeline::new();
        // Retry registered before Timeout so each retry attempt gets the
        // full timeout budget (first-registered is outermost, middleware.rs).
        if options.retries > 0 {
            pipeline.register(RetryMiddleware::new(
                options.retries,
                Duration::from_millis(options.retry_delay_ms),
            ));
        }
        if let Some(ms) = options.timeout_ms {
            pipeline.register(TimeoutMiddleware::new(Duration::from_millis(ms)));
        }
        Runner { options, pipeline }
    }

    /// Executes every spec reachable from `root`, reporting through `reporters`,
    /// and returns the aggregate [`RunReport`] with results in declaration
    /// order, or `UserCancelled` if `options.cancellation` fired mid-run.
    pub fn run(&self, root: &SpecContext, reporters: &ReporterBus) -> Result<RunReport> {
        let started = Instant::now();
        let bail_flag = Arc::new(AtomicBool::new(false));
        let has_focused = root.has_focused_descendant;

        reporters.on_run_start(root.total_spec_count);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_degree_of_parallelism.max(1))
            .build()
            .expect("draftspec: failed to build runner thread pool");

        let mut out = Vec::new();
        let mut path = Vec::new();
        let mut inherited_tags = HashSet::new();
        self.walk(
            root,
            &mut path,
            &mut inherited_tags,
            has_focused,
            false,
            false,
            &bail_flag,
            &pool,
            reporters,
            &mut out,
        )?;

        let report = RunReport::from_results(out, started.elapsed());
        reporters.on_run_end(&report);
        Ok(report)
    }

    /// Recursively walks `ctx`: classifies each direct spec, dispatches the
    /// ones that need to run as a single batch on `pool` (bounded by
    /// `max_degree_of_parallelism`), reports that batch, then recurses
    /// sequentially into child contexts. `ancestor_focused`/`ancestor_skipped`
    /// carry a `fdescribe`/`xdescribe` ancestor's effective flag down the
    /// tree, since a focused/skipped group counts as if every spec beneath it
    /// were individually `fit`/`xit` (skip dominates, mirroring
    /// `SpecDefinition::new`'s focused+skipped collapse).
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        ctx: &SpecContext,
        path: &mut Vec<String>,
        inherited_tags: &mut HashSet<String>,
        has_focused: bool,
        ancestor_focused: bool,
        ancestor_skipped: bool,
        bail: &Arc<AtomicBool>,
        pool: &rayon::ThreadPool,
        reporters: &ReporterBus,
        out: &mut Vec<SpecResult>,
    ) -> Result<()> {
        if self.options.cancellation.load(Ordering::SeqCst) {
            return Err(DraftSpecError::UserCancelled);
        }

        let added_tags: Vec<String> = ctx.tags.iter().cloned().collect();
        for t in &added_tags {
            inherited_tags.insert(t.clone());
        }

        let effective_skipped = ancestor_skipped || ctx.skipped;
        let effective_focused = (ancestor_focused || ctx.focused) && !effective_skipped;

        let before_all_failure = run_hook_chain_capturing(&ctx.before_all, HookPhase::BeforeAll);

        let mut slots: Vec<Option<SpecResult>> = vec![None; ctx.specs.len()];
        let mut deferred: Vec<usize> = Vec::new();

        for (i, spec) in ctx.specs.iter().enumerate() {
            if let Some(failure) = &before_all_failure {
                slots[i] = Some(SpecResult {
                    description: spec.description.clone(),
                    context_path: path.clone(),
                    status: Status::Failed,
                    duration_body: Duration::ZERO,
                    duration_before_each: Duration::ZERO,
                    duration_after_each: Duration::ZERO,
                    failure: Some(failure.clone()),
                    source_file: spec.source_file.clone(),
                    source_line: spec.source_line,
                });
                continue;
            }

            if spec.body.is_none() {
                slots[i] = Some(SpecResult::pending(spec, path.clone()));
                continue;
            }

            let skipped = spec.skipped || effective_skipped;
            let focused = spec.focused || effective_focused;
            if skipped || (has_focused && !focused) || bail.load(Ordering::SeqCst) {
                slots[i] = Some(SpecResult::skipped(spec, path.clone()));
                continue;
            }

            let mut tags: HashSet<String> = inherited_tags.clone();
            tags.extend(spec.tags.iter().cloned());
            let description_path = if path.is_empty() {
                spec.description.clone()
            } else {
                format!("{} {}", path.join(" "), spec.description)
            };
            let subject = FilterSubject {
                description_path: &description_path,
                tags: &tags,
                source_file: &spec.source_file,
                source_line: spec.source_line,
            };
            if !self.options.filter.matches(&subject) {
                slots[i] = Some(SpecResult::skipped(spec, path.clone()));
                continue;
            }

            deferred.push(i);
        }

        if !deferred.is_empty() {
            let collected: Mutex<Vec<(usize, SpecResult)>> = Mutex::new(Vec::new());
            pool.scope(|scope| {
                for i in &deferred {
                    let spec = &ctx.specs[*i];

                    if (self.options.bail && bail.load(Ordering::SeqCst))
                        || self.options.cancellation.load(Ordering::SeqCst)
                    {
                        let result = SpecResult::skipped(spec, path.clone());
                        collected.lock().unwrap().push((*i, result));
                        continue;
                    }

                    let bail = bail.clone();
                    let collected = &collected;
                    let context_path = path.clone();
                    scope.spawn(move |_| {
                        let cancelled = Arc::new(AtomicBool::new(false));
                        let secx = SpecExecutionContext::new(
                            spec,
                            ctx,
                            context_path.clone(),
                            has_focused,
                            cancelled,
                        );
                        reporters.on_spec_start(&secx);

                        let result = self.pipeline.run(&secx, &execute_terminal);
                        if result.status == Status::Failed && self.options.bail {
                            bail.store(true, Ordering::SeqCst);
                        }
                        collected.lock().unwrap().push((*i, result));
                    });
                }
            });

            for (i, result) in collected.into_inner().unwrap() {
                slots[i] = Some(result);
            }
        }

        if self.options.cancellation.load(Ordering::SeqCst) {
            return Err(DraftSpecError::UserCancelled);
        }

        let batch: Vec<SpecResult> = slots
            .into_iter()
            .map(|r| r.expect("draftspec: every spec slot in a context's batch must be filled"))
            .collect();
        reporters.on_batch_end(&batch);
        out.extend(batch);

        for child in &ctx.children {
            path.push(child.description.clone());
            let result = self.walk(
                child,
                path,
                inherited_tags,
                has_focused,
                effective_focused,
                effective_skipped,
                bail,
                pool,
                reporters,
                out,
            );
            path.pop();
            result?;
        }

        for t in &added_tags {
            inherited_tags.remove(t);
        }

        if let Err(message) = run_hook_chain(&ctx.after_all) {
            error!(context = %path.join(" "), error = %message, "afterAll hook failed");
        }
        Ok(())
    }
}

/// Times and executes the three phases of one spec (spec.md §4.6):
/// `beforeEach` chain, body, `afterEach` chain. `afterEach` always runs, even
/// when an earlier phase already failed, and a passing body can still be
/// failed by a misbehaving `afterEach`.
fn execute_terminal(ctx: &SpecExecutionContext<'_>) -> SpecResult {
    let before_start = Instant::now();
    let before_failure = run_hook_chain_capturing(&ctx.enclosing.before_each_chain, HookPhase::BeforeEach);
    let duration_before_each = before_start.elapsed();

    let (status, duration_body, failure) = if let Some(failure) = before_failure {
        (Status::Failed, Duration::ZERO, Some(failure))
    } else {
        let body = ctx
            .spec
            .body
            .clone()
            .expect("draftspec: pending specs never reach the terminal executor");
        let body_start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| body()));
        let duration_body = body_start.elapsed();
        match outcome {
            Ok(()) => (Status::Passed, duration_body, None),
            Err(payload) => (Status::Failed, duration_body, Some(failure_from_panic(payload))),
        }
    };

    let after_start = Instant::now();
    let after_failure = run_hook_chain_capturing(&ctx.enclosing.after_each_chain, HookPhase::AfterEach);
    let duration_after_each = after_start.elapsed();

    let (status, failure) = match (&status, after_failure) {
        (Status::Passed, Some(after_failure)) => (Status::Failed, Some(after_failure)),
        (_, _) => (status, failure),
    };

    SpecResult {
        description: ctx.spec.description.clone(),
        context_path: ctx.context_path.clone(),
        status,
        duration_body,
        duration_before_each,
        duration_after_each,
        failure,
        source_file: ctx.spec.source_file.clone(),
        source_line: ctx.spec.source_line,
    }
}

/// Runs hooks in order, stopping at the first failure; returns that failure
/// wrapped with `phase` so the caller can attribute it correctly.
fn run_hook_chain_capturing(hooks: &[HookFn], phase: HookPhase) -> Option<Failure> {
    for hook in hooks {
        let hook = hook.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook())) {
            return Some(Failure::Hook {
                phase,
                message: panic_message(payload),
            });
        }
    }
    None
}

/// Runs hooks in order for contexts where a failure has nowhere to attach
/// (`afterAll`); returns the first failure message, if any, for logging.
fn run_hook_chain(hooks: &[HookFn]) -> std::result::Result<(), String> {
    for hook in hooks {
        let hook = hook.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook())) {
            return Err(panic_message(payload));
        }
    }
    Ok(())
}

fn failure_from_panic(payload: Box<dyn std::any::Any + Send>) -> Failure {
    Failure::Unexpected {
        message: panic_message(payload),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::build_tree;

    #[test]
    fn hook_order_matches_nested_describe_scenario() {
        let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let outer_before = log.clone();
        let inner_before = log.clone();
        let inner_after = log.clone();
        let outer_after = log.clone();
        let body_log = log.clone();

        let tree = build_tree(|ctx| {
            ctx.describe("outer", |ctx| {
                ctx.before_each(move || outer_before.lock().unwrap().push("oE"));
                ctx.after_each(move || outer_after.lock().unwrap().push("oA"));
                ctx.describe("inner", |ctx| {
                    ctx.before_each(move || inner_before.lock().unwrap().push("iE"));
                    ctx.after_each(move || inner_after.lock().unwrap().push("iA"));
                    ctx.it("x", move || body_log.lock().unwrap().push("x"));
                });
            });
        });

        let runner = Runner::new(HostOptions {
            max_degree_of_parallelism: 1,
            ..HostOptions::default()
        });
        let report = runner.run(&tree, &ReporterBus::new()).unwrap();

        assert_eq!(report.passed, 1);
        assert_eq!(*log.lock().unwrap(), vec!["oE", "iE", "x", "iA", "oA"]);
    }

    #[test]
    fn focus_skips_non_focused_siblings() {
        let tree = build_tree(|ctx| {
            ctx.it("a", || {});
            ctx.fit("b", || {});
            ctx.it("c", || {});
        });

        let runner = Runner::new(HostOptions::default());
        let report = runner.run(&tree, &ReporterBus::new()).unwrap();

        assert_eq!(report.passed, 1);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn after_each_runs_even_when_body_panics() {
        let ran_after = Arc::new(AtomicBool::new(false));
        let flag = ran_after.clone();

        let tree = build_tree(|ctx| {
            ctx.describe("group", |ctx| {
                ctx.after_each(move || flag.store(true, Ordering::SeqCst));
                ctx.it("explodes", || panic!("boom"));
            });
        });

        let runner = Runner::new(HostOptions::default());
        let report = runner.run(&tree, &ReporterBus::new()).unwrap();

        assert_eq!(report.failed, 1);
        assert!(ran_after.load(Ordering::SeqCst));
    }

    #[test]
    fn pending_spec_bypasses_filters_and_focus() {
        let tree = build_tree(|ctx| {
            ctx.pending("someday");
            ctx.fit("focused", || {});
        });

        let runner = Runner::new(HostOptions::default());
        let report = runner.run(&tree, &ReporterBus::new()).unwrap();

        assert_eq!(report.pending, 1);
        assert_eq!(report.passed, 1);
    }

    #[test]
    fn before_all_failure_fails_only_direct_specs() {
        let tree = build_tree(|ctx| {
            ctx.describe("outer", |ctx| {
                ctx.before_all(|| panic!("setup failed"));
                ctx.it("direct", || {});
                ctx.describe("nested", |ctx| {
                    ctx.it("nested spec", || {});
                });
            });
        });

        let runner = Runner::new(HostOptions::default());
        let report = runner.run(&tree, &ReporterBus::new()).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.passed, 1);
    }
}
