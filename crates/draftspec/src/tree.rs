//! The spec tree (C1): [`SpecContext`] groups, [`SpecDefinition`] leaves, and the
//! value types ([`SpecExecutionContext`], [`SpecResult`], [`RunReport`]) threaded through
//! execution. See spec.md §3 for the data model this module implements.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// A hook or spec body. `Send + Sync` so the parallel runner can share it across threads.
pub type HookFn = Arc<dyn Fn() + Send + Sync>;

/// Outcome of executing one spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Pending,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Pending => "pending",
        };
        f.write_str(s)
    }
}

/// Which hook phase a [`Failure::Hook`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

/// Sum type for why a spec did not pass (spec.md §9 "Sum types for results and failures").
#[derive(Debug, Clone)]
pub enum Failure {
    Assertion {
        expected: String,
        actual: String,
        message: String,
    },
    Timeout {
        after_ms: u64,
    },
    Unexpected {
        message: String,
    },
    Hook {
        phase: HookPhase,
        message: String,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Assertion {
                expected,
                actual,
                message,
            } => write!(f, "expected {expected}, got {actual}: {message}"),
            Failure::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
            Failure::Unexpected { message } => write!(f, "{message}"),
            Failure::Hook { phase, message } => write!(f, "{phase:?} hook failed: {message}"),
        }
    }
}

/// A leaf in the spec tree — one example, possibly pending (no body).
pub struct SpecDefinition {
    pub description: String,
    pub body: Option<HookFn>,
    pub focused: bool,
    pub skipped: bool,
    pub tags: HashSet<String>,
    pub source_file: PathBuf,
    pub source_line: u32,
}

impl fmt::Debug for SpecDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecDefinition")
            .field("description", &self.description)
            .field("has_body", &self.body.is_some())
            .field("focused", &self.focused)
            .field("skipped", &self.skipped)
            .field("tags", &self.tags)
            .field("source_file", &self.source_file)
            .field("source_line", &self.source_line)
            .finish()
    }
}

impl SpecDefinition {
    /// Constructs a spec, enforcing that focused+skipped is collapsed to skipped
    /// (spec.md §3: "focused+skipped = skipped wins").
    pub fn new(
        description: impl Into<String>,
        body: Option<HookFn>,
        focused: bool,
        skipped: bool,
        tags: HashSet<String>,
        source_file: PathBuf,
        source_line: u32,
    ) -> Self {
        SpecDefinition {
            description: description.into(),
            body,
            focused: focused && !skipped,
            skipped,
            tags,
            source_file,
            source_line,
        }
    }
}

/// A group node: nested describes, their specs, hooks, and tags.
pub struct SpecContext {
    pub description: String,
    pub children: Vec<SpecContext>,
    pub specs: Vec<SpecDefinition>,
    pub tags: HashSet<String>,
    pub before_all: Vec<HookFn>,
    pub after_all: Vec<HookFn>,
    /// Flattened beforeEach chain, root-to-this-context, precomputed while the tree is built.
    pub before_each_chain: Vec<HookFn>,
    /// Flattened afterEach chain, this-context-to-root, precomputed while the tree is built.
    pub after_each_chain: Vec<HookFn>,
    pub total_spec_count: usize,
    pub has_focused_descendant: bool,
    /// `fdescribe`/`fcontext`/`fwhen` — every spec and child context under this
    /// one is treated as if it were individually focused, mirroring
    /// [`SpecDefinition`]'s own `focused` flag one level up.
    pub focused: bool,
    /// `xdescribe`/`xcontext`/`xwhen` — forces every spec and child context
    /// under this one to Skipped, dominating a local or inherited `focused`
    /// the same way `SpecDefinition::new` collapses focused+skipped to skipped.
    pub skipped: bool,
}

impl fmt::Debug for SpecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecContext")
            .field("description", &self.description)
            .field("children", &self.children)
            .field("specs", &self.specs)
            .field("tags", &self.tags)
            .field("total_spec_count", &self.total_spec_count)
            .field("has_focused_descendant", &self.has_focused_descendant)
            .field("focused", &self.focused)
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl SpecContext {
    /// An empty root context — what the DSL binding starts from.
    pub fn empty_root() -> Self {
        SpecContext {
            description: String::new(),
            children: Vec::new(),
            specs: Vec::new(),
            tags: HashSet::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            before_each_chain: Vec::new(),
            after_each_chain: Vec::new(),
            total_spec_count: 0,
            has_focused_descendant: false,
            focused: false,
            skipped: false,
        }
    }
}

/// The value threaded through the middleware pipeline for one spec dispatch.
pub struct SpecExecutionContext<'a> {
    pub spec: &'a SpecDefinition,
    pub enclosing: &'a SpecContext,
    pub context_path: Vec<String>,
    pub has_focused: bool,
    pub cancelled: Arc<AtomicBool>,
    scratch: RefCell<HashMap<String, Box<dyn Any>>>,
}

impl<'a> SpecExecutionContext<'a> {
    pub fn new(
        spec: &'a SpecDefinition,
        enclosing: &'a SpecContext,
        context_path: Vec<String>,
        has_focused: bool,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        SpecExecutionContext {
            spec,
            enclosing,
            context_path,
            has_focused,
            cancelled,
            scratch: RefCell::new(HashMap::new()),
        }
    }

    /// Middleware-to-middleware scratch storage, keyed by name.
    pub fn scratch_insert(&self, key: impl Into<String>, value: Box<dyn Any>) {
        self.scratch.borrow_mut().insert(key.into(), value);
    }

    pub fn scratch_get<T: 'static>(&self, key: &str) -> Option<std::cell::Ref<'_, T>> {
        let borrow = self.scratch.borrow();
        if borrow.get(key).and_then(|v| v.downcast_ref::<T>()).is_some() {
            Some(std::cell::Ref::map(borrow, |m| {
                m.get(key).unwrap().downcast_ref::<T>().unwrap()
            }))
        } else {
            None
        }
    }

    pub fn full_description(&self) -> String {
        if self.context_path.is_empty() {
            self.spec.description.clone()
        } else {
            format!("{} {}", self.context_path.join(" "), self.spec.description)
        }
    }
}

/// The result of executing (or short-circuiting) one spec.
#[derive(Debug, Clone)]
pub struct SpecResult {
    pub description: String,
    pub context_path: Vec<String>,
    pub status: Status,
    pub duration_body: Duration,
    pub duration_before_each: Duration,
    pub duration_after_each: Duration,
    pub failure: Option<Failure>,
    pub source_file: PathBuf,
    pub source_line: u32,
}

impl SpecResult {
    pub fn skipped(spec: &SpecDefinition, context_path: Vec<String>) -> Self {
        SpecResult {
            description: spec.description.clone(),
            context_path,
            status: Status::Skipped,
            duration_body: Duration::ZERO,
            duration_before_each: Duration::ZERO,
            duration_after_each: Duration::ZERO,
            failure: None,
            source_file: spec.source_file.clone(),
            source_line: spec.source_line,
        }
    }

    pub fn pending(spec: &SpecDefinition, context_path: Vec<String>) -> Self {
        SpecResult {
            status: Status::Pending,
            ..SpecResult::skipped(spec, context_path)
        }
    }

    pub fn full_description(&self) -> String {
        if self.context_path.is_empty() {
            self.description.clone()
        } else {
            format!("{} {}", self.context_path.join(" "), self.description)
        }
    }
}

/// Per-file rollup in a [`RunReport`].
#[derive(Debug, Clone)]
pub struct FileSummary {
    pub file: PathBuf,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
}

/// Aggregate produced by the runner at end-of-run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub duration: Duration,
    pub results: Vec<SpecResult>,
    pub file_summaries: Vec<FileSummary>,
}

impl RunReport {
    pub fn from_results(results: Vec<SpecResult>, duration: Duration) -> Self {
        let mut report = RunReport {
            passed: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
            duration,
            results,
            file_summaries: Vec::new(),
        };

        let mut by_file: HashMap<PathBuf, FileSummary> = HashMap::new();
        for r in &report.results {
            match r.status {
                Status::Passed => report.passed += 1,
                Status::Failed => report.failed += 1,
                Status::Skipped => report.skipped += 1,
                Status::Pending => report.pending += 1,
            }
            let entry = by_file.entry(r.source_file.clone()).or_insert(FileSummary {
                file: r.source_file.clone(),
                passed: 0,
                failed: 0,
                skipped: 0,
                pending: 0,
            });
            match r.status {
                Status::Passed => entry.passed += 1,
                Status::Failed => entry.failed += 1,
                Status::Skipped => entry.skipped += 1,
                Status::Pending => entry.pending += 1,
            }
        }
        let mut summaries: Vec<FileSummary> = by_file.into_values().collect();
        summaries.sort_by(|a, b| a.file.cmp(&b.file));
        report.file_summaries = summaries;
        report
    }
}

/// Used only by tests/tooling that need a throwaway path.
pub fn synthetic_path(name: &str) -> PathBuf {
    Path::new(name).to_path_buf()
}
