//! The DSL binding (C2): the thread-local builder stack behind [`Context`], the
//! ambient API a host program calls from Rust to declare a spec tree directly
//! (as opposed to discovering one from a `.dspec` manifest via [`crate::host`]).
//!
//! Generalizes the teacher's `context.rs` builder stack: where that crate pushed
//! `TestNode`s with flat `labels`/`before_each` vectors per frame, this one also
//! precomputes the flattened before-each/after-each hook chains incrementally as
//! frames are pushed and popped, since [`crate::tree::SpecContext`] stores them
//! pre-flattened rather than relying on parent back-pointers.

use crate::tree::{HookFn, SpecContext, SpecDefinition};
use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

thread_local! {
    static BUILDER: RefCell<Option<TreeBuilder>> = const { RefCell::new(None) };
}

struct Frame {
    description: String,
    tags: HashSet<String>,
    before_each: Vec<HookFn>,
    after_each: Vec<HookFn>,
    before_all: Vec<HookFn>,
    after_all: Vec<HookFn>,
    children: Vec<SpecContext>,
    specs: Vec<SpecDefinition>,
    /// Inherited beforeEach chain from every ancestor, captured at push time.
    inherited_before_each: Vec<HookFn>,
    /// Inherited afterEach chain from every ancestor, captured at push time.
    inherited_after_each: Vec<HookFn>,
    /// Set from `fdescribe`/`fcontext`/`fwhen` at push time.
    focused: bool,
    /// Set from `xdescribe`/`xcontext`/`xwhen` at push time.
    skipped: bool,
}

impl Frame {
    fn root() -> Self {
        Frame {
            description: String::new(),
            tags: HashSet::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            children: Vec::new(),
            specs: Vec::new(),
            inherited_before_each: Vec::new(),
            inherited_after_each: Vec::new(),
            focused: false,
            skipped: false,
        }
    }
}

struct TreeBuilder {
    stack: Vec<Frame>,
}

impl TreeBuilder {
    fn new() -> Self {
        TreeBuilder {
            stack: vec![Frame::root()],
        }
    }

    fn push_group(&mut self, description: String, focused: bool, skipped: bool) {
        let parent = self.stack.last().expect("draftspec: empty builder stack");
        let mut inherited_before_each = parent.inherited_before_each.clone();
        inherited_before_each.extend(parent.before_each.iter().cloned());
        let mut inherited_after_each = parent.after_each.iter().cloned().collect::<Vec<_>>();
        inherited_after_each.extend(parent.inherited_after_each.iter().cloned());

        self.stack.push(Frame {
            description,
            inherited_before_each,
            inherited_after_each,
            // Skip dominates focus at the DSL level, same collapse rule
            // `SpecDefinition::new` applies to a leaf's focused+skipped.
            focused: focused && !skipped,
            skipped,
            ..Frame::root()
        });
    }

    fn pop_group(&mut self) {
        let frame = self
            .stack
            .pop()
            .expect("draftspec: unbalanced describe push/pop");

        let mut before_each_chain = frame.inherited_before_each.clone();
        before_each_chain.extend(frame.before_each.iter().cloned());
        let mut after_each_chain = frame.after_each.iter().cloned().collect::<Vec<_>>();
        after_each_chain.extend(frame.inherited_after_each.iter().cloned());

        let has_focused_descendant = frame.focused
            || frame.specs.iter().any(|s| s.focused)
            || frame.children.iter().any(|c| c.has_focused_descendant);
        let total_spec_count = frame.specs.len()
            + frame
                .children
                .iter()
                .map(|c| c.total_spec_count)
                .sum::<usize>();

        let ctx = SpecContext {
            description: frame.description,
            children: frame.children,
            specs: frame.specs,
            tags: frame.tags,
            before_all: frame.before_all,
            after_all: frame.after_all,
            before_each_chain,
            after_each_chain,
            total_spec_count,
            has_focused_descendant,
            focused: frame.focused,
            skipped: frame.skipped,
        };
        self.current_frame_mut().children.push(ctx);
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.stack.last_mut().expect("draftspec: empty builder stack")
    }

    fn finish(mut self) -> SpecContext {
        assert_eq!(
            self.stack.len(),
            1,
            "draftspec: unbalanced describe push/pop at finalization"
        );
        let frame = self.stack.pop().unwrap();
        let has_focused_descendant = frame.focused
            || frame.specs.iter().any(|s| s.focused)
            || frame.children.iter().any(|c| c.has_focused_descendant);
        let total_spec_count = frame.specs.len()
            + frame
                .children
                .iter()
                .map(|c| c.total_spec_count)
                .sum::<usize>();
        SpecContext {
            description: frame.description,
            children: frame.children,
            specs: frame.specs,
            tags: frame.tags,
            before_all: frame.before_all,
            after_all: frame.after_all,
            before_each_chain: frame.before_each.clone(),
            after_each_chain: frame.after_each.clone(),
            total_spec_count,
            has_focused_descendant,
            focused: frame.focused,
            skipped: frame.skipped,
        }
    }
}

fn with_builder<R>(f: impl FnOnce(&mut TreeBuilder) -> R) -> R {
    BUILDER.with(|cell| {
        let mut opt = cell.borrow_mut();
        let builder = opt
            .as_mut()
            .expect("draftspec: Context used outside of draftspec::dsl::build_tree()");
        f(builder)
    })
}

/// Exposes the thread-local builder to [`crate::table`], which needs to push a
/// describe group and append specs without going through `Context`.
pub(crate) fn with_builder_for_table<R>(f: impl FnOnce(&mut TableFrameHandle) -> R) -> R {
    with_builder(|b| f(&mut TableFrameHandle(b)))
}

pub(crate) struct TableFrameHandle<'a>(&'a mut TreeBuilder);

impl<'a> TableFrameHandle<'a> {
    pub(crate) fn push_group(&mut self, name: String) {
        self.0.push_group(name, false, false);
    }

    pub(crate) fn pop_group(&mut self) {
        self.0.pop_group();
    }

    pub(crate) fn push_spec(&mut self, spec: SpecDefinition) {
        self.0.current_frame_mut().specs.push(spec);
    }
}

/// A lightweight handle for declaring spec tree structure from Rust. `Copy` so it
/// can be threaded through nested closures without ceremony, the way the teacher's
/// `Context` is.
#[derive(Copy, Clone)]
pub struct Context;

impl Context {
    // ---- describe / context / when, with focus/skip variants ----

    pub fn describe(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_impl(name, false, false, body);
    }

    pub fn context(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe(name, body);
    }

    pub fn when(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe(name, body);
    }

    /// A focused group — every spec under it runs as if individually `fit`,
    /// same as the teacher's focus convention one level up.
    pub fn fdescribe(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_impl(name, true, false, body);
    }

    pub fn fcontext(&self, name: &str, body: impl FnOnce(Context)) {
        self.fdescribe(name, body);
    }

    pub fn fwhen(&self, name: &str, body: impl FnOnce(Context)) {
        self.fdescribe(name, body);
    }

    /// A skipped group — every spec under it reports Skipped regardless of
    /// its own focus/skip flags.
    pub fn xdescribe(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_impl(name, false, true, body);
    }

    pub fn xcontext(&self, name: &str, body: impl FnOnce(Context)) {
        self.xdescribe(name, body);
    }

    pub fn xwhen(&self, name: &str, body: impl FnOnce(Context)) {
        self.xdescribe(name, body);
    }

    fn describe_impl(&self, name: &str, focused: bool, skipped: bool, body: impl FnOnce(Context)) {
        with_builder(|b| b.push_group(name.to_string(), focused, skipped));
        body(Context);
        with_builder(|b| b.pop_group());
    }

    // ---- it / fit / xit / specify ----

    #[track_caller]
    pub fn it(&self, name: &str, body: impl Fn() + Send + Sync + 'static) -> ItBuilder {
        ItBuilder::new(name.to_string(), Some(Arc::new(body)), false, false)
    }

    #[track_caller]
    pub fn fit(&self, name: &str, body: impl Fn() + Send + Sync + 'static) -> ItBuilder {
        ItBuilder::new(name.to_string(), Some(Arc::new(body)), true, false)
    }

    #[track_caller]
    pub fn xit(&self, name: &str, body: impl Fn() + Send + Sync + 'static) -> ItBuilder {
        ItBuilder::new(name.to_string(), Some(Arc::new(body)), false, true)
    }

    /// A pending spec with no body — shows up as [`crate::tree::Status::Pending`].
    #[track_caller]
    pub fn pending(&self, name: &str) -> ItBuilder {
        ItBuilder::new(name.to_string(), None, false, true)
    }

    pub fn specify(&self, name: &str, body: impl Fn() + Send + Sync + 'static) -> ItBuilder {
        self.it(name, body)
    }

    // ---- hooks ----

    pub fn before_each(&self, hook: impl Fn() + Send + Sync + 'static) {
        with_builder(|b| b.current_frame_mut().before_each.push(Arc::new(hook)));
    }

    pub fn after_each(&self, hook: impl Fn() + Send + Sync + 'static) {
        with_builder(|b| b.current_frame_mut().after_each.push(Arc::new(hook)));
    }

    pub fn before_all(&self, hook: impl Fn() + Send + Sync + 'static) {
        with_builder(|b| b.current_frame_mut().before_all.push(Arc::new(hook)));
    }

    pub fn after_all(&self, hook: impl Fn() + Send + Sync + 'static) {
        with_builder(|b| b.current_frame_mut().after_all.push(Arc::new(hook)));
    }

    // ---- tags on the current describe scope ----

    pub fn tag(&self, tags: &[&str]) {
        with_builder(|b| {
            b.current_frame_mut()
                .tags
                .extend(tags.iter().map(|s| s.to_string()))
        });
    }

    // ---- table-driven (withData) ----

    /// Start a table-driven spec. Row descriptions follow the templating rule in
    /// SPEC_FULL.md §4.3: `label` if given, else `"{base} [{i}]: {row:?}"`.
    pub fn with_data<T: std::fmt::Debug + Clone + Send + Sync + 'static>(
        &self,
        base_name: &str,
    ) -> crate::table::TableBuilder<T> {
        crate::table::TableBuilder::new(base_name.to_string())
    }
}

/// Builder returned by [`Context::it`] and friends. Registers the spec on drop,
/// mirroring the teacher's `ItBuilder`.
pub struct ItBuilder {
    name: String,
    body: Option<HookFn>,
    focused: bool,
    pending: bool,
    tags: HashSet<String>,
    location: &'static Location<'static>,
}

impl ItBuilder {
    #[track_caller]
    fn new(name: String, body: Option<HookFn>, focused: bool, pending: bool) -> Self {
        ItBuilder {
            name,
            body,
            focused,
            pending,
            tags: HashSet::new(),
            location: Location::caller(),
        }
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|s| s.to_string()));
        self
    }
}

impl Drop for ItBuilder {
    fn drop(&mut self) {
        let spec = SpecDefinition::new(
            std::mem::take(&mut self.name),
            self.body.take(),
            self.focused,
            self.pending,
            std::mem::take(&mut self.tags),
            PathBuf::from(self.location.file()),
            self.location.line(),
        );
        with_builder(|b| b.current_frame_mut().specs.push(spec));
    }
}

/// Declare a spec tree via `body` and return the built, immutable [`SpecContext`].
///
/// This is the Rust-native counterpart to [`crate::host::compile`] (which builds
/// the same [`SpecContext`] shape from a parsed `.dspec` manifest instead).
pub fn build_tree(body: impl FnOnce(Context)) -> SpecContext {
    BUILDER.with(|cell| {
        *cell.borrow_mut() = Some(TreeBuilder::new());
    });

    body(Context);

    BUILDER.with(|cell| {
        cell.borrow_mut()
            .take()
            .expect("draftspec: builder missing after build_tree")
            .finish()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn builds_nested_tree_with_spec_counts() {
        let tree = build_tree(|ctx| {
            ctx.describe("calculator", |ctx| {
                ctx.it("adds", || assert_eq!(2 + 2, 4));
                ctx.describe("division", |ctx| {
                    ctx.it("divides", || assert_eq!(4 / 2, 2));
                });
            });
        });

        assert_eq!(tree.total_spec_count, 2);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 1);
        assert_eq!(tree.children[0].specs.len(), 1);
    }

    #[test]
    fn before_each_chain_accumulates_down_the_tree() {
        let counter = Arc::new(AtomicUsize::new(0));
        let outer = counter.clone();
        let inner = counter.clone();

        let tree = build_tree(|ctx| {
            ctx.describe("outer", |ctx| {
                ctx.before_each(move || {
                    outer.fetch_add(1, Ordering::SeqCst);
                });
                ctx.describe("inner", |ctx| {
                    ctx.before_each(move || {
                        inner.fetch_add(10, Ordering::SeqCst);
                    });
                    ctx.it("leaf", || {});
                });
            });
        });

        let inner_ctx = &tree.children[0].children[0];
        assert_eq!(inner_ctx.before_each_chain.len(), 2);
    }

    #[test]
    fn focus_marks_ancestor_has_focused_descendant() {
        let tree = build_tree(|ctx| {
            ctx.describe("group", |ctx| {
                ctx.fit("focused", || {});
                ctx.it("not focused", || {});
            });
        });

        assert!(tree.has_focused_descendant);
        assert!(tree.children[0].has_focused_descendant);
    }

    #[test]
    fn fdescribe_marks_has_focused_descendant_without_any_fit() {
        let tree = build_tree(|ctx| {
            ctx.fdescribe("group", |ctx| {
                ctx.it("a", || {});
            });
            ctx.describe("other", |ctx| {
                ctx.it("b", || {});
            });
        });

        assert!(tree.has_focused_descendant);
        assert!(tree.children[0].focused);
        assert!(!tree.children[1].focused);
    }

    #[test]
    fn xdescribe_marks_the_context_skipped() {
        let tree = build_tree(|ctx| {
            ctx.xdescribe("disabled", |ctx| {
                ctx.it("a", || {});
            });
        });

        assert!(tree.children[0].skipped);
        assert!(!tree.children[0].focused);
    }

    #[test]
    fn pending_spec_has_no_body() {
        let tree = build_tree(|ctx| {
            ctx.pending("someday");
        });

        assert!(tree.specs[0].body.is_none());
        assert!(tree.specs[0].skipped);
    }
}
