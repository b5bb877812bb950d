//! The pluggable `Compiler` trait (spec.md §4.2) and its default,
//! grammar-backed implementation.
//!
//! `compile` produces a [`CompiledArtefact`] — a plain, `serde`-serializable AST
//! with no closures in it, which is exactly what the Compilation Cache stores on
//! disk. Resolving body keys into actual `Fn()` closures is a separate,
//! non-cacheable step ([`materialize`]) that happens after every cache hit or
//! miss alike, since closures can't be serialized.

use crate::error::{DraftSpecError, Result};
use crate::grammar::{self, HookKind, ManifestNode};
use crate::registry;
use crate::tree::{SpecContext, SpecDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// The cacheable output of compilation: a parsed node list, no resolved bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledArtefact {
    pub nodes: Vec<ManifestNode>,
}

/// The extension point spec.md §4.2 calls "the compiler": a host program
/// plugs in a real scripting engine, an out-of-process `rustc`/`dlopen`
/// builder, or (the default) the manifest grammar, as long as it can turn a
/// preprocessed source string into a [`CompiledArtefact`].
pub trait Compiler: Send + Sync {
    fn compile(&self, source_path: &std::path::Path, preprocessed_source: &str) -> Result<CompiledArtefact>;
}

/// Default `Compiler`: parses the shared manifest grammar. Never evaluates or
/// type-checks anything resembling a script body (non-goal preserved) — an
/// `it`'s body is only ever a body-key string.
#[derive(Default)]
pub struct ManifestCompiler;

impl Compiler for ManifestCompiler {
    fn compile(&self, source_path: &std::path::Path, preprocessed_source: &str) -> Result<CompiledArtefact> {
        let (nodes, diagnostics) = grammar::parse(preprocessed_source);
        if let Some(first) = diagnostics.first() {
            return Err(DraftSpecError::ScriptCompilation {
                path: source_path.to_path_buf(),
                message: first.message.clone(),
                line: Some(first.line),
            });
        }
        Ok(CompiledArtefact { nodes })
    }
}

/// Resolves every body key in `artefact` against the global [`registry`] and
/// builds the live [`SpecContext`] tree the runner executes. Unlike `compile`,
/// this always runs fresh — the registry reflects the current process's
/// registered closures, not whatever was true when the artefact was cached.
pub fn materialize(artefact: &CompiledArtefact, source_path: &std::path::Path) -> Result<SpecContext> {
    let mut unresolved = Vec::new();
    let root = build_context(String::new(), &artefact.nodes, source_path, &[], &[], &mut unresolved);
    if let Some(key) = unresolved.into_iter().next() {
        return Err(DraftSpecError::ScriptCompilation {
            path: source_path.to_path_buf(),
            message: format!("no body registered for key `{key}`"),
            line: None,
        });
    }
    Ok(root)
}

/// Builds one context, given the beforeEach/afterEach chains inherited from
/// every ancestor. Two passes over `nodes` are needed because a manifest's
/// hooks and nested `describe`s can appear in any order, but a child
/// `describe`'s hook chain must already include this level's direct hooks —
/// the same ordering constraint the teacher's `context.rs` push/pop stack
/// satisfies incrementally; here it's resolved by scanning hooks/tags first.
fn build_context(
    description: String,
    nodes: &[ManifestNode],
    source_path: &std::path::Path,
    inherited_before_each: &[crate::tree::HookFn],
    inherited_after_each: &[crate::tree::HookFn],
    unresolved: &mut Vec<String>,
) -> SpecContext {
    let mut direct_before_each = Vec::new();
    let mut direct_after_each = Vec::new();
    let mut before_all = Vec::new();
    let mut after_all = Vec::new();
    let mut tags = HashSet::new();

    for node in nodes {
        match node {
            ManifestNode::Tag { names } => tags.extend(names.iter().cloned()),
            ManifestNode::Hook { kind, body_key, .. } => {
                let Some(body) = resolve_required(body_key, unresolved) else {
                    continue;
                };
                match kind {
                    HookKind::BeforeEach => direct_before_each.push(body),
                    HookKind::AfterEach => direct_after_each.push(body),
                    HookKind::BeforeAll => before_all.push(body),
                    HookKind::AfterAll => after_all.push(body),
                }
            }
            _ => {}
        }
    }

    let mut before_each_chain = inherited_before_each.to_vec();
    before_each_chain.extend(direct_before_each.iter().cloned());
    let mut after_each_chain = direct_after_each.clone();
    after_each_chain.extend(inherited_after_each.iter().cloned());

    let mut ctx = SpecContext::empty_root();
    ctx.description = description;
    ctx.tags = tags;
    ctx.before_all = before_all;
    ctx.after_all = after_all;
    ctx.before_each_chain = before_each_chain.clone();
    ctx.after_each_chain = after_each_chain.clone();

    for node in nodes {
        match node {
            ManifestNode::Describe {
                name,
                focused,
                skipped,
                children,
                ..
            } => {
                let mut child = build_context(
                    name.clone(),
                    children,
                    source_path,
                    &before_each_chain,
                    &after_each_chain,
                    unresolved,
                );
                // Skip dominates focus, mirroring SpecDefinition::new's collapse rule.
                child.focused = *focused && !*skipped;
                child.skipped = *skipped;
                child.has_focused_descendant = child.focused || child.has_focused_descendant;
                ctx.children.push(child);
            }
            ManifestNode::Spec {
                name,
                focused,
                skipped,
                body_key,
                line,
            } => {
                let body = resolve_optional(body_key.as_deref(), unresolved);
                ctx.specs.push(SpecDefinition::new(
                    name.clone(),
                    body,
                    *focused,
                    *skipped,
                    HashSet::new(),
                    source_path.to_path_buf(),
                    *line,
                ));
            }
            ManifestNode::WithData {
                base_name,
                rows,
                body_key,
                line,
            } => {
                let body = resolve_optional(body_key.as_deref(), unresolved);
                for (i, row) in rows.iter().enumerate() {
                    let description = format!("{base_name} [{i}]: {row:?}");
                    ctx.specs.push(SpecDefinition::new(
                        description,
                        body.clone(),
                        false,
                        false,
                        HashSet::new(),
                        source_path.to_path_buf(),
                        *line,
                    ));
                }
            }
            // Tags/hooks were consumed in the first pass above. Include is
            // fully expanded, and reference/use are resolved (path joined
            // or elided as a framework self-reference) during preprocessing;
            // by the time the grammar sees them they're inert provenance
            // markers, not structural tree nodes.
            ManifestNode::Tag { .. }
            | ManifestNode::Hook { .. }
            | ManifestNode::Include { .. }
            | ManifestNode::Reference { .. }
            | ManifestNode::Use { .. } => {}
        }
    }

    ctx.has_focused_descendant = ctx.specs.iter().any(|s| s.focused)
        || ctx.children.iter().any(|c| c.has_focused_descendant);
    ctx.total_spec_count =
        ctx.specs.len() + ctx.children.iter().map(|c| c.total_spec_count).sum::<usize>();

    ctx
}

fn resolve_optional(key: Option<&str>, unresolved: &mut Vec<String>) -> Option<Arc<dyn Fn() + Send + Sync>> {
    let key = key?;
    match registry::resolve(key) {
        Some(body) => Some(body),
        None => {
            unresolved.push(key.to_string());
            None
        }
    }
}

fn resolve_required(key: &str, unresolved: &mut Vec<String>) -> Option<Arc<dyn Fn() + Send + Sync>> {
    match registry::resolve(key) {
        Some(body) => Some(body),
        None => {
            unresolved.push(key.to_string());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    #[test]
    fn materializes_resolved_body_keys_into_a_spec_context() {
        let _guard = registry::lock();
        registry::clear();
        registry::register("suite::adds", || assert_eq!(2 + 2, 4));

        let (nodes, diags) = grammar::parse(
            r#"
            describe "Calculator" {
                it "adds" { body = "suite::adds" }
            }
            "#,
        );
        assert!(diags.is_empty());
        let artefact = CompiledArtefact { nodes };
        let ctx = materialize(&artefact, std::path::Path::new("main.dspec")).unwrap();

        assert_eq!(ctx.children.len(), 1);
        assert_eq!(ctx.children[0].specs.len(), 1);
        assert!(ctx.children[0].specs[0].body.is_some());
    }

    #[test]
    fn missing_body_key_is_reported() {
        let _guard = registry::lock();
        registry::clear();
        let (nodes, _) = grammar::parse(r#"it "lonely" { body = "nowhere::body" }"#);
        let artefact = CompiledArtefact { nodes };
        let err = materialize(&artefact, std::path::Path::new("main.dspec")).unwrap_err();
        assert!(matches!(err, DraftSpecError::ScriptCompilation { .. }));
    }

    #[test]
    fn fdescribe_on_a_manifest_group_marks_has_focused_descendant() {
        let _guard = registry::lock();
        registry::clear();
        registry::register("group::a", || {});

        let (nodes, diags) = grammar::parse(
            r#"
            fdescribe "focused group" {
                it "a" { body = "group::a" }
            }
            "#,
        );
        assert!(diags.is_empty());
        let artefact = CompiledArtefact { nodes };
        let ctx = materialize(&artefact, std::path::Path::new("main.dspec")).unwrap();

        assert!(ctx.has_focused_descendant);
        assert!(ctx.children[0].focused);
    }
}
