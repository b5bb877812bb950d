//! Static Parser (C8, spec.md §4.7): discovers a manifest's structure —
//! describe/spec names, focus/skip, tags, source lines, static spec counts —
//! without executing anything or resolving a single body key. No `include`
//! expansion either: a discovery tool wants to know what one file declares,
//! not the fully-expanded tree [`crate::host`] would build from it.
//!
//! Reuses [`crate::grammar::parse`] directly on raw file text, the same
//! tolerant grammar the Script Host's default compiler uses — grounded on the
//! shared-grammar design documented there.

use crate::grammar::{self, Diagnostic, ManifestNode};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A describe/context/when group, discovered without executing anything.
#[derive(Debug, Clone)]
pub struct DiscoveredContext {
    pub name: String,
    pub tags: HashSet<String>,
    pub children: Vec<DiscoveredContext>,
    pub specs: Vec<DiscoveredSpec>,
    pub total_spec_count: usize,
    pub has_focused_descendant: bool,
}

/// A single spec leaf, discovered without resolving its body key.
#[derive(Debug, Clone)]
pub struct DiscoveredSpec {
    pub description: String,
    pub focused: bool,
    pub skipped: bool,
    pub pending: bool,
    pub tags: HashSet<String>,
    pub source_file: PathBuf,
    pub source_line: u32,
}

/// Parses one manifest file's text into a discovery tree plus any diagnostics
/// (spec.md §4.7: "return whatever parsed successfully plus errors", never a
/// hard failure on a malformed file).
pub fn discover(source_path: &Path, source: &str) -> (DiscoveredContext, Vec<Diagnostic>) {
    let (nodes, diagnostics) = grammar::parse(source);
    let root = build_discovered(String::new(), &nodes, source_path);
    (root, diagnostics)
}

fn build_discovered(name: String, nodes: &[ManifestNode], source_path: &Path) -> DiscoveredContext {
    let mut tags = HashSet::new();
    let mut children = Vec::new();
    let mut specs = Vec::new();

    for node in nodes {
        match node {
            ManifestNode::Tag { names } => tags.extend(names.iter().cloned()),
            ManifestNode::Describe {
                name: child_name,
                children: child_nodes,
                ..
            } => {
                children.push(build_discovered(child_name.clone(), child_nodes, source_path));
            }
            ManifestNode::Spec {
                name: spec_name,
                focused,
                skipped,
                body_key,
                line,
            } => {
                specs.push(DiscoveredSpec {
                    description: spec_name.clone(),
                    focused: *focused && !*skipped,
                    skipped: *skipped,
                    pending: body_key.is_none(),
                    tags: HashSet::new(),
                    source_file: source_path.to_path_buf(),
                    source_line: *line,
                });
            }
            ManifestNode::WithData { base_name, rows, line, .. } => {
                for (i, row) in rows.iter().enumerate() {
                    specs.push(DiscoveredSpec {
                        description: format!("{base_name} [{i}]: {row:?}"),
                        focused: false,
                        skipped: false,
                        pending: false,
                        tags: HashSet::new(),
                        source_file: source_path.to_path_buf(),
                        source_line: *line,
                    });
                }
            }
            // Hooks have no standalone discovery presence; include/reference/use
            // are provenance-only at this layer (no expansion happens here).
            ManifestNode::Hook { .. }
            | ManifestNode::Include { .. }
            | ManifestNode::Reference { .. }
            | ManifestNode::Use { .. } => {}
        }
    }

    let has_focused_descendant =
        specs.iter().any(|s| s.focused) || children.iter().any(|c| c.has_focused_descendant);
    let total_spec_count = specs.len() + children.iter().map(|c| c.total_spec_count).sum::<usize>();

    DiscoveredContext {
        name,
        tags,
        children,
        specs,
        total_spec_count,
        has_focused_descendant,
    }
}

/// Flattens a discovery tree into [`crate::filter::FilterSubject`]-compatible
/// rows, used by [`crate::partition::PartitionStrategy::SpecCount`] and by
/// pre-run filtering tools that want to know what *would* run without
/// compiling a single body closure.
pub fn count_specs(ctx: &DiscoveredContext) -> usize {
    ctx.total_spec_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_nested_structure_without_resolving_bodies() {
        let src = r#"
            describe "Calculator" {
                tag "math"
                it "adds" { body = "calc::adds" }
                it "someday"
                describe "division" {
                    fit "divides" { body = "calc::divides" }
                }
            }
        "#;
        let (root, diags) = discover(Path::new("calc.dspec"), src);
        assert!(diags.is_empty());
        assert_eq!(root.total_spec_count, 3);
        assert!(root.has_focused_descendant);

        let calculator = &root.children[0];
        assert!(calculator.tags.contains("math"));
        assert!(calculator.specs.iter().any(|s| s.description == "someday" && s.pending));
    }

    #[test]
    fn malformed_file_still_yields_partial_discovery() {
        let src = r#"
            describe "broken" {
                it
                it "recovered" { body = "x" }
            }
        "#;
        let (root, diags) = discover(Path::new("broken.dspec"), src);
        assert!(!diags.is_empty());
        assert_eq!(root.children[0].specs.len(), 1);
        assert_eq!(root.children[0].specs[0].description, "recovered");
    }

    #[test]
    fn count_specs_matches_total_spec_count_field() {
        let src = r#"it "a" { body = "x" }"#;
        let (root, _) = discover(Path::new("f.dspec"), src);
        assert_eq!(count_specs(&root), 1);
    }
}
