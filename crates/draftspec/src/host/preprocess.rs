//! Preprocessing (spec.md §4.2 step 1): depth-first `include` expansion,
//! `reference`/`use` directive extraction and hoisting, cycle detection.
//!
//! This is a line-oriented pass over the raw manifest text, deliberately kept
//! separate from [`crate::grammar`]'s tokenizer: includes must be expanded
//! *before* the combined source is parsed (an included file can itself contain
//! further includes), so this module only needs to recognise the three
//! directive lines, not the full grammar.

use crate::error::{DraftSpecError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// The framework's own package name. A `reference "package:draftspec"` (or
/// bare `reference "draftspec"`) names the framework itself and is elided
/// rather than hoisted — a manifest never needs to declare a dependency on
/// the thing interpreting it.
const FRAMEWORK_PACKAGE_NAME: &str = "draftspec";

/// Output of preprocessing one entry-point manifest.
pub struct PreprocessResult {
    /// Combined, include-expanded source with `reference`/`use` directives
    /// hoisted to the top, deduplicated.
    pub combined_source: String,
    /// `(canonical path, sha256 hex digest)` for the entry file and every file
    /// transitively included — feeds the cache key (spec.md §4.2).
    pub file_hashes: Vec<(PathBuf, String)>,
}

/// Preprocesses `entry` and everything it transitively includes.
pub fn preprocess(entry: &Path) -> Result<PreprocessResult> {
    let mut visited = HashSet::new();
    let mut file_hashes = Vec::new();
    let mut references = Vec::new();
    let mut uses = Vec::new();
    let body = expand(entry, &mut visited, &mut file_hashes, &mut references, &mut uses)?;

    dedup_preserve_order(&mut references);
    dedup_preserve_order(&mut uses);

    let mut combined_source = String::new();
    for u in &uses {
        combined_source.push_str("use \"");
        combined_source.push_str(u);
        combined_source.push_str("\"\n");
    }
    for r in &references {
        combined_source.push_str("reference \"");
        combined_source.push_str(r);
        combined_source.push_str("\"\n");
    }
    combined_source.push_str(&body);

    Ok(PreprocessResult {
        combined_source,
        file_hashes,
    })
}

fn expand(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
    file_hashes: &mut Vec<(PathBuf, String)>,
    references: &mut Vec<String>,
    uses: &mut Vec<String>,
) -> Result<String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical.clone()) {
        // Cycle: per spec.md Testable Property 10, a repeat visit is a silent
        // no-op, not an error — preprocessing must still terminate.
        return Ok(String::new());
    }

    let contents = fs::read_to_string(path).map_err(|e| DraftSpecError::Preprocess {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    file_hashes.push((canonical, hex::encode(hasher.finalize())));

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out = String::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if let Some(rest) = directive_arg(trimmed, "include") {
            let included_path = dir.join(rest);
            let expanded = expand(&included_path, visited, file_hashes, references, uses)?;
            out.push_str(&expanded);
            out.push('\n');
        } else if let Some(rest) = directive_arg(trimmed, "reference") {
            if let Some(resolved) = resolve_reference(rest, dir) {
                references.push(resolved);
            }
        } else if let Some(rest) = directive_arg(trimmed, "use") {
            uses.push(rest.to_string());
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    Ok(out)
}

/// Resolves a `reference "target"` directive's argument per spec.md §6:
/// entries naming the framework itself (`draftspec` or `package:draftspec`)
/// are elided (`None`) since a manifest never depends on its own host; a
/// `package:Name[,version]`-style token names an external registry entry and
/// is forwarded unresolved, the same way `include`'s target is left to the
/// caller's own namespace; anything else is a filesystem-style reference,
/// resolved relative to the including file's directory exactly as `include`
/// resolves its own path via `dir.join(rest)`.
fn resolve_reference(target: &str, including_dir: &Path) -> Option<String> {
    if is_framework_self_reference(target) {
        return None;
    }
    if target.starts_with("package:") {
        return Some(target.to_string());
    }
    Some(including_dir.join(target).to_string_lossy().into_owned())
}

fn is_framework_self_reference(target: &str) -> bool {
    let name = target.strip_prefix("package:").unwrap_or(target);
    let name = name.split(',').next().unwrap_or(name).trim();
    name == FRAMEWORK_PACKAGE_NAME
}

/// Recognises a bare `keyword "arg"` line and returns `arg`, or `None` if `line`
/// isn't that directive (so it's passed through untouched).
fn directive_arg<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    let rest = rest.strip_prefix(|c: char| c.is_whitespace())?.trim();
    let rest = rest.strip_prefix('"')?;
    rest.strip_suffix('"')
}

fn dedup_preserve_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

/// Minimal hex encoding so we don't pull in a second crate for it — `sha2`
/// already gives us bytes, and the cache key format is simple lowercase hex.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let mut s = String::with_capacity(bytes.as_ref().len() * 2);
        for b in bytes.as_ref() {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expands_single_level_include() {
        let dir = tempfile::tempdir().unwrap();
        let included = dir.path().join("helpers.dspec");
        fs::File::create(&included)
            .unwrap()
            .write_all(b"it \"helper spec\"\n")
            .unwrap();

        let main = dir.path().join("main.dspec");
        fs::File::create(&main)
            .unwrap()
            .write_all(b"include \"helpers.dspec\"\nit \"main spec\"\n")
            .unwrap();

        let result = preprocess(&main).unwrap();
        assert!(result.combined_source.contains("helper spec"));
        assert!(result.combined_source.contains("main spec"));
        assert_eq!(result.file_hashes.len(), 2);
    }

    #[test]
    fn include_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.dspec");
        let b = dir.path().join("b.dspec");
        fs::File::create(&a)
            .unwrap()
            .write_all(b"include \"b.dspec\"\nit \"a spec\"\n")
            .unwrap();
        fs::File::create(&b)
            .unwrap()
            .write_all(b"include \"a.dspec\"\nit \"b spec\"\n")
            .unwrap();

        let result = preprocess(&a).unwrap();
        assert!(result.combined_source.contains("a spec"));
        assert!(result.combined_source.contains("b spec"));
    }

    #[test]
    fn reference_and_use_directives_are_hoisted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.dspec");
        fs::File::create(&main)
            .unwrap()
            .write_all(
                b"use \"shared::matchers\"\nreference \"package:Assertions\"\nuse \"shared::matchers\"\nit \"x\"\n",
            )
            .unwrap();

        let result = preprocess(&main).unwrap();
        let lines: Vec<&str> = result.combined_source.lines().collect();
        assert_eq!(lines[0], "use \"shared::matchers\"");
        assert_eq!(lines[1], "reference \"package:Assertions\"");
        assert_eq!(result.combined_source.matches("shared::matchers").count(), 1);
    }

    #[test]
    fn filesystem_reference_resolves_relative_to_the_including_file() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.dspec");
        fs::File::create(&main)
            .unwrap()
            .write_all(b"reference \"shared/assertions.dspec\"\nit \"x\"\n")
            .unwrap();

        let result = preprocess(&main).unwrap();
        let expected = dir.path().join("shared/assertions.dspec");
        assert!(result
            .combined_source
            .contains(&format!("reference \"{}\"", expected.to_string_lossy())));
    }

    #[test]
    fn self_reference_to_the_framework_is_elided() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.dspec");
        fs::File::create(&main)
            .unwrap()
            .write_all(b"reference \"package:draftspec\"\nit \"x\"\n")
            .unwrap();

        let result = preprocess(&main).unwrap();
        assert!(!result.combined_source.contains("reference"));
    }
}
