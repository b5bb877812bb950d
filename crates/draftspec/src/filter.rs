//! Filter (C9, spec.md §4.8): composable predicates over a spec — tag
//! include/exclude, description regex, file-path glob, exact `(path, line)`,
//! and an externally-supplied "affected specs" predicate.
//!
//! No teacher counterpart (the teacher's only filtering is a plain substring
//! match on `--filter` in `RunConfig`). Regex filtering uses the `regex` crate
//! the way `janvanwassenhove-mITyFactory` does for config/path matching; the
//! glob matcher is hand-rolled in the same tokenizer style as `grammar.rs`
//! rather than pulling in a dedicated glob crate the pack never reaches for.

use regex::RegexBuilder;
use std::collections::HashSet;
use std::path::Path;

/// A single evaluatable spec, decoupled from [`crate::tree::SpecDefinition`] so
/// both the live runner and the Static Parser's discovery output can be filtered
/// with the same code.
pub struct FilterSubject<'a> {
    pub description_path: &'a str,
    pub tags: &'a HashSet<String>,
    pub source_file: &'a Path,
    pub source_line: u32,
}

pub trait Predicate: Send + Sync {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool;
}

/// OR within an include/exclude tag set, AND across the two sets: a spec
/// passes if (no include tags OR it has at least one) AND (no exclude tags OR
/// it has none of them).
pub struct TagFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl TagFilter {
    pub fn new(include: impl IntoIterator<Item = String>, exclude: impl IntoIterator<Item = String>) -> Self {
        TagFilter {
            include: include.into_iter().collect(),
            exclude: exclude.into_iter().collect(),
        }
    }
}

impl Predicate for TagFilter {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        let include_ok = self.include.is_empty() || self.include.iter().any(|t| subject.tags.contains(t));
        let exclude_ok = self.exclude.is_empty() || self.exclude.iter().all(|t| !subject.tags.contains(t));
        include_ok && exclude_ok
    }
}

/// Matches the full description path against a regex. The pattern is compiled
/// with a bounded DFA size so a pathological pattern fails fast (an error) at
/// construction instead of causing unbounded backtracking at match time — the
/// "bounded evaluation budget" spec.md requires.
pub struct NameFilter {
    regex: regex::Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .dfa_size_limit(1 << 20)
            .build()?;
        Ok(NameFilter { regex })
    }
}

impl Predicate for NameFilter {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        self.regex.is_match(subject.description_path)
    }
}

/// A hand-rolled `*`/`**`/`?` glob over a file path, matched against the raw
/// path string (not the filesystem) since discovery results may reference
/// files that no longer exist by the time a filter runs.
pub struct PathGlobFilter {
    pattern: Vec<GlobToken>,
}

#[derive(Clone)]
enum GlobToken {
    Literal(char),
    Star,
    StarStar,
    Question,
}

impl PathGlobFilter {
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let chars: Vec<char> = pattern.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' if chars.get(i + 1) == Some(&'*') => {
                    tokens.push(GlobToken::StarStar);
                    i += 2;
                }
                '*' => {
                    tokens.push(GlobToken::Star);
                    i += 1;
                }
                '?' => {
                    tokens.push(GlobToken::Question);
                    i += 1;
                }
                c => {
                    tokens.push(GlobToken::Literal(c));
                    i += 1;
                }
            }
        }
        PathGlobFilter { pattern: tokens }
    }
}

impl Predicate for PathGlobFilter {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        let text: Vec<char> = subject.source_file.to_string_lossy().chars().collect();
        glob_match(&self.pattern, 0, &text, 0)
    }
}

fn glob_match(pattern: &[GlobToken], pi: usize, text: &[char], ti: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }
    match &pattern[pi] {
        GlobToken::Literal(c) => ti < text.len() && text[ti] == *c && glob_match(pattern, pi + 1, text, ti + 1),
        GlobToken::Question => ti < text.len() && glob_match(pattern, pi + 1, text, ti + 1),
        GlobToken::Star => {
            // `*` matches within one path segment (no `/`).
            let mut j = ti;
            loop {
                if glob_match(pattern, pi + 1, text, j) {
                    return true;
                }
                if j >= text.len() || text[j] == '/' {
                    return false;
                }
                j += 1;
            }
        }
        GlobToken::StarStar => {
            let mut j = ti;
            loop {
                if glob_match(pattern, pi + 1, text, j) {
                    return true;
                }
                if j >= text.len() {
                    return false;
                }
                j += 1;
            }
        }
    }
}

/// Matches an exact `(path, line)` pair — used for "run just this one spec".
pub struct ExactLocationFilter {
    path: std::path::PathBuf,
    line: u32,
}

impl ExactLocationFilter {
    pub fn new(path: impl Into<std::path::PathBuf>, line: u32) -> Self {
        ExactLocationFilter {
            path: path.into(),
            line,
        }
    }
}

impl Predicate for ExactLocationFilter {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        subject.source_line == self.line && subject.source_file == self.path
    }
}

/// An external impact analyser plugs in an arbitrary predicate (spec.md §4.8's
/// "affected specs" filter supplied per context).
pub struct AffectedSpecsFilter {
    predicate: Box<dyn Fn(&FilterSubject<'_>) -> bool + Send + Sync>,
}

impl AffectedSpecsFilter {
    pub fn new(predicate: impl Fn(&FilterSubject<'_>) -> bool + Send + Sync + 'static) -> Self {
        AffectedSpecsFilter {
            predicate: Box::new(predicate),
        }
    }
}

impl Predicate for AffectedSpecsFilter {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        (self.predicate)(subject)
    }
}

/// AND-composes any number of predicates; empty composite matches everything.
#[derive(Default)]
pub struct CompositeFilter {
    predicates: Vec<Box<dyn Predicate>>,
}

impl CompositeFilter {
    pub fn new() -> Self {
        CompositeFilter::default()
    }

    pub fn add(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }
}

impl Predicate for CompositeFilter {
    fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        self.predicates.iter().all(|p| p.matches(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>(description_path: &'a str, tags: &'a HashSet<String>, file: &'a Path) -> FilterSubject<'a> {
        FilterSubject {
            description_path,
            tags,
            source_file: file,
            source_line: 10,
        }
    }

    #[test]
    fn tag_filter_ors_within_ands_across() {
        let filter = TagFilter::new(vec!["fast".to_string()], vec!["flaky".to_string()]);
        let mut tags = HashSet::new();
        tags.insert("fast".to_string());
        let path = Path::new("a.dspec");
        assert!(filter.matches(&subject("a", &tags, path)));

        tags.insert("flaky".to_string());
        assert!(!filter.matches(&subject("a", &tags, path)));
    }

    #[test]
    fn glob_matches_double_star_across_segments() {
        let filter = PathGlobFilter::new("specs/**/*.dspec");
        let tags = HashSet::new();
        assert!(filter.matches(&subject("x", &tags, Path::new("specs/a/b/c.dspec"))));
        assert!(!filter.matches(&subject("x", &tags, Path::new("other/c.dspec"))));
    }

    #[test]
    fn composite_filter_ands_all_predicates() {
        let tags = HashSet::new();
        let composite = CompositeFilter::new()
            .add(NameFilter::new("adds").unwrap())
            .add(PathGlobFilter::new("*.dspec"));
        assert!(composite.matches(&subject("calculator adds", &tags, Path::new("main.dspec"))));
        assert!(!composite.matches(&subject("calculator subtracts", &tags, Path::new("main.dspec"))));
    }
}
