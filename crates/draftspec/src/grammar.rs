//! The shared manifest grammar (`.dspec` files) — one tokenizer, one tolerant
//! recursive-descent parser, consumed by both the Script Host's default
//! compiler ([`crate::host::compiler`]) and the Static Parser ([`crate::parser`]).
//!
//! Grounded on the nesting shape of the teacher's `describe`/`it` call tree
//! (`context.rs`), translated from `syn`-driven proc-macro token parsing
//! (`draftspec_macros::dsl`) to a plain hand-rolled tokenizer over manifest text,
//! since these files are read at spec-load time rather than expanded at Rust
//! compile time.
//!
//! Grammar (informal):
//!
//! ```text
//! manifest   := stmt*
//! stmt       := describe | it | hook | tag_stmt | with_data | include | reference | use
//! describe   := ("describe" | "context" | "when"
//!               | "fdescribe" | "fcontext" | "fwhen"
//!               | "xdescribe" | "xcontext" | "xwhen") STRING "{" stmt* "}"
//! it         := ("it" | "fit" | "xit" | "specify") STRING ("{" field* "}")?
//! hook       := ("before_each" | "after_each" | "before_all" | "after_all") "{" field* "}"
//! tag_stmt   := "tag" STRING ("," STRING)*
//! with_data  := "with_data" STRING "{" row* field* "}"
//! row        := "row" STRING
//! field      := IDENT "=" STRING
//! include    := "include" STRING
//! reference  := "reference" STRING
//! use        := "use" STRING
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    BeforeEach,
    AfterEach,
    BeforeAll,
    AfterAll,
}

/// One parsed manifest node. Carries `line` throughout, since both consumers
/// (compiler diagnostics, static-parser discovery output) need source spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManifestNode {
    Describe {
        name: String,
        focused: bool,
        skipped: bool,
        line: u32,
        children: Vec<ManifestNode>,
    },
    Spec {
        name: String,
        focused: bool,
        skipped: bool,
        body_key: Option<String>,
        line: u32,
    },
    Tag {
        names: Vec<String>,
    },
    Hook {
        kind: HookKind,
        body_key: String,
        line: u32,
    },
    WithData {
        base_name: String,
        rows: Vec<String>,
        body_key: Option<String>,
        line: u32,
    },
    Include {
        path: String,
        line: u32,
    },
    Reference {
        target: String,
        line: u32,
    },
    Use {
        namespace: String,
        line: u32,
    },
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LBrace,
    RBrace,
    Eq,
    Comma,
}

struct Spanned {
    token: Token,
    line: u32,
}

fn tokenize(src: &str) -> (Vec<Spanned>, Vec<Diagnostic>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut line: u32 = 1;
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '{' => {
                tokens.push(Spanned {
                    token: Token::LBrace,
                    line,
                });
                i += 1;
            }
            '}' => {
                tokens.push(Spanned {
                    token: Token::RBrace,
                    line,
                });
                i += 1;
            }
            '=' => {
                tokens.push(Spanned {
                    token: Token::Eq,
                    line,
                });
                i += 1;
            }
            ',' => {
                tokens.push(Spanned {
                    token: Token::Comma,
                    line,
                });
                i += 1;
            }
            '"' => {
                let start_line = line;
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < chars.len() {
                    match chars[i] {
                        '"' => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        '\\' if i + 1 < chars.len() => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        '\n' => break,
                        other => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    diagnostics.push(Diagnostic {
                        message: "unterminated string literal".to_string(),
                        line: start_line,
                    });
                }
                tokens.push(Spanned {
                    token: Token::Str(s),
                    line: start_line,
                });
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Spanned {
                    token: Token::Ident(word),
                    line,
                });
            }
            other => {
                diagnostics.push(Diagnostic {
                    message: format!("unexpected character `{other}`"),
                    line,
                });
                i += 1;
            }
        }
    }

    (tokens, diagnostics)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .map(|s| s.line)
            .or_else(|| self.tokens.last().map(|s| s.line))
            .unwrap_or(0)
    }

    fn bump(&mut self) -> Option<Spanned> {
        if self.pos < self.tokens.len() {
            let tok = self.tokens.remove(self.pos);
            Some(tok)
        } else {
            None
        }
    }

    fn expect_ident(&mut self) -> Option<String> {
        match self.bump() {
            Some(Spanned {
                token: Token::Ident(s),
                ..
            }) => Some(s),
            other => {
                self.error_at_or_here(other, "expected identifier");
                None
            }
        }
    }

    fn expect_str(&mut self) -> Option<String> {
        match self.bump() {
            Some(Spanned {
                token: Token::Str(s),
                ..
            }) => Some(s),
            other => {
                self.error_at_or_here(other, "expected string literal");
                None
            }
        }
    }

    fn expect(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(t) if t == expected => {
                self.bump();
                true
            }
            _ => {
                let line = self.peek_line();
                self.diagnostics.push(Diagnostic {
                    message: format!("expected {expected:?}"),
                    line,
                });
                false
            }
        }
    }

    fn error_at_or_here(&mut self, consumed: Option<Spanned>, message: &str) {
        let line = consumed.as_ref().map(|s| s.line).unwrap_or_else(|| self.peek_line());
        self.diagnostics.push(Diagnostic {
            message: message.to_string(),
            line,
        });
    }

    /// Skips tokens until the start of the next top-level-looking statement,
    /// so one malformed statement doesn't swallow the rest of the file.
    fn resync(&mut self) {
        let mut depth: i32 = 0;
        while let Some(tok) = self.peek() {
            match tok {
                Token::LBrace => {
                    depth += 1;
                    self.bump();
                }
                Token::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.bump();
                }
                Token::Ident(_) if depth == 0 => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_block(&mut self) -> Vec<ManifestNode> {
        let mut nodes = Vec::new();
        while let Some(Token::Ident(kw)) = self.peek().cloned() {
            let before = self.pos;
            match self.parse_stmt(&kw) {
                Some(node) => nodes.push(node),
                None => {
                    if self.pos == before {
                        self.bump();
                    }
                    self.resync();
                }
            }
        }
        nodes
    }

    fn parse_stmt(&mut self, kw: &str) -> Option<ManifestNode> {
        match kw {
            "describe" | "context" | "when" => self.parse_describe(false, false),
            "fdescribe" | "fcontext" | "fwhen" => self.parse_describe(true, false),
            "xdescribe" | "xcontext" | "xwhen" => self.parse_describe(false, true),
            "it" | "specify" => self.parse_spec(false, false),
            "fit" => self.parse_spec(true, false),
            "xit" => self.parse_spec(false, true),
            "before_each" => self.parse_hook(HookKind::BeforeEach),
            "after_each" => self.parse_hook(HookKind::AfterEach),
            "before_all" => self.parse_hook(HookKind::BeforeAll),
            "after_all" => self.parse_hook(HookKind::AfterAll),
            "tag" | "tags" => self.parse_tag(),
            "with_data" => self.parse_with_data(),
            "include" => self.parse_single_path(|path, line| ManifestNode::Include { path, line }),
            "reference" => {
                self.parse_single_path(|target, line| ManifestNode::Reference { target, line })
            }
            "use" => self.parse_single_path(|namespace, line| ManifestNode::Use { namespace, line }),
            _ => {
                let line = self.peek_line();
                self.bump();
                self.diagnostics.push(Diagnostic {
                    message: format!("unknown keyword `{kw}`"),
                    line,
                });
                None
            }
        }
    }

    fn parse_describe(&mut self, focused: bool, skipped: bool) -> Option<ManifestNode> {
        let line = self.peek_line();
        self.bump();
        let name = self.expect_str()?;
        self.expect(&Token::LBrace);
        let children = self.parse_block();
        self.expect(&Token::RBrace);
        Some(ManifestNode::Describe {
            name,
            focused,
            skipped,
            line,
            children,
        })
    }

    fn parse_spec(&mut self, focused: bool, skipped: bool) -> Option<ManifestNode> {
        let line = self.peek_line();
        self.bump();
        let name = self.expect_str()?;
        let mut body_key = None;
        if matches!(self.peek(), Some(Token::LBrace)) {
            self.bump();
            for (k, v) in self.parse_fields() {
                if k == "body" {
                    body_key = Some(v);
                }
            }
            self.expect(&Token::RBrace);
        }
        Some(ManifestNode::Spec {
            name,
            focused,
            skipped,
            body_key,
            line,
        })
    }

    fn parse_hook(&mut self, kind: HookKind) -> Option<ManifestNode> {
        let line = self.peek_line();
        self.bump();
        self.expect(&Token::LBrace);
        let mut body_key = None;
        for (k, v) in self.parse_fields() {
            if k == "body" {
                body_key = Some(v);
            }
        }
        self.expect(&Token::RBrace);
        let body_key = body_key.unwrap_or_else(|| {
            self.diagnostics.push(Diagnostic {
                message: "hook is missing a `body = \"...\"` field".to_string(),
                line,
            });
            String::new()
        });
        Some(ManifestNode::Hook { kind, body_key, line })
    }

    fn parse_tag(&mut self) -> Option<ManifestNode> {
        self.bump();
        let mut names = vec![self.expect_str()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.bump();
            if let Some(s) = self.expect_str() {
                names.push(s);
            }
        }
        Some(ManifestNode::Tag { names })
    }

    fn parse_with_data(&mut self) -> Option<ManifestNode> {
        let line = self.peek_line();
        self.bump();
        let base_name = self.expect_str()?;
        self.expect(&Token::LBrace);
        let mut rows = Vec::new();
        let mut body_key = None;
        while let Some(Token::Ident(kw)) = self.peek().cloned() {
            match kw.as_str() {
                "row" => {
                    self.bump();
                    if let Some(s) = self.expect_str() {
                        rows.push(s);
                    }
                }
                "body" => {
                    self.bump();
                    self.expect(&Token::Eq);
                    if let Some(s) = self.expect_str() {
                        body_key = Some(s);
                    }
                }
                _ => break,
            }
        }
        self.expect(&Token::RBrace);
        Some(ManifestNode::WithData {
            base_name,
            rows,
            body_key,
            line,
        })
    }

    fn parse_single_path(
        &mut self,
        make: impl FnOnce(String, u32) -> ManifestNode,
    ) -> Option<ManifestNode> {
        let line = self.peek_line();
        self.bump();
        let path = self.expect_str()?;
        Some(make(path, line))
    }

    /// Parses `IDENT = STRING` pairs until a non-field-looking token.
    fn parse_fields(&mut self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(_)) => {
                    let key = self.expect_ident().unwrap_or_default();
                    if !self.expect(&Token::Eq) {
                        break;
                    }
                    let value = self.expect_str().unwrap_or_default();
                    fields.push((key, value));
                }
                _ => break,
            }
        }
        fields
    }
}

/// Parses `src` into a top-level list of [`ManifestNode`]s, tolerating malformed
/// statements by skipping to the next recognisable keyword and recording a
/// [`Diagnostic`] rather than aborting — matches spec.md §4.7's requirement that
/// the Static Parser return whatever parsed successfully plus a file-level error.
pub fn parse(src: &str) -> (Vec<ManifestNode>, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = tokenize(src);
    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: Vec::new(),
    };
    let nodes = parser.parse_block();
    diagnostics.extend(parser.diagnostics);
    if !parser.tokens.is_empty() {
        diagnostics.push(Diagnostic {
            message: "trailing content after top-level statements".to_string(),
            line: parser.tokens.first().map(|s| s.line).unwrap_or(0),
        });
    }
    (nodes, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_describe_with_hooks_and_specs() {
        let src = r#"
            describe "Calculator" {
                tag "math", "fast"
                before_each { body = "calc::reset" }
                it "adds" { body = "calc::adds" }
                fit "focused" { body = "calc::focused" }
                it "pending spec"
            }
        "#;
        let (nodes, diags) = parse(src);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            ManifestNode::Describe { name, children, .. } => {
                assert_eq!(name, "Calculator");
                assert_eq!(children.len(), 4);
            }
            other => panic!("expected Describe, got {other:?}"),
        }
    }

    #[test]
    fn with_data_collects_rows() {
        let src = r#"
            with_data "arithmetic" {
                row "2 + 2 = 4"
                row "3 + 3 = 6"
                body = "calc::row_check"
            }
        "#;
        let (nodes, diags) = parse(src);
        assert!(diags.is_empty());
        match &nodes[0] {
            ManifestNode::WithData { rows, body_key, .. } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(body_key.as_deref(), Some("calc::row_check"));
            }
            other => panic!("expected WithData, got {other:?}"),
        }
    }

    #[test]
    fn malformed_statement_yields_diagnostic_but_keeps_parsing() {
        let src = r#"
            describe "broken" {
                it
                it "recovered" { body = "x" }
            }
        "#;
        let (nodes, diags) = parse(src);
        assert!(!diags.is_empty());
        match &nodes[0] {
            ManifestNode::Describe { children, .. } => {
                assert!(children
                    .iter()
                    .any(|c| matches!(c, ManifestNode::Spec { name, .. } if name == "recovered")));
            }
            other => panic!("expected Describe, got {other:?}"),
        }
    }

    #[test]
    fn include_reference_use_directives_parse() {
        let src = r#"
            include "shared/helpers.dspec"
            reference "package:Assertions"
            use "shared::matchers"
        "#;
        let (nodes, diags) = parse(src);
        assert!(diags.is_empty());
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[0], ManifestNode::Include { .. }));
        assert!(matches!(nodes[1], ManifestNode::Reference { .. }));
        assert!(matches!(nodes[2], ManifestNode::Use { .. }));
    }
}
