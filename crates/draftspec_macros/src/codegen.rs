//! Code generation — lowers the DSL AST onto [`draftspec::dsl::Context`] calls.
//!
//! Unlike the teacher's codegen (which flattened inherited hooks by literally
//! duplicating each hook's token stream at every `it` call site, since its
//! `TestNode` tree had no notion of a stored, shared hook closure), this
//! generator does none of that: `draftspec::dsl::Context::before_each` et al.
//! already register a real `Fn()` closure that the tree-builder chains and
//! flattens at runtime (see `dsl.rs`), so the macro only needs to translate
//! nesting 1:1 — a `describe` block becomes a `ctx.describe(name, |ctx| {...})`
//! call, an `it` block becomes `ctx.it(name, || {...})`, and so on.

use proc_macro2::TokenStream;
use quote::quote;

use crate::dsl::*;

/// Lowers a parsed [`Suite`] into an expression of type `draftspec::SpecContext`,
/// built by calling [`draftspec::dsl::build_tree`] with the translated body.
pub fn generate(suite: Suite) -> TokenStream {
    let body = generate_items(&suite.items);
    quote! {
        ::draftspec::dsl::build_tree(|ctx| {
            #body
        })
    }
}

fn generate_items(items: &[DslItem]) -> TokenStream {
    let stmts: Vec<TokenStream> = items.iter().map(generate_item).collect();
    quote! { #(#stmts)* }
}

fn generate_item(item: &DslItem) -> TokenStream {
    match item {
        DslItem::Describe(d) => generate_describe(d),
        DslItem::It(it) => generate_it(it),
        DslItem::BeforeEach(h) => {
            let body = &h.body;
            quote! { ctx.before_each(|| { #body }); }
        }
        DslItem::AfterEach(h) => {
            let body = &h.body;
            quote! { ctx.after_each(|| { #body }); }
        }
        DslItem::BeforeAll(h) => {
            let body = &h.body;
            quote! { ctx.before_all(|| { #body }); }
        }
        DslItem::AfterAll(h) => {
            let body = &h.body;
            quote! { ctx.after_all(|| { #body }); }
        }
    }
}

fn generate_describe(d: &DescribeBlock) -> TokenStream {
    let name = &d.name;
    let inner = generate_items(&d.items);
    let method = if d.skipped {
        quote! { xdescribe }
    } else if d.focused {
        quote! { fdescribe }
    } else {
        quote! { describe }
    };
    quote! {
        ctx.#method(#name, |ctx| {
            #inner
        });
    }
}

fn generate_it(it: &ItBlock) -> TokenStream {
    let name = &it.name;
    let body = &it.body;
    let labels = &it.labels;

    let call = if it.skipped {
        quote! { ctx.xit(#name, || { #body }) }
    } else if it.focused {
        quote! { ctx.fit(#name, || { #body }) }
    } else {
        quote! { ctx.it(#name, || { #body }) }
    };

    if labels.is_empty() {
        quote! { #call; }
    } else {
        quote! { #call.tags(&[#(#labels),*]); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn generates_build_tree_call_for_nested_suite() {
        let suite: Suite = parse_quote! {
            describe "Calculator" {
                before_each { let x = 1; }
                it "adds" { assert_eq!(2 + 2, 4); }
            }
        };
        let tokens = generate(suite).to_string();
        assert!(tokens.contains("build_tree"));
        assert!(tokens.contains("describe"));
        assert!(tokens.contains("before_each"));
    }

    #[test]
    fn fdescribe_and_xdescribe_lower_onto_the_matching_context_method() {
        let suite: Suite = parse_quote! {
            fdescribe "focused group" {
                it "a" { assert!(true); }
            }
            xdescribe "skipped group" {
                it "b" { assert!(true); }
            }
        };
        let tokens = generate(suite).to_string();
        assert!(tokens.contains("fdescribe"));
        assert!(tokens.contains("xdescribe"));
    }
}
