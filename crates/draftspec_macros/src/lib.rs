//! Proc macros for embedding `draftspec` specs directly in Rust source.
//!
//! Complements the `.dspec` manifest path ([`draftspec::host`]): where a
//! manifest declares structure as data and resolves bodies from
//! [`draftspec::registry`] at materialize time, `suite!` declares the same
//! structure as real Rust code, compiled straight into closures — no registry,
//! no cache, no preprocessing. Both paths build the identical
//! `draftspec::SpecContext` shape.

mod codegen;
mod dsl;

/// Declares a spec tree using the Ginkgo/RSpec-inspired DSL and expands to a
/// `draftspec::SpecContext` expression.
///
/// # Example
///
/// ```rust,ignore
/// let tree = draftspec_macros::suite! {
///     describe "Calculator" {
///         before_each {
///             let calc = Calculator::new();
///         }
///
///         it "adds two numbers" {
///             assert_eq!(calc.add(2, 3), 5);
///         }
///
///         context "with negative numbers" {
///             it "handles negatives" {
///                 assert_eq!(calc.add(-1, 3), 2);
///             }
///         }
///     }
/// };
/// ```
///
/// # Supported DSL keywords
///
/// - `describe "name" { ... }` / `context "name" { ... }` / `when "name" { ... }`
/// - `fdescribe` / `fcontext` / `fwhen`, `xdescribe` / `xcontext` / `xwhen`
/// - `it "name" { ... }` / `specify "name" { ... }`, with `fit` / `xit`
/// - `it "name" labels("slow") { ... }` — lowered onto `Context::tag`
/// - `before_each` / `after_each` / `before_all` / `after_all { ... }`
#[proc_macro]
pub fn suite(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let suite = syn::parse_macro_input!(input as dsl::Suite);
    codegen::generate(suite).into()
}
