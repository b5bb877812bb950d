//! # draftspec — a content-cached, middleware-pipelined BDD specification core
//!
//! Write spec trees either natively in Rust via [`dsl::Context`]:
//!
//! ```rust,no_run
//! fn main() {
//!     let tree = draftspec::dsl::build_tree(|ctx| {
//!         ctx.describe("Calculator", |ctx| {
//!             ctx.it("adds two numbers", || {
//!                 assert_eq!(2 + 3, 5);
//!             });
//!
//!             ctx.context("with negative numbers", |ctx| {
//!                 ctx.it("handles negatives", || {
//!                     assert_eq!(-1 + 1, 0);
//!                 });
//!             });
//!         });
//!     });
//!
//!     let runner = draftspec::runner::Runner::new(draftspec::runner::HostOptions::default());
//!     let mut reporters = draftspec::reporter::ReporterBus::new();
//!     reporters.register(draftspec::reporter::ConsoleReporter::new());
//!     runner.run(&tree, &reporters).unwrap();
//! }
//! ```
//!
//! or declaratively in a `.dspec` manifest, loaded through [`host::load`] with
//! bodies resolved from [`registry`].

pub mod cache;
pub mod dsl;
pub mod error;
pub mod filter;
pub mod grammar;
pub mod host;
pub mod middleware;
pub mod parser;
pub mod partition;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod table;
pub mod tree;

pub use dsl::{build_tree, Context, ItBuilder};
pub use error::{DraftSpecError, Result};
pub use runner::{HostOptions, Runner};
pub use tree::{Failure, RunReport, SpecContext, SpecDefinition, SpecExecutionContext, SpecResult, Status};

// `register_body!` is already available at the crate root via `#[macro_export]`
// on its `macro_rules!` definition in `registry`.

/// Re-export of the [`draftspec_macros::suite!`] proc macro, available with
/// the default `macros` feature.
#[cfg(feature = "macros")]
pub use draftspec_macros::suite;
