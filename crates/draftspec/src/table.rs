//! Table-driven specs (`withData`) — parameterized rows expanded into sibling
//! specs inside a describe group, grounded on the teacher's `table.rs`.
//!
//! Unlike the teacher's `TableBuilder`, which type-erases each row behind
//! `Box<dyn Any>` and downcasts in `run()`, this builder is generic over a single
//! row type `T` fixed at [`crate::dsl::Context::with_data`] call time — there is
//! no mixed-type table in this DSL, so the erase/downcast dance buys nothing and
//! a plain `Vec<T>` is both simpler and panic-free.

use crate::dsl::with_builder_for_table;
use crate::tree::SpecDefinition;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

pub struct TableBuilder<T> {
    base_name: String,
    rows: Vec<(Option<String>, T)>,
}

impl<T: std::fmt::Debug + Clone + Send + Sync + 'static> TableBuilder<T> {
    pub(crate) fn new(base_name: String) -> Self {
        TableBuilder {
            base_name,
            rows: Vec::new(),
        }
    }

    /// Add a labelled row.
    pub fn row(mut self, label: &str, data: T) -> Self {
        self.rows.push((Some(label.to_string()), data));
        self
    }

    /// Add an unlabelled row; its description is templated from the row index
    /// and `{row:?}` (SPEC_FULL.md §4.3).
    pub fn case(mut self, data: T) -> Self {
        self.rows.push((None, data));
        self
    }

    /// Expand every row into a sibling spec, each running `test_fn` against its data.
    #[track_caller]
    pub fn run(self, test_fn: impl Fn(&T) + Send + Sync + 'static) {
        let location = Location::caller();
        let test_fn = Arc::new(test_fn);

        with_builder_for_table(|b| b.push_group(self.base_name.clone()));

        for (i, (label, data)) in self.rows.into_iter().enumerate() {
            let description = match &label {
                Some(label) => label.clone(),
                None => format!("{} [{}]: {:?}", self.base_name, i, data),
            };
            let test_fn = test_fn.clone();
            let body = move || test_fn(&data);

            let spec = SpecDefinition::new(
                description,
                Some(Arc::new(body)),
                false,
                false,
                Default::default(),
                PathBuf::from(location.file()),
                location.line(),
            );
            with_builder_for_table(|b| b.push_spec(spec));
        }

        with_builder_for_table(|b| b.pop_group());
    }
}

#[cfg(test)]
mod tests {
    use crate::dsl::build_tree;

    #[test]
    fn table_rows_become_sibling_specs() {
        let tree = build_tree(|ctx| {
            ctx.with_data::<(i32, i32, i32)>("addition")
                .row("small", (2, 3, 5))
                .case((10, 20, 30))
                .run(|(a, b, expected)| assert_eq!(a + b, *expected));
        });

        let group = &tree.children[0];
        assert_eq!(group.specs.len(), 2);
        assert_eq!(group.specs[0].description, "small");
        assert!(group.specs[1].description.starts_with("addition [1]:"));
    }
}
