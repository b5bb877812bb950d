//! Integration tests for the `suite!` proc macro (spec.md §8's S1/S2
//! scenarios, exercised through the macro-generated tree instead of
//! `dsl::build_tree` directly, since no other test in this crate drives the
//! macro all the way through a real `Runner::run`).

use draftspec::reporter::ReporterBus;
use draftspec::runner::{HostOptions, Runner};
use draftspec::suite;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn hook_order_matches_nested_describe_scenario() {
    let log: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let outer_before = log.clone();
    let inner_before = log.clone();
    let inner_after = log.clone();
    let outer_after = log.clone();
    let body_log = log.clone();

    let tree = suite! {
        describe "outer" {
            before_each {
                outer_before.lock().unwrap().push("oE");
            }
            after_each {
                outer_after.lock().unwrap().push("oA");
            }
            context "inner" {
                before_each {
                    inner_before.lock().unwrap().push("iE");
                }
                after_each {
                    inner_after.lock().unwrap().push("iA");
                }
                it "x" {
                    body_log.lock().unwrap().push("x");
                }
            }
        }
    };

    let runner = Runner::new(HostOptions {
        max_degree_of_parallelism: 1,
        ..HostOptions::default()
    });
    let report = runner.run(&tree, &ReporterBus::new()).unwrap();

    assert_eq!(report.passed, 1);
    assert_eq!(*log.lock().unwrap(), vec!["oE", "iE", "x", "iA", "oA"]);
}

#[test]
fn fit_focuses_and_skips_siblings() {
    let tree = suite! {
        describe "three specs" {
            it "a" { assert!(true); }
            fit "b" { assert!(true); }
            it "c" { assert!(true); }
        }
    };

    let runner = Runner::new(HostOptions::default());
    let report = runner.run(&tree, &ReporterBus::new()).unwrap();

    assert_eq!(report.passed, 1);
    assert_eq!(report.skipped, 2);
}

#[test]
fn xit_is_always_skipped_even_when_focused_elsewhere() {
    let tree = suite! {
        describe "group" {
            xit "disabled" { panic!("must never run"); }
            fit "focused" { assert!(true); }
        }
    };

    let runner = Runner::new(HostOptions::default());
    let report = runner.run(&tree, &ReporterBus::new()).unwrap();

    assert_eq!(report.passed, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn labels_lower_onto_tags_and_participate_in_filtering() {
    use draftspec::filter::{CompositeFilter, TagFilter};

    let tree = suite! {
        describe "group" {
            it "slow one" labels("slow") { assert!(true); }
            it "fast one" { assert!(true); }
        }
    };

    let filter = CompositeFilter::new().add(TagFilter::new(vec!["slow".to_string()], vec![]));
    let runner = Runner::new(HostOptions {
        filter,
        ..HostOptions::default()
    });
    let report = runner.run(&tree, &ReporterBus::new()).unwrap();

    assert_eq!(report.passed, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn before_all_runs_once_per_context_not_per_spec() {
    let calls = Arc::new(AtomicUsize::new(0));
    let inc = calls.clone();

    let tree = suite! {
        describe "group" {
            before_all {
                inc.fetch_add(1, Ordering::SeqCst);
            }
            it "one" { assert!(true); }
            it "two" { assert!(true); }
            it "three" { assert!(true); }
        }
    };

    let runner = Runner::new(HostOptions {
        max_degree_of_parallelism: 1,
        ..HostOptions::default()
    });
    let report = runner.run(&tree, &ReporterBus::new()).unwrap();

    assert_eq!(report.passed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
