//! Integration tests for the ID registry over real source trees

mod common;

use common::builders::SourceTree;
use proptest::prelude::*;
use std::collections::HashSet;
use trice_rs::id::{self, IdPolicy, IdRegistry, Location, SourceEntry, SourceText, SyncOptions};
use trice_rs::{FormatTable, IdRange, LocationTable, TriceError, TriceFmt, TriceId};

#[test]
fn test_update_assigns_and_persists() {
    let tree = SourceTree::new().file("main.c", "TRICE8(Id(0), \"value=%d\", -2);\n");
    let report = id::update(tree.options(IdRange::DEFAULT), &tree.walker()).unwrap();

    assert_eq!(report.added, vec![(TriceId(1), TriceFmt::new("TRICE8", "value=%d"))]);
    assert_eq!(tree.read("main.c"), "TRICE8(Id(1), \"value=%d\", -2);\n");

    let til = FormatTable::load(tree.path("til.json")).unwrap();
    assert_eq!(til.get(TriceId(1)), Some(&TriceFmt::new("TRICE8", "value=%d")));
    let raw = tree.read_root("til.json");
    assert!(raw.contains("\"Type\": \"TRICE8\""));
    assert!(raw.contains("\"Strg\": \"value=%d\""));
    assert!(raw.ends_with('\n'));

    let li = LocationTable::load(tree.path("li.json")).unwrap();
    let loc = li.get(TriceId(1)).unwrap();
    assert_eq!(loc.file, "main.c");
    assert_eq!(loc.line, 1);
}

#[test]
fn test_second_pass_is_a_no_op() {
    let tree = SourceTree::new()
        .file("a.c", "TRICE(Id(0), \"one\");\nTRICE16_1(Id(0), \"two %u\", x);\n")
        .file("drivers/uart.c", "trice(iD(0), \"three\");\n");
    let options = tree.options(IdRange::new(100, 199));

    let first = id::update(options.clone(), &tree.walker()).unwrap();
    assert_eq!(first.added.len(), 3);
    let til_before = tree.read_root("til.json");
    let li_before = tree.read_root("li.json");
    let a_before = tree.read("a.c");

    let second = id::update(options, &tree.walker()).unwrap();
    assert!(second.added.is_empty());
    assert!(second.changed.is_empty());
    assert!(second.collisions.is_empty());
    assert_eq!(tree.read_root("til.json"), til_before);
    assert_eq!(tree.read_root("li.json"), li_before);
    assert_eq!(tree.read("a.c"), a_before);
}

#[test]
fn test_table_save_is_byte_stable() {
    let tree = SourceTree::new()
        .file("a.c", "TRICE(Id(0), \"x\");\nTRICE(Id(0), \"y\");\nTRICE(Id(0), \"z\");\n");
    let mut options = tree.options(IdRange::new(1, 50));
    options.policy = IdPolicy::Downward;
    id::update(options, &tree.walker()).unwrap();

    let first = tree.read_root("til.json");
    FormatTable::load(tree.path("til.json"))
        .unwrap()
        .save(tree.path("til.json"))
        .unwrap();
    assert_eq!(tree.read_root("til.json"), first);

    // Downward policy hands out 50, 49, 48; keys are still written ascending
    let p48 = first.find("\"48\"").unwrap();
    let p50 = first.find("\"50\"").unwrap();
    assert!(p48 < p50);
}

#[test]
fn test_shared_format_resolves_to_first_site() {
    let tree = SourceTree::new()
        .file("a.c", "TRICE(Id(0), \"same\");\n")
        .file("b/b.c", "TRICE(Id(0), \"same\");\n");
    let report = id::update(tree.options(IdRange::new(10, 20)), &tree.walker()).unwrap();

    assert_eq!(report.added.len(), 1);
    assert_eq!(report.reused, 1);
    assert_eq!(tree.read("a.c"), "TRICE(Id(10), \"same\");\n");
    // Reused IDs are not written back unless asked for
    assert_eq!(tree.read("b/b.c"), "TRICE(Id(0), \"same\");\n");
}

#[test]
fn test_share_rewrite_option() {
    let tree = SourceTree::new()
        .file("a.c", "TRICE(Id(0), \"same\");\n")
        .file("b/b.c", "TRICE(Id(0), \"same\");\n");
    let options = SyncOptions {
        share_rewrite: true,
        ..tree.options(IdRange::new(10, 20))
    };
    id::update(options, &tree.walker()).unwrap();
    assert_eq!(tree.read("b/b.c"), "TRICE(Id(10), \"same\");\n");
}

#[test]
fn test_collision_is_reported_not_resolved() {
    let tree = SourceTree::new().file("a.c", "TRICE(Id(5), \"new text\");\n");
    let table: FormatTable = [(TriceId(5), TriceFmt::new("TRICE", "old text"))]
        .into_iter()
        .collect();
    table.save(tree.path("til.json")).unwrap();

    let report = id::update(tree.options(IdRange::new(1, 9)), &tree.walker()).unwrap();
    assert_eq!(report.collisions.len(), 1);
    assert!(matches!(
        report.collisions[0],
        TriceError::Collision { id: TriceId(5), .. }
    ));

    let til = FormatTable::load(tree.path("til.json")).unwrap();
    assert_eq!(til.get(TriceId(5)).unwrap().format_string, "old text");
    assert_eq!(til.len(), 1);
    assert_eq!(tree.read("a.c"), "TRICE(Id(5), \"new text\");\n");
}

#[test]
fn test_dry_run_leaves_sources_and_til() {
    let tree = SourceTree::new().file("a.c", "TRICE(Id(0), \"x\");\n");
    let options = SyncOptions {
        dry_run: true,
        ..tree.options(IdRange::DEFAULT)
    };
    let report = id::update(options, &tree.walker()).unwrap();

    assert_eq!(report.added.len(), 1);
    assert_eq!(report.changed, vec!["a.c".to_string()]);
    assert_eq!(tree.read("a.c"), "TRICE(Id(0), \"x\");\n");
    assert!(!tree.path("til.json").exists());
}

#[test]
fn test_disabled_location_table() {
    let tree = SourceTree::new().file("a.c", "TRICE(Id(0), \"x\");\n");
    let options = SyncOptions {
        li: "off".into(),
        ..tree.options(IdRange::DEFAULT)
    };
    id::update(options, &tree.walker()).unwrap();
    assert!(!tree.path("li.json").exists());
    assert!(!tree.root().join("off").exists());
}

#[test]
fn test_non_utf8_source_gets_id_and_keeps_bytes() {
    let tree = SourceTree::new().file_bytes(
        "main.c",
        b"// Z\xe4hler\nTRICE8(Id(0), \"value=%d\", -2);\n",
    );
    let report = id::update(tree.options(IdRange::DEFAULT), &tree.walker()).unwrap();

    assert!(report.io_errors.is_empty());
    assert_eq!(report.added.len(), 1);
    assert_eq!(
        tree.read_bytes("main.c"),
        b"// Z\xe4hler\nTRICE8(Id(1), \"value=%d\", -2);\n".to_vec()
    );

    let zeroed = id::zero_source_tree(&tree.walker(), false);
    assert_eq!(zeroed.zeroed, 1);
    assert_eq!(
        tree.read_bytes("main.c"),
        b"// Z\xe4hler\nTRICE8(Id(0), \"value=%d\", -2);\n".to_vec()
    );
}

#[test]
fn test_unreadable_file_is_reported_and_skipped() {
    let tree = SourceTree::new()
        .file("a.c", "TRICE(Id(0), \"a\");\n")
        .file("c.c", "TRICE(Id(0), \"c\");\n");
    let mut entries = tree.walker().files();
    // A file that vanished between walk and read
    entries.insert(
        1,
        SourceEntry {
            path: tree.src().join("b.c"),
            relative: "b.c".to_string(),
        },
    );

    let mut registry = IdRegistry::load(tree.options(IdRange::new(1, 9))).unwrap();
    let report = registry.synchronize_entries(entries);
    registry.persist(&report).unwrap();

    assert_eq!(report.io_errors.len(), 1);
    assert!(report.io_errors[0].to_string().contains("b.c"));
    assert!(!report.io_errors[0].is_fatal());
    assert_eq!(report.added.len(), 2);
    assert_eq!(tree.read("a.c"), "TRICE(Id(1), \"a\");\n");
    assert_eq!(tree.read("c.c"), "TRICE(Id(2), \"c\");\n");
}

#[test]
fn test_table_drift_is_reported() {
    let tree = SourceTree::new().file("a.c", "TRICE(Id(0), \"fresh\");\n");
    let til: FormatTable = [(TriceId(5), TriceFmt::new("TRICE", "gone"))]
        .into_iter()
        .collect();
    til.save(tree.path("til.json")).unwrap();
    let mut li = LocationTable::new();
    li.record(TriceId(6), Location::new("old.c", 3));
    li.save(tree.path("li.json")).unwrap();

    let report = id::update(tree.options(IdRange::new(5, 7)), &tree.walker()).unwrap();

    assert_eq!(report.drift.only_in_formats, vec![TriceId(5)]);
    assert_eq!(report.drift.only_in_locations, vec![TriceId(6)]);
    // Both drifted IDs stay out of the free space
    assert_eq!(report.added, vec![(TriceId(7), TriceFmt::new("TRICE", "fresh"))]);
}

#[test]
fn test_unwritable_table_is_fatal() {
    let tree = SourceTree::new().file("a.c", "TRICE(Id(0), \"x\");\n");
    std::fs::create_dir(tree.path("til.json")).unwrap();

    let err = id::update(tree.options(IdRange::DEFAULT), &tree.walker()).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_zero_then_update_restores_ids() {
    let tree = SourceTree::new().file(
        "a.c",
        "TRICE8_1(Id(0), \"a %d\", 1);\nTrice(iD(0), \"b\");\n",
    );
    let options = tree.options(IdRange::new(1, 99));
    id::update(options.clone(), &tree.walker()).unwrap();
    let assigned = tree.read("a.c");

    let zeroed = id::zero_source_tree(&tree.walker(), false);
    assert_eq!(zeroed.zeroed, 2);
    assert!(zeroed.errors.is_empty());
    assert_eq!(
        tree.read("a.c"),
        "TRICE8_1(Id(0), \"a %d\", 1);\nTrice(iD(0), \"b\");\n"
    );

    // The table still knows both formats: no new IDs, and with write-back
    // of reused IDs the assigned text comes back
    let report = id::update(options.clone(), &tree.walker()).unwrap();
    assert!(report.added.is_empty());
    assert_eq!(report.reused, 2);

    let rewrite = SyncOptions {
        share_rewrite: true,
        ..options
    };
    id::update(rewrite, &tree.walker()).unwrap();
    assert_eq!(tree.read("a.c"), assigned);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_new_ids_stay_in_range(min in 1u32..5000, span in 0u32..40, sites in 0usize..60) {
        let range = IdRange::new(min, min + span);
        let options = SyncOptions { range, ..SyncOptions::default() };
        let mut registry =
            IdRegistry::from_tables(options, FormatTable::new(), LocationTable::new());

        let text: String = (0..sites)
            .map(|i| format!("TRICE(Id(0), \"msg {}\");\n", i))
            .collect();
        let (_, report) = registry.synchronize_texts(&[SourceText::new("p.c", text)]);

        let ids: HashSet<TriceId> = report.added.iter().map(|(id, _)| *id).collect();
        prop_assert_eq!(ids.len(), report.added.len());
        prop_assert_eq!(ids.len(), sites.min(range.len()));
        for id in &ids {
            prop_assert!(range.contains(*id));
            prop_assert!(!id.is_sentinel());
        }
        prop_assert_eq!(report.parse_errors.len(), sites - ids.len());
    }
}
