//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use tempfile::TempDir;
use yang3::data::{Data, DataFormat, DataPrinterFlags, DataTree};

use crate::{Datastore, DbFormat, DbName, Error, PutOperation, parse_tree};

const SYSTEM_NS: &str = "urn:conifer:yang:conifer-system";

fn setup() -> (TempDir, Datastore) {
    conifer_yang::create_context(
        ["conifer-system".to_owned(), "conifer-interfaces".to_owned()],
    );
    let dir = TempDir::new().unwrap();
    let store =
        Datastore::new(dir.path(), DbFormat::Xml, false, true).unwrap();
    (dir, store)
}

fn tree(xml: &str) -> DataTree {
    parse_tree(xml, DbFormat::Xml).unwrap()
}

fn canon(dtree: &DataTree) -> String {
    dtree
        .print_string(
            DataFormat::XML,
            DataPrinterFlags::WITH_SIBLINGS
                | DataPrinterFlags::SHRINK
                | DataPrinterFlags::WD_TRIM,
        )
        .unwrap()
        .unwrap_or_default()
}

#[test]
fn create_exists_delete() {
    let (_dir, mut store) = setup();

    assert!(!store.exists(DbName::Running));
    store.create(DbName::Running).unwrap();
    assert!(store.exists(DbName::Running));
    assert!(matches!(
        store.create(DbName::Running),
        Err(Error::Exists(DbName::Running))
    ));

    store.delete(DbName::Running).unwrap();
    assert!(!store.exists(DbName::Running));
    // Idempotent.
    store.delete(DbName::Running).unwrap();
}

#[test]
fn get_missing_database() {
    let (_dir, mut store) = setup();
    assert!(matches!(
        store.get(DbName::Startup),
        Err(Error::NotFound(DbName::Startup))
    ));
}

#[test]
fn copy_preserves_content() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
            )),
        )
        .unwrap();

    store.copy(DbName::Running, DbName::Candidate).unwrap();

    let running = store.get(DbName::Running).unwrap();
    let candidate = store.get(DbName::Candidate).unwrap();
    assert_eq!(canon(&running), canon(&candidate));
    assert!(canon(&candidate).contains("alpha"));
}

#[test]
fn merge_is_idempotent() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();

    let payload = tree(&format!(
        "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname>\
         <contact>noc</contact></system>"
    ));
    store
        .put(DbName::Running, PutOperation::Merge, &payload)
        .unwrap();
    let once = canon(&store.get(DbName::Running).unwrap());

    store
        .put(DbName::Running, PutOperation::Merge, &payload)
        .unwrap();
    let twice = canon(&store.get(DbName::Running).unwrap());

    assert_eq!(once, twice);
}

#[test]
fn merge_matches_list_entries_by_key() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();

    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><ntp><server>\
                 <name>a</name><port>123</port></server></ntp></system>"
            )),
        )
        .unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><ntp><server>\
                 <name>a</name><port>1123</port></server></ntp></system>"
            )),
        )
        .unwrap();

    let running = store.get(DbName::Running).unwrap();
    let output = canon(&running);
    assert!(output.contains("1123"));
    assert_eq!(output.matches("<server>").count(), 1);
}

#[test]
fn replace_substitutes_content() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
            )),
        )
        .unwrap();

    store
        .put(
            DbName::Running,
            PutOperation::Replace,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><contact>noc</contact></system>"
            )),
        )
        .unwrap();

    let output = canon(&store.get(DbName::Running).unwrap());
    assert!(!output.contains("alpha"));
    assert!(output.contains("noc"));
}

#[test]
fn create_fails_when_data_exists() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();

    let payload = tree(&format!(
        "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
    ));
    store
        .put(DbName::Running, PutOperation::Create, &payload)
        .unwrap();
    assert!(matches!(
        store.put(DbName::Running, PutOperation::Create, &payload),
        Err(Error::DataExists(_))
    ));
}

#[test]
fn delete_fails_when_data_missing() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();

    let payload = tree(&format!(
        "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
    ));
    assert!(matches!(
        store.put(DbName::Running, PutOperation::Delete, &payload),
        Err(Error::DataMissing(_))
    ));

    // Remove of absent data is accepted.
    store
        .put(DbName::Running, PutOperation::Remove, &payload)
        .unwrap();
}

#[test]
fn delete_removes_list_entry_addressed_by_key() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><ntp>\
                 <server><name>a</name><port>123</port></server>\
                 <server><name>b</name><port>123</port></server>\
                 </ntp></system>"
            )),
        )
        .unwrap();

    store
        .put(
            DbName::Running,
            PutOperation::Delete,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><ntp><server>\
                 <name>a</name></server></ntp></system>"
            )),
        )
        .unwrap();

    let output = canon(&store.get(DbName::Running).unwrap());
    assert!(!output.contains("<name>a</name>"));
    assert!(output.contains("<name>b</name>"));
}

#[test]
fn get_xpath_filters_subtrees() {
    let (_dir, mut store) = setup();
    store.create(DbName::Running).unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
            )),
        )
        .unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(
                "<interfaces xmlns=\"urn:conifer:yang:conifer-interfaces\">\
                 <interface><name>eth0</name></interface></interfaces>",
            ),
        )
        .unwrap();

    let filtered = store
        .get_xpath(DbName::Running, "/conifer-system:system")
        .unwrap();
    let output = canon(&filtered);
    assert!(output.contains("alpha"));
    assert!(!output.contains("eth0"));
}

#[test]
fn lock_mutual_exclusion() {
    let (_dir, mut store) = setup();
    store.create(DbName::Candidate).unwrap();

    store.lock(DbName::Candidate, 1).unwrap();
    assert!(matches!(
        store.lock(DbName::Candidate, 2),
        Err(Error::Locked { db: DbName::Candidate, held_by: 1 })
    ));
    assert_eq!(store.is_locked(DbName::Candidate), Some(1));

    // Only the holder may unlock.
    assert!(matches!(
        store.unlock(DbName::Candidate, 2),
        Err(Error::Locked { db: DbName::Candidate, held_by: 1 })
    ));
    store.unlock(DbName::Candidate, 1).unwrap();
    store.lock(DbName::Candidate, 2).unwrap();
}

#[test]
fn unlock_requires_existing_lock() {
    let (_dir, mut store) = setup();
    assert!(matches!(
        store.unlock(DbName::Running, 1),
        Err(Error::NotLocked(DbName::Running))
    ));
}

#[test]
fn session_teardown_releases_locks() {
    let (_dir, mut store) = setup();
    store.lock(DbName::Running, 7).unwrap();
    store.lock(DbName::Candidate, 7).unwrap();
    store.lock(DbName::Startup, 8).unwrap();

    store.unlock_session(7);

    assert_eq!(store.is_locked(DbName::Running), None);
    assert_eq!(store.is_locked(DbName::Candidate), None);
    assert_eq!(store.is_locked(DbName::Startup), Some(8));
}

#[test]
fn write_access_checks_lock_holder() {
    let (_dir, mut store) = setup();
    store.lock(DbName::Candidate, 1).unwrap();

    store.verify_write_access(DbName::Candidate, 1).unwrap();
    assert!(matches!(
        store.verify_write_access(DbName::Candidate, 2),
        Err(Error::Locked { db: DbName::Candidate, held_by: 1 })
    ));
    store.verify_write_access(DbName::Running, 2).unwrap();
}

#[test]
fn writes_leave_no_staging_files() {
    let (dir, mut store) = setup();
    store.create(DbName::Running).unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
            )),
        )
        .unwrap();

    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let name = entry.unwrap().file_name();
        let name = name.to_string_lossy().into_owned();
        assert!(name.ends_with("_db"), "unexpected file: {name}");
    }
}

#[test]
fn cache_matches_disk_content() {
    let (dir, mut store) = setup();
    store.create(DbName::Running).unwrap();
    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&format!(
                "<system xmlns=\"{SYSTEM_NS}\"><hostname>alpha</hostname></system>"
            )),
        )
        .unwrap();
    let cached = canon(&store.get(DbName::Running).unwrap());

    // Re-read through a cacheless store over the same directory.
    let mut cold =
        Datastore::new(dir.path(), DbFormat::Xml, false, false).unwrap();
    let disk = canon(&cold.get(DbName::Running).unwrap());

    assert_eq!(cached, disk);
}
