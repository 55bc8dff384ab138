//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use conifer_datastore::{DbName, Error as DsError, PutOperation};
use conifer_northbound::PluginRegistry;

use crate::northbound::commit;
use crate::northbound::testing::{
    RecorderPlugin, canon, hook_log, recorder_registry, setup_store,
    system_xml, tree,
};
use crate::northbound::{Error, Result};

fn commit_candidate(
    store: &mut conifer_datastore::Datastore,
    plugins: &mut PluginRegistry,
) -> Result<u32> {
    let mut next_txn_id = 0;
    commit::commit(store, plugins, &mut next_txn_id, DbName::Candidate)
}

#[test]
fn merge_then_commit() {
    let (_dir, mut store) = setup_store();
    let mut plugins = PluginRegistry::new();

    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>alpha</hostname>")),
        )
        .unwrap();
    store.copy(DbName::Running, DbName::Candidate).unwrap();
    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml("<contact>noc</contact>")),
        )
        .unwrap();

    commit_candidate(&mut store, &mut plugins).unwrap();

    let running = canon(&store.get(DbName::Running).unwrap());
    let candidate = canon(&store.get(DbName::Candidate).unwrap());
    assert_eq!(running, candidate);
    assert!(running.contains("alpha"));
    assert!(running.contains("noc"));
}

#[test]
fn noop_commit_skips_hooks() {
    let (_dir, mut store) = setup_store();
    let log = hook_log();
    let mut plugins = recorder_registry(vec![
        RecorderPlugin::new("p1", log.clone()),
    ]);

    store.copy(DbName::Running, DbName::Candidate).unwrap();
    let transaction_id =
        commit_candidate(&mut store, &mut plugins).unwrap();

    assert_eq!(transaction_id, 0);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn successful_commit_runs_hook_sequence_in_order() {
    let (_dir, mut store) = setup_store();
    let log = hook_log();
    let mut plugins = recorder_registry(vec![
        RecorderPlugin::new("p1", log.clone()),
        RecorderPlugin::new("p2", log.clone()),
    ]);

    store.copy(DbName::Running, DbName::Candidate).unwrap();
    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>alpha</hostname>")),
        )
        .unwrap();

    let transaction_id =
        commit_candidate(&mut store, &mut plugins).unwrap();
    assert_ne!(transaction_id, 0);

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        [
            "begin:p1", "begin:p2",
            "validate:p1", "validate:p2",
            "complete:p1", "complete:p2",
            "commit:p1", "commit:p2",
            "commit-done:p1", "commit-done:p2",
            // End runs in reverse registration order.
            "end:p2", "end:p1",
        ]
    );
}

// A rigged commit hook failure must leave running untouched, revert the
// plugins that had already committed and abort every plugin. Nobody sees
// commit-done.
#[test]
fn commit_phase_failure_reverts_running() {
    let (_dir, mut store) = setup_store();
    let log = hook_log();
    let mut p2 = RecorderPlugin::new("p2", log.clone());
    p2.fail_commit = true;
    let mut plugins = recorder_registry(vec![
        RecorderPlugin::new("p1", log.clone()),
        p2,
    ]);

    store.copy(DbName::Running, DbName::Candidate).unwrap();
    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>alpha</hostname>")),
        )
        .unwrap();

    let error = commit_candidate(&mut store, &mut plugins).unwrap_err();
    assert!(matches!(error, Error::TransactionCommit(_)));

    // Commit failure is invisible.
    assert_eq!(canon(&store.get(DbName::Running).unwrap()), "");

    let log = log.lock().unwrap();
    let revert: Vec<_> =
        log.iter().filter(|e| e.starts_with("revert:")).collect();
    let abort: Vec<_> =
        log.iter().filter(|e| e.starts_with("abort:")).collect();
    assert_eq!(revert, ["revert:p1"]);
    assert_eq!(abort, ["abort:p2", "abort:p1"]);
    assert!(!log.iter().any(|e| e.starts_with("commit-done:")));
    assert!(!log.iter().any(|e| e.starts_with("end:")));
}

#[test]
fn validate_phase_failure_leaves_running_untouched() {
    let (_dir, mut store) = setup_store();
    let log = hook_log();
    let mut p2 = RecorderPlugin::new("p2", log.clone());
    p2.fail_validate = true;
    let mut plugins = recorder_registry(vec![
        RecorderPlugin::new("p1", log.clone()),
        p2,
    ]);

    store
        .put(
            DbName::Running,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>alpha</hostname>")),
        )
        .unwrap();
    store.copy(DbName::Running, DbName::Candidate).unwrap();
    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml("<contact>noc</contact>")),
        )
        .unwrap();
    let before = canon(&store.get(DbName::Running).unwrap());

    let error = commit_candidate(&mut store, &mut plugins).unwrap_err();
    assert!(matches!(error, Error::TransactionValidate(_)));
    assert_eq!(canon(&store.get(DbName::Running).unwrap()), before);

    let log = log.lock().unwrap();
    assert!(!log.iter().any(|e| e.starts_with("commit:")));
    assert_eq!(
        log.iter().filter(|e| e.starts_with("abort:")).count(),
        2
    );
}

// YANG validation rejects a candidate that misses a mandatory leaf; the
// plugin hooks never run.
#[test]
fn schema_validation_failure_aborts_before_hooks() {
    let (_dir, mut store) = setup_store();
    let log = hook_log();
    let mut plugins = recorder_registry(vec![
        RecorderPlugin::new("p1", log.clone()),
    ]);

    store.copy(DbName::Running, DbName::Candidate).unwrap();
    // NTP server entry without the mandatory address leaf.
    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml(
                "<ntp><server><name>a</name></server></ntp>",
            )),
        )
        .unwrap();

    let error = commit_candidate(&mut store, &mut plugins).unwrap_err();
    assert!(matches!(error, Error::Validation(_)));
    assert_eq!(canon(&store.get(DbName::Running).unwrap()), "");
    assert!(log.lock().unwrap().is_empty());
}

// An ill-typed value is rejected when it is bound to the schema at the edit
// boundary; neither candidate nor running change.
#[test]
fn ill_typed_edit_is_rejected() {
    let (_dir, mut store) = setup_store();
    store.copy(DbName::Running, DbName::Candidate).unwrap();

    let payload = conifer_datastore::parse_tree(
        &system_xml(
            "<ntp><server><name>a</name><address>x</address>\
             <port>notanumber</port></server></ntp>",
        ),
        conifer_datastore::DbFormat::Xml,
    );
    assert!(matches!(payload, Err(DsError::Schema(_))));

    assert_eq!(canon(&store.get(DbName::Candidate).unwrap()), "");
    assert_eq!(canon(&store.get(DbName::Running).unwrap()), "");
}

#[test]
fn transaction_ids_are_monotonic() {
    let (_dir, mut store) = setup_store();
    let mut plugins = PluginRegistry::new();
    let mut next_txn_id = 0;

    store.copy(DbName::Running, DbName::Candidate).unwrap();
    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>alpha</hostname>")),
        )
        .unwrap();
    let first = commit::commit(
        &mut store,
        &mut plugins,
        &mut next_txn_id,
        DbName::Candidate,
    )
    .unwrap();

    store
        .put(
            DbName::Candidate,
            PutOperation::Merge,
            &tree(&system_xml("<contact>noc</contact>")),
        )
        .unwrap();
    let second = commit::commit(
        &mut store,
        &mut plugins,
        &mut next_txn_id,
        DbName::Candidate,
    )
    .unwrap();

    assert!(second > first);
}
