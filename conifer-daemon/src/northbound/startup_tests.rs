//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use conifer_datastore::{DbName, PutOperation};
use conifer_northbound::PluginRegistry;

use crate::northbound::startup::{StartupMode, reconcile};
use crate::northbound::testing::{
    RecorderPlugin, canon, hook_log, recorder_registry, setup_store,
    system_xml, tree,
};
use crate::northbound::{Error, Result};

fn run_reconcile(
    store: &mut conifer_datastore::Datastore,
    plugins: &mut PluginRegistry,
    mode: StartupMode,
    extra_xml: Option<&std::path::Path>,
) -> Result<()> {
    let mut next_txn_id = 0;
    reconcile(store, plugins, &mut next_txn_id, mode, extra_xml)
}

fn seed_running(store: &mut conifer_datastore::Datastore, body: &str) {
    store
        .put(DbName::Running, PutOperation::Merge, &tree(&system_xml(body)))
        .unwrap();
}

#[test]
fn mode_none_preserves_running() {
    let (_dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>alpha</hostname>");
    let before = canon(&store.get(DbName::Running).unwrap());

    let log = hook_log();
    let mut plugins =
        recorder_registry(vec![RecorderPlugin::new("p1", log.clone())]);
    run_reconcile(&mut store, &mut plugins, StartupMode::None, None).unwrap();

    assert_eq!(canon(&store.get(DbName::Running).unwrap()), before);
    // Candidate begins equal to running.
    assert_eq!(canon(&store.get(DbName::Candidate).unwrap()), before);
    assert_eq!(*log.lock().unwrap(), ["init:p1"]);
}

#[test]
fn mode_init_wipes_running() {
    let (_dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>alpha</hostname>");

    let mut plugins = PluginRegistry::new();
    run_reconcile(&mut store, &mut plugins, StartupMode::Init, None).unwrap();

    assert_eq!(canon(&store.get(DbName::Running).unwrap()), "");
    assert_eq!(canon(&store.get(DbName::Candidate).unwrap()), "");
}

#[test]
fn reconcile_materializes_running() {
    let (_dir, mut store) = setup_store();
    store.delete(DbName::Running).unwrap();

    let mut plugins = PluginRegistry::new();
    run_reconcile(&mut store, &mut plugins, StartupMode::None, None).unwrap();

    assert!(store.exists(DbName::Running));
    assert!(store.exists(DbName::Candidate));
}

#[test]
fn mode_running_recommits_and_merges_overlay() {
    let (dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>alpha</hostname>");

    // Operator overlay file.
    let overlay = dir.path().join("extra.xml");
    std::fs::write(&overlay, system_xml("<location>hq</location>")).unwrap();

    let log = hook_log();
    let mut plugin = RecorderPlugin::new("p1", log.clone());
    plugin.reset_xml = Some(system_xml("<contact>from-reset</contact>"));
    let mut plugins = recorder_registry(vec![plugin]);

    run_reconcile(
        &mut store,
        &mut plugins,
        StartupMode::Running,
        Some(overlay.as_path()),
    )
    .unwrap();

    let running = canon(&store.get(DbName::Running).unwrap());
    assert!(running.contains("alpha"));
    assert!(running.contains("from-reset"));
    assert!(running.contains("hq"));
    assert_eq!(canon(&store.get(DbName::Candidate).unwrap()), running);

    // The re-commit drove the full hook sequence.
    let log = log.lock().unwrap();
    assert!(log.iter().any(|e| e == "commit:p1"));
    assert!(log.iter().any(|e| e == "commit-done:p1"));

    // Scratch databases never survive the startup scope.
    assert!(!store.exists(DbName::Tmp));
    assert!(!store.exists(DbName::Backup));
}

// If the re-commit fails, running equals its pre-reconcile content and the
// overlay is not applied.
#[test]
fn mode_running_rolls_back_on_commit_failure() {
    let (dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>alpha</hostname>");
    let before = canon(&store.get(DbName::Running).unwrap());

    let overlay = dir.path().join("extra.xml");
    std::fs::write(&overlay, system_xml("<location>hq</location>")).unwrap();

    let log = hook_log();
    let mut plugin = RecorderPlugin::new("p1", log.clone());
    plugin.fail_commit = true;
    let mut plugins = recorder_registry(vec![plugin]);

    let error = run_reconcile(
        &mut store,
        &mut plugins,
        StartupMode::Running,
        Some(overlay.as_path()),
    )
    .unwrap_err();
    assert!(matches!(error, Error::TransactionCommit(_)));

    let running = canon(&store.get(DbName::Running).unwrap());
    assert_eq!(running, before);
    assert!(!running.contains("hq"));
    assert!(!store.exists(DbName::Tmp));
}

#[test]
fn mode_startup_applies_startup_configuration() {
    let (_dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>old</hostname>");

    store.create(DbName::Startup).unwrap();
    store
        .put(
            DbName::Startup,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>persisted</hostname>")),
        )
        .unwrap();

    let mut plugins = PluginRegistry::new();
    run_reconcile(&mut store, &mut plugins, StartupMode::Startup, None)
        .unwrap();

    let running = canon(&store.get(DbName::Running).unwrap());
    assert!(running.contains("persisted"));
    assert!(!running.contains("old"));
    assert_eq!(canon(&store.get(DbName::Candidate).unwrap()), running);
    assert!(!store.exists(DbName::Tmp));
    assert!(!store.exists(DbName::Backup));
}

// Startup mode with an absent startup database: running becomes the plugin
// reset content plus the overlay.
#[test]
fn mode_startup_with_empty_startup_db() {
    let (dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>old</hostname>");

    let overlay = dir.path().join("extra.xml");
    std::fs::write(&overlay, system_xml("<location>hq</location>")).unwrap();

    let log = hook_log();
    let mut plugin = RecorderPlugin::new("p1", log.clone());
    plugin.reset_xml = Some(system_xml("<contact>from-reset</contact>"));
    let mut plugins = recorder_registry(vec![plugin]);

    run_reconcile(
        &mut store,
        &mut plugins,
        StartupMode::Startup,
        Some(overlay.as_path()),
    )
    .unwrap();

    let running = canon(&store.get(DbName::Running).unwrap());
    assert!(!running.contains("old"));
    assert!(running.contains("from-reset"));
    assert!(running.contains("hq"));
    assert!(store.exists(DbName::Startup));
    assert!(!store.exists(DbName::Tmp));
    assert!(!store.exists(DbName::Backup));
}

#[test]
fn mode_startup_restores_backup_on_commit_failure() {
    let (_dir, mut store) = setup_store();
    seed_running(&mut store, "<hostname>old</hostname>");
    let before = canon(&store.get(DbName::Running).unwrap());

    store.create(DbName::Startup).unwrap();
    store
        .put(
            DbName::Startup,
            PutOperation::Merge,
            &tree(&system_xml("<hostname>persisted</hostname>")),
        )
        .unwrap();

    let log = hook_log();
    let mut plugin = RecorderPlugin::new("p1", log.clone());
    plugin.fail_commit = true;
    let mut plugins = recorder_registry(vec![plugin]);

    let error = run_reconcile(
        &mut store,
        &mut plugins,
        StartupMode::Startup,
        None,
    )
    .unwrap_err();
    assert!(matches!(error, Error::TransactionCommit(_)));

    assert_eq!(canon(&store.get(DbName::Running).unwrap()), before);
    assert!(!store.exists(DbName::Tmp));
    assert!(!store.exists(DbName::Backup));
}

#[test]
fn plugin_init_failure_aborts_boot() {
    let (_dir, mut store) = setup_store();
    let log = hook_log();
    let mut plugin = RecorderPlugin::new("p1", log.clone());
    plugin.fail_init = true;
    let mut plugins = recorder_registry(vec![plugin]);

    let error =
        run_reconcile(&mut store, &mut plugins, StartupMode::None, None)
            .unwrap_err();
    assert!(matches!(error, Error::Plugin(_)));
}
