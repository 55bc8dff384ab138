//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;

use conifer_datastore::{Datastore, DbFormat, DbName, PutOperation, parse_tree};
use conifer_northbound::PluginRegistry;
use tracing::{info, warn};

use crate::northbound::commit;
use crate::northbound::{Error, Result};

/// Boot-time reconciliation policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartupMode {
    None,
    Init,
    Running,
    Startup,
}

// ===== impl StartupMode =====

impl std::fmt::Display for StartupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StartupMode::None => "none",
            StartupMode::Init => "init",
            StartupMode::Running => "running",
            StartupMode::Startup => "startup",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for StartupMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<StartupMode, ()> {
        match s {
            "none" => Ok(StartupMode::None),
            "init" => Ok(StartupMode::Init),
            "running" => Ok(StartupMode::Running),
            "startup" => Ok(StartupMode::Startup),
            _ => Err(()),
        }
    }
}

// ===== global functions =====

// Boot-time reconciliation between the persisted configuration, the plugin
// reset state and the operator-supplied overlay. Invoked exactly once,
// before the client-accept loop starts.
pub(crate) fn reconcile(
    store: &mut Datastore,
    plugins: &mut PluginRegistry,
    next_txn_id: &mut u32,
    mode: StartupMode,
    extra_xml: Option<&Path>,
) -> Result<()> {
    info!(%mode, "reconciling datastores");

    // Running is materialized at all times after startup completes.
    if !store.exists(DbName::Running) {
        store.create(DbName::Running).map_err(Error::Datastore)?;
    }

    let result = reconcile_mode(store, plugins, next_txn_id, mode, extra_xml);

    // The scratch databases never survive the startup scope.
    let _ = store.delete(DbName::Tmp);
    let _ = store.delete(DbName::Backup);

    result?;

    // Initiate the shared candidate.
    store
        .copy(DbName::Running, DbName::Candidate)
        .map_err(Error::Datastore)?;
    Ok(())
}

fn reconcile_mode(
    store: &mut Datastore,
    plugins: &mut PluginRegistry,
    next_txn_id: &mut u32,
    mode: StartupMode,
    extra_xml: Option<&Path>,
) -> Result<()> {
    match mode {
        // Preserve running exactly as found.
        StartupMode::None => {
            if !store.exists(DbName::Candidate) {
                store
                    .copy(DbName::Running, DbName::Candidate)
                    .map_err(Error::Datastore)?;
            }
            plugins.init_all().map_err(Error::Plugin)?;
        }

        // Wipe to an empty slate.
        StartupMode::Init => {
            db_reset(store, DbName::Running)?;
            if !store.exists(DbName::Candidate) {
                store
                    .copy(DbName::Running, DbName::Candidate)
                    .map_err(Error::Datastore)?;
            }
            plugins.init_all().map_err(Error::Plugin)?;
        }

        // Re-commit the existing running through all plugin hooks so they
        // see a clean transaction they can react to.
        StartupMode::Running => {
            // Stash original running to candidate for later commit.
            store
                .copy(DbName::Running, DbName::Candidate)
                .map_err(Error::Datastore)?;
            plugins.init_all().map_err(Error::Plugin)?;

            prepare_reset_db(store, plugins, extra_xml)?;

            db_reset(store, DbName::Running)?;
            if let Err(error) =
                commit::commit(store, plugins, next_txn_id, DbName::Candidate)
            {
                // The overlay is not applied on this path; running is
                // reinstated to its pre-reconcile content.
                warn!(%error, "commit of saved running failed, exiting");
                store
                    .copy(DbName::Candidate, DbName::Running)
                    .map_err(Error::Datastore)?;
                return Err(error);
            }

            db_merge(store, DbName::Tmp, DbName::Running)?;
        }

        // Apply the persisted startup configuration.
        StartupMode::Startup => {
            // Stash original running to backup.
            store
                .copy(DbName::Running, DbName::Backup)
                .map_err(Error::Datastore)?;
            if !store.exists(DbName::Startup) {
                store.create(DbName::Startup).map_err(Error::Datastore)?;
            }
            plugins.init_all().map_err(Error::Plugin)?;

            prepare_reset_db(store, plugins, extra_xml)?;

            db_reset(store, DbName::Running)?;
            if let Err(error) =
                commit::commit(store, plugins, next_txn_id, DbName::Startup)
            {
                warn!(%error, "commit of startup failed, exiting");
                store
                    .copy(DbName::Backup, DbName::Running)
                    .map_err(Error::Datastore)?;
                return Err(error);
            }

            db_merge(store, DbName::Tmp, DbName::Running)?;
        }
    }

    Ok(())
}

// ===== helper functions =====

// Builds the tmp scratch database: plugin reset content first, then the
// operator-supplied overlay file.
fn prepare_reset_db(
    store: &mut Datastore,
    plugins: &mut PluginRegistry,
    extra_xml: Option<&Path>,
) -> Result<()> {
    db_reset(store, DbName::Tmp)?;
    for dtree in plugins.reset_all().map_err(Error::Plugin)? {
        store
            .put(DbName::Tmp, PutOperation::Merge, &dtree)
            .map_err(Error::Datastore)?;
    }
    load_extra_xml(store, extra_xml, DbName::Tmp)?;
    Ok(())
}

fn db_reset(store: &mut Datastore, db: DbName) -> Result<()> {
    if store.exists(db) {
        store.delete(db).map_err(Error::Datastore)?;
    }
    store.create(db).map_err(Error::Datastore)
}

// Merges db1 into db2 without commit.
fn db_merge(store: &mut Datastore, db1: DbName, db2: DbName) -> Result<()> {
    let dtree = store.get(db1).map_err(Error::Datastore)?;
    store
        .put(db2, PutOperation::Merge, &dtree)
        .map_err(Error::Datastore)
}

// Merges the operator overlay file into the given database.
fn load_extra_xml(
    store: &mut Datastore,
    filename: Option<&Path>,
    db: DbName,
) -> Result<()> {
    let Some(filename) = filename else {
        return Ok(());
    };
    let data = std::fs::read_to_string(filename).map_err(|error| {
        Error::Config(format!("cannot read {}: {error}", filename.display()))
    })?;
    let dtree = parse_tree(&data, DbFormat::Xml).map_err(Error::Datastore)?;
    store
        .put(db, PutOperation::Merge, &dtree)
        .map_err(Error::Datastore)
}
