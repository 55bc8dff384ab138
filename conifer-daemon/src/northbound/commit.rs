//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use conifer_datastore::{Datastore, DbName, PutOperation};
use conifer_northbound::transaction::{Transaction, TransactionState, changes_from_diff};
use conifer_northbound::{
    HookPhase, PluginRegistry, dispatch_hook, dispatch_hook_logged,
};
use tracing::{debug, info};
use yang3::data::{Data, DataDiffFlags, DataValidationFlags};

use crate::northbound::{Error, Result};

// Commits the content of a source database into running, driving the plugin
// hook sequence. Returns the transaction id, or 0 for a no-op commit.
//
// Callers are serialized: there is at most one in-flight commit per tree
// store.
pub(crate) fn commit(
    store: &mut Datastore,
    plugins: &mut PluginRegistry,
    next_txn_id: &mut u32,
    source_db: DbName,
) -> Result<u32> {
    // Snapshot the target and take a working copy of the source.
    let snapshot = store.get(DbName::Running).map_err(Error::Datastore)?;
    let source = store.get(source_db).map_err(Error::Datastore)?;

    // Compute the added/deleted/changed node sets.
    let diff = snapshot
        .diff(&source, DataDiffFlags::empty())
        .map_err(Error::Validation)?;
    let changes = changes_from_diff(&diff);
    if changes.is_empty() {
        debug!(%source_db, "commit without changes");
        return Ok(0);
    }

    // YANG-validate the source. Validation instantiates default nodes, so it
    // runs on a scratch duplicate and the stored tree stays as written.
    let mut validated = source.duplicate().map_err(Error::Validation)?;
    validated
        .validate(DataValidationFlags::NO_STATE)
        .map_err(Error::Validation)?;

    *next_txn_id += 1;
    let id = *next_txn_id;
    let mut txn = Transaction::new(
        id,
        source_db,
        source,
        snapshot,
        changes,
        plugins.len(),
    );
    info!(%id, %source_db, changes = %txn.changes.len(), "starting commit");

    txn.set_state(TransactionState::Validating);
    let result = run_transaction(store, plugins, &mut txn);

    // End or abort, in reverse order, then destroy the transaction.
    let phase = match &result {
        Ok(()) => HookPhase::End,
        Err(_) => HookPhase::Abort,
    };
    for (plugin_id, plugin) in plugins.iter_mut_rev() {
        let _ = dispatch_hook(plugin_id, plugin, phase, &mut txn);
    }
    txn.set_state(match &result {
        Ok(()) => TransactionState::Committed,
        Err(_) => TransactionState::Failed,
    });

    result.map(|_| id)
}

// Runs the forward hook phases and the apply step. A failure on a forward
// phase leaves running untouched; a failure on the commit phase restores
// running from the snapshot and reverts the plugins that had already
// committed, in reverse dispatch order.
fn run_transaction(
    store: &mut Datastore,
    plugins: &mut PluginRegistry,
    txn: &mut Transaction,
) -> Result<()> {
    for phase in [HookPhase::Begin, HookPhase::Validate, HookPhase::Complete] {
        let mut failure = None;
        for (plugin_id, plugin) in plugins.iter_mut() {
            if let Err(error) = dispatch_hook(plugin_id, plugin, phase, txn) {
                failure = Some(error);
                break;
            }
        }
        if let Some(error) = failure {
            return Err(Error::TransactionValidate(error));
        }
    }

    // Apply: atomic replace of running by the source content.
    txn.set_state(TransactionState::Committing);
    store
        .put(DbName::Running, PutOperation::Replace, &txn.source)
        .map_err(Error::Datastore)?;

    let mut committed = Vec::new();
    let mut failure = None;
    for (plugin_id, plugin) in plugins.iter_mut() {
        match dispatch_hook(plugin_id, plugin, HookPhase::Commit, txn) {
            Ok(()) => committed.push(plugin_id),
            Err(error) => {
                failure = Some(error);
                break;
            }
        }
    }
    if let Some(error) = failure {
        // Revert: reinstate the pre-commit image, then unwind the plugins
        // that had already seen the commit hook.
        txn.set_state(TransactionState::Reverting);
        store
            .put(DbName::Running, PutOperation::Replace, &txn.snapshot)
            .map_err(|error| {
                Error::Fatal(format!(
                    "failed to restore running from snapshot: {error}"
                ))
            })?;
        for (plugin_id, plugin) in plugins.iter_mut_rev() {
            if committed.contains(&plugin_id) {
                dispatch_hook_logged(plugin_id, plugin, HookPhase::Revert, txn);
            }
        }
        return Err(Error::TransactionCommit(error));
    }

    // The new running is authoritative; commit-done failures are logged,
    // not propagated.
    for (plugin_id, plugin) in plugins.iter_mut() {
        dispatch_hook_logged(plugin_id, plugin, HookPhase::CommitDone, txn);
    }

    Ok(())
}
