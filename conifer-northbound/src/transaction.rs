//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::any::Any;
use std::sync::Arc;

use conifer_datastore::DbName;
use tracing::debug;
use yang3::data::{Data, DataDiff, DataDiffOp, DataTree};

/// Transaction lifecycle states.
///
/// `Idle → Validating → Committing → Committed` on the success path;
/// a commit-phase failure detours through `Reverting → Failed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionState {
    Idle,
    Validating,
    Committing,
    Committed,
    Reverting,
    Failed,
}

/// Kind of difference between the target and the source tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeOp {
    Added,
    Deleted,
    Changed,
}

#[derive(Clone, Debug)]
pub struct ConfigChange {
    pub op: ChangeOp,
    pub path: String,
}

pub type ConfigChanges = Vec<ConfigChange>;

/// Opaque per-plugin state carried across the hooks of one transaction.
pub type PluginSlot = Option<Box<dyn Any + Send>>;

/// A configuration transaction.
///
/// Created at commit entry and destroyed at commit exit; holds the source
/// tree, the pre-commit snapshot of the target, the computed change sets
/// and one opaque state slot per registered plugin.
pub struct Transaction {
    pub id: u32,
    pub source_db: DbName,
    pub source: Arc<DataTree>,
    pub snapshot: Arc<DataTree>,
    pub changes: ConfigChanges,
    pub state: TransactionState,
    slots: Vec<PluginSlot>,
}

// ===== impl Transaction =====

impl Transaction {
    pub fn new(
        id: u32,
        source_db: DbName,
        source: DataTree,
        snapshot: DataTree,
        changes: ConfigChanges,
        num_plugins: usize,
    ) -> Transaction {
        let mut slots = Vec::new();
        slots.resize_with(num_plugins, Default::default);

        Transaction {
            id,
            source_db,
            source: Arc::new(source),
            snapshot: Arc::new(snapshot),
            changes,
            state: TransactionState::Idle,
            slots,
        }
    }

    pub fn set_state(&mut self, state: TransactionState) {
        debug!(id = %self.id, ?state, "transaction state change");
        self.state = state;
    }

    // The dispatch loop detaches a plugin's slot around each hook call so
    // the plugin can borrow the transaction and its own state at once.
    pub fn take_slot(&mut self, plugin: usize) -> PluginSlot {
        self.slots[plugin].take()
    }

    pub fn put_slot(&mut self, plugin: usize, slot: PluginSlot) {
        self.slots[plugin] = slot;
    }
}

// ===== global functions =====

// Maps a YANG data diff to the transaction's change sets. Created subtrees
// contribute one `Added` entry per non-default node.
pub fn changes_from_diff(diff: &DataDiff) -> ConfigChanges {
    let mut changes = vec![];

    for (op, dnode) in diff.iter() {
        match op {
            DataDiffOp::Create => {
                for dnode in dnode.traverse() {
                    if dnode.is_default() {
                        continue;
                    }
                    changes.push(ConfigChange {
                        op: ChangeOp::Added,
                        path: dnode.path(),
                    });
                }
            }
            DataDiffOp::Delete => {
                changes.push(ConfigChange {
                    op: ChangeOp::Deleted,
                    path: dnode.path(),
                });
            }
            DataDiffOp::Replace => {
                changes.push(ConfigChange {
                    op: ChangeOp::Changed,
                    path: dnode.path(),
                });
            }
        }
    }

    changes
}
