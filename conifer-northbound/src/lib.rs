//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

mod debug;

pub mod error;
pub mod transaction;

use tracing::error;
use yang3::data::DataTree;

use crate::debug::Debug;
use crate::error::Error;
use crate::transaction::{PluginSlot, Transaction};

/// Transaction hook phases, in forward dispatch order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookPhase {
    Begin,
    Validate,
    Complete,
    Commit,
    CommitDone,
    Revert,
    End,
    Abort,
}

/// A backend plugin.
///
/// Every capability defaults to a no-op so plugins implement only the hooks
/// they care about. Hook and lifecycle failures are reported as plain
/// strings; the caller classifies them.
pub trait Plugin: Send {
    fn name(&self) -> &'static str;

    // ===== global lifecycle =====

    fn init(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn start(&mut self, _args: &[String]) -> Result<(), String> {
        Ok(())
    }

    // Invited to contribute initial or default configuration during startup.
    // The returned tree is merged into the startup scratch database.
    fn reset(&mut self) -> Result<Option<DataTree>, String> {
        Ok(None)
    }

    // Contributes operational state to a get request.
    fn statedata(
        &self,
        _xpath: &str,
    ) -> Result<Option<DataTree>, String> {
        Ok(None)
    }

    fn exit(&mut self) {}

    // ===== transaction hooks =====

    fn transaction_begin(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        Ok(())
    }

    fn transaction_validate(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        Ok(())
    }

    fn transaction_complete(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        Ok(())
    }

    fn transaction_commit(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        Ok(())
    }

    fn transaction_commit_done(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        Ok(())
    }

    fn transaction_revert(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        Ok(())
    }

    fn transaction_end(&mut self, _txn: &Transaction, _slot: &mut PluginSlot) {}

    fn transaction_abort(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) {
    }
}

/// Insertion-ordered plugin sequence.
///
/// Registration order is the dispatch order for forward hooks; callers that
/// need the revert/abort/exit order reverse explicitly.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

// ===== impl PluginRegistry =====

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        Default::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    // Yields plugins in registration order.
    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (usize, &mut Box<dyn Plugin>)> {
        self.plugins.iter_mut().enumerate()
    }

    // Yields plugins in reverse registration order.
    pub fn iter_mut_rev(
        &mut self,
    ) -> impl Iterator<Item = (usize, &mut Box<dyn Plugin>)> {
        self.plugins.iter_mut().enumerate().rev()
    }

    // Runs the init sequence. The first failure aborts the boot.
    pub fn init_all(&mut self) -> Result<(), Error> {
        for plugin in self.plugins.iter_mut() {
            Debug::PluginInit(plugin.name()).log();
            plugin.init().map_err(|error| Error::PluginInit {
                plugin: plugin.name(),
                error,
            })?;
        }
        Ok(())
    }

    // Runs the start sequence with the residual command-line arguments.
    pub fn start_all(&mut self, args: &[String]) -> Result<(), Error> {
        for plugin in self.plugins.iter_mut() {
            Debug::PluginStart(plugin.name()).log();
            plugin.start(args).map_err(|error| Error::PluginStart {
                plugin: plugin.name(),
                error,
            })?;
        }
        Ok(())
    }

    // Collects the reset content of every plugin, in registration order.
    pub fn reset_all(&mut self) -> Result<Vec<DataTree>, Error> {
        let mut trees = Vec::new();
        for plugin in self.plugins.iter_mut() {
            Debug::PluginReset(plugin.name()).log();
            if let Some(dtree) =
                plugin.reset().map_err(|error| Error::PluginReset {
                    plugin: plugin.name(),
                    error,
                })?
            {
                trees.push(dtree);
            }
        }
        Ok(trees)
    }

    // Collects operational state contributions for the given path.
    pub fn statedata_all(
        &self,
        xpath: &str,
    ) -> Result<Vec<DataTree>, Error> {
        let mut trees = Vec::new();
        for plugin in self.plugins.iter() {
            if let Some(dtree) =
                plugin.statedata(xpath).map_err(|error| Error::StateData {
                    plugin: plugin.name(),
                    error,
                })?
            {
                trees.push(dtree);
            }
        }
        Ok(trees)
    }

    // Teardown, in reverse registration order. Never fails.
    pub fn exit_all(&mut self) {
        for plugin in self.plugins.iter_mut().rev() {
            Debug::PluginExit(plugin.name()).log();
            plugin.exit();
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names =
            self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>();
        write!(f, "PluginRegistry({names:?})")
    }
}

// ===== impl HookPhase =====

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HookPhase::Begin => "begin",
            HookPhase::Validate => "validate",
            HookPhase::Complete => "complete",
            HookPhase::Commit => "commit",
            HookPhase::CommitDone => "commit-done",
            HookPhase::Revert => "revert",
            HookPhase::End => "end",
            HookPhase::Abort => "abort",
        };
        write!(f, "{}", s)
    }
}

// ===== global functions =====

// Dispatches one forward hook to one plugin, detaching its state slot for
// the duration of the call.
pub fn dispatch_hook(
    plugin_id: usize,
    plugin: &mut Box<dyn Plugin>,
    phase: HookPhase,
    txn: &mut Transaction,
) -> Result<(), Error> {
    Debug::HookCallback(phase, plugin.name()).log();

    let mut slot = txn.take_slot(plugin_id);
    let result = match phase {
        HookPhase::Begin => plugin.transaction_begin(txn, &mut slot),
        HookPhase::Validate => plugin.transaction_validate(txn, &mut slot),
        HookPhase::Complete => plugin.transaction_complete(txn, &mut slot),
        HookPhase::Commit => plugin.transaction_commit(txn, &mut slot),
        HookPhase::CommitDone => {
            plugin.transaction_commit_done(txn, &mut slot)
        }
        HookPhase::Revert => plugin.transaction_revert(txn, &mut slot),
        HookPhase::End => {
            plugin.transaction_end(txn, &mut slot);
            Ok(())
        }
        HookPhase::Abort => {
            plugin.transaction_abort(txn, &mut slot);
            Ok(())
        }
    };
    txn.put_slot(plugin_id, slot);

    result.map_err(|error| {
        let error = Error::HookCallback {
            phase,
            plugin: plugin.name(),
            error,
        };
        error.log();
        error
    })
}

// Logs and discards a hook error on the phases whose failures must not
// propagate (commit-done and revert).
pub fn dispatch_hook_logged(
    plugin_id: usize,
    plugin: &mut Box<dyn Plugin>,
    phase: HookPhase,
    txn: &mut Transaction,
) {
    if let Err(err) = dispatch_hook(plugin_id, plugin, phase, txn) {
        error!(%err, "ignoring hook failure");
    }
}
