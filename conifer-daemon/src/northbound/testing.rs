//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::{Arc, Mutex};

use conifer_datastore::{Datastore, DbFormat, DbName};
use conifer_northbound::transaction::{PluginSlot, Transaction};
use conifer_northbound::{Plugin, PluginRegistry};
use tempfile::TempDir;
use yang3::data::{Data, DataFormat, DataPrinterFlags, DataTree};

pub(crate) const SYSTEM_NS: &str = "urn:conifer:yang:conifer-system";

pub(crate) type HookLog = Arc<Mutex<Vec<String>>>;

// Creates a scratch datastore with a materialized running database.
pub(crate) fn setup_store() -> (TempDir, Datastore) {
    conifer_yang::create_context(
        ["conifer-system".to_owned(), "conifer-interfaces".to_owned()],
    );
    let dir = TempDir::new().unwrap();
    let mut store =
        Datastore::new(dir.path(), DbFormat::Xml, false, true).unwrap();
    store.create(DbName::Running).unwrap();
    (dir, store)
}

pub(crate) fn tree(xml: &str) -> DataTree {
    conifer_datastore::parse_tree(xml, DbFormat::Xml).unwrap()
}

pub(crate) fn system_xml(body: &str) -> String {
    format!("<system xmlns=\"{SYSTEM_NS}\">{body}</system>")
}

pub(crate) fn canon(dtree: &DataTree) -> String {
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

// A plugin that records every lifecycle and hook invocation, with rigged
// failure points.
pub(crate) struct RecorderPlugin {
    pub(crate) name: &'static str,
    pub(crate) log: HookLog,
    pub(crate) fail_init: bool,
    pub(crate) fail_validate: bool,
    pub(crate) fail_commit: bool,
    pub(crate) reset_xml: Option<String>,
}

impl RecorderPlugin {
    pub(crate) fn new(name: &'static str, log: HookLog) -> RecorderPlugin {
        RecorderPlugin {
            name,
            log,
            fail_init: false,
            fail_validate: false,
            fail_commit: false,
            reset_xml: None,
        }
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(format!("{event}:{}", self.name));
    }
}

impl Plugin for RecorderPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&mut self) -> Result<(), String> {
        self.record("init");
        if self.fail_init {
            return Err("rigged init failure".to_owned());
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<Option<DataTree>, String> {
        self.record("reset");
        Ok(self.reset_xml.as_deref().map(tree))
    }

    fn exit(&mut self) {
        self.record("exit");
    }

    fn transaction_begin(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        self.record("begin");
        Ok(())
    }

    fn transaction_validate(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        self.record("validate");
        if self.fail_validate {
            return Err("rigged validation failure".to_owned());
        }
        Ok(())
    }

    fn transaction_complete(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        self.record("complete");
        Ok(())
    }

    fn transaction_commit(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        self.record("commit");
        if self.fail_commit {
            return Err("rigged commit failure".to_owned());
        }
        Ok(())
    }

    fn transaction_commit_done(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        self.record("commit-done");
        Ok(())
    }

    fn transaction_revert(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) -> Result<(), String> {
        self.record("revert");
        Ok(())
    }

    fn transaction_end(&mut self, _txn: &Transaction, _slot: &mut PluginSlot) {
        self.record("end");
    }

    fn transaction_abort(
        &mut self,
        _txn: &Transaction,
        _slot: &mut PluginSlot,
    ) {
        self.record("abort");
    }
}

// Builds a registry of recorder plugins sharing one hook log.
pub(crate) fn recorder_registry(
    plugins: Vec<RecorderPlugin>,
) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        registry.register(Box::new(plugin));
    }
    registry
}

pub(crate) fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}
