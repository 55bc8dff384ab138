//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;
use std::str::FromStr;

use conifer_datastore::{Datastore, DbFormat, DbName, PutOperation, parse_tree};
use conifer_northbound::PluginRegistry;
use conifer_yang::YANG_CTX;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, instrument, trace, warn};
use yang3::data::{
    Data, DataFormat, DataPrinterFlags, DataTree, DataValidationFlags,
};

use crate::config::Config;
use crate::northbound::client::api;
use crate::northbound::session::Sessions;
use crate::northbound::startup::StartupMode;
use crate::northbound::streams::Streams;
use crate::northbound::{Error, Result, commit, monitoring, startup};

pub struct Northbound {
    // The tree store owning the named configuration databases.
    store: Datastore,
    // Ordered backend plugins.
    plugins: PluginRegistry,
    // Connected client sessions.
    sessions: Sessions,
    // Event stream registry.
    streams: Streams,
    // Advertised NETCONF capability URIs.
    capabilities: Vec<String>,
    // Whether the startup datastore is exposed.
    startup_feature: bool,
    // Advertised schema location directory.
    monitoring_location: Option<String>,
    // Transaction id allocator.
    next_txn_id: u32,
    // Channel used to receive messages from the external clients.
    rx_clients: api::ClientReceiver,
}

// ===== impl Northbound =====

impl Northbound {
    pub(crate) fn init(
        config: &Config,
        plugins: PluginRegistry,
        rx_clients: api::ClientReceiver,
    ) -> Result<Northbound> {
        let format = DbFormat::from_str(&config.datastore.format)
            .map_err(|_| {
                Error::Config(format!(
                    "invalid datastore format: {}",
                    config.datastore.format
                ))
            })?;
        let store = Datastore::new(
            Path::new(&config.datastore.dir),
            format,
            config.datastore.pretty,
            config.datastore.cache,
        )
        .map_err(Error::Datastore)?;

        let mut streams = Streams::new();
        streams.register("NETCONF", "default NETCONF event stream");
        streams.register("CONIFER", "conifer log events");

        Ok(Northbound {
            store,
            plugins,
            sessions: Sessions::new(),
            streams,
            capabilities: capabilities(config.startup.enabled),
            startup_feature: config.startup.enabled,
            monitoring_location: config.monitoring.location.clone(),
            next_txn_id: 0,
            rx_clients,
        })
    }

    // Runs the boot-time reconciliation. Invoked exactly once, before the
    // client-accept loop starts.
    pub(crate) fn startup(
        &mut self,
        mode: StartupMode,
        extra_xml: Option<&Path>,
    ) -> Result<()> {
        startup::reconcile(
            &mut self.store,
            &mut self.plugins,
            &mut self.next_txn_id,
            mode,
            extra_xml,
        )
    }

    // Runs the plugin start sequence with the residual command-line
    // arguments.
    pub(crate) fn start_plugins(&mut self, args: &[String]) -> Result<()> {
        self.plugins.start_all(args).map_err(Error::Plugin)
    }

    // Main event loop.
    #[instrument(skip_all, name = "northbound")]
    pub(crate) async fn run(mut self, mut signal_rx: Receiver<()>) {
        loop {
            tokio::select! {
                request = self.rx_clients.recv() => match request {
                    Some(request) => self.process_client_msg(request),
                    None => break,
                },
                _ = signal_rx.recv() => {
                    info!("exit requested");
                    self.rx_clients.close();
                    break;
                }
            }
        }

        // Teardown, in reverse plugin order.
        self.plugins.exit_all();
    }

    // Processes a message received from an external client. Requests are
    // serialized here, so at most one commit is in flight process-wide.
    fn process_client_msg(&mut self, request: api::client::Request) {
        trace!(?request, "received client request");

        match request {
            api::client::Request::Attach(request) => {
                let session_id = self.sessions.attach();
                debug!(
                    %session_id,
                    active = %self.sessions.count(),
                    "client attached"
                );
                let _ = request.responder.send(api::client::AttachResponse {
                    session_id,
                    capabilities: self.capabilities.clone(),
                });
            }
            api::client::Request::Detach(request) => {
                self.sessions.detach(request.session_id);
                self.store.unlock_session(request.session_id);
                self.streams.unsubscribe_session(request.session_id);
            }
            api::client::Request::GetConfig(request) => {
                let response = self
                    .process_get_config(request.db, request.xpath.as_deref());
                let _ = request.responder.send(response);
            }
            api::client::Request::Edit(request) => {
                let response = self.process_edit(
                    request.session_id,
                    request.db,
                    request.operation,
                    &request.config,
                );
                if let Err(error) = &response {
                    warn!(%error, "edit-config failed");
                }
                let _ = request.responder.send(response);
            }
            api::client::Request::CopyConfig(request) => {
                let response = self.process_copy_config(
                    request.session_id,
                    request.source,
                    request.target,
                );
                let _ = request.responder.send(response);
            }
            api::client::Request::DeleteConfig(request) => {
                let response = self
                    .process_delete_config(request.session_id, request.db);
                let _ = request.responder.send(response);
            }
            api::client::Request::Lock(request) => {
                let response = self
                    .store
                    .lock(request.db, request.session_id)
                    .map_err(Error::Datastore);
                let _ = request.responder.send(response);
            }
            api::client::Request::Unlock(request) => {
                let response = self
                    .store
                    .unlock(request.db, request.session_id)
                    .map_err(Error::Datastore);
                let _ = request.responder.send(response);
            }
            api::client::Request::Validate(request) => {
                let response = self.process_validate();
                if let Err(error) = &response {
                    warn!(%error, "validation failed");
                }
                let _ = request.responder.send(response);
            }
            api::client::Request::Commit(request) => {
                let response = self.process_commit(request.session_id);
                if let Err(error) = &response {
                    warn!(%error, "commit failed");
                }
                let _ = request.responder.send(response);
            }
            api::client::Request::Discard(request) => {
                let response = self.process_discard(request.session_id);
                let _ = request.responder.send(response);
            }
            api::client::Request::Get(request) => {
                let response = self.process_get(request.xpath.as_deref());
                let _ = request.responder.send(response);
            }
            api::client::Request::NetconfState(request) => {
                let response = monitoring::netconf_state(
                    &self.store,
                    &self.capabilities,
                    self.startup_feature,
                    self.monitoring_location.as_deref(),
                );
                let _ = request.responder.send(response);
            }
            api::client::Request::Subscribe(request) => {
                let response = self.streams.subscribe(
                    &request.stream,
                    request.session_id,
                    request.notifier,
                );
                let _ = request.responder.send(response);
            }
        }
    }

    // Returns a full or filtered copy of a configuration datastore.
    fn process_get_config(
        &mut self,
        db: DbName,
        xpath: Option<&str>,
    ) -> Result<String> {
        let dtree = match xpath {
            Some(xpath) => self.store.get_xpath(db, xpath),
            None => self.store.get(db),
        }
        .map_err(Error::Datastore)?;
        print_tree(&dtree)
    }

    // Applies an edit-config request to a datastore.
    fn process_edit(
        &mut self,
        session_id: u32,
        db: DbName,
        operation: PutOperation,
        config: &str,
    ) -> Result<()> {
        // Commit is the only operation that mutates running.
        if db == DbName::Running {
            return Err(Error::InvalidOperation(
                "cannot edit the running datastore".to_owned(),
            ));
        }
        self.store
            .verify_write_access(db, session_id)
            .map_err(Error::Datastore)?;
        let payload =
            parse_tree(config, DbFormat::Xml).map_err(Error::Datastore)?;
        self.store
            .put(db, operation, &payload)
            .map_err(Error::Datastore)
    }

    fn process_copy_config(
        &mut self,
        session_id: u32,
        source: DbName,
        target: DbName,
    ) -> Result<()> {
        // Commit is the only operation that mutates running.
        if target == DbName::Running {
            return Err(Error::InvalidOperation(
                "cannot copy into the running datastore".to_owned(),
            ));
        }
        self.store
            .verify_write_access(target, session_id)
            .map_err(Error::Datastore)?;
        self.store.copy(source, target).map_err(Error::Datastore)
    }

    fn process_delete_config(
        &mut self,
        session_id: u32,
        db: DbName,
    ) -> Result<()> {
        if db == DbName::Running {
            return Err(Error::InvalidOperation(
                "cannot delete the running datastore".to_owned(),
            ));
        }
        self.store
            .verify_write_access(db, session_id)
            .map_err(Error::Datastore)?;
        self.store.delete(db).map_err(Error::Datastore)
    }

    // YANG validation of the candidate configuration.
    fn process_validate(&mut self) -> Result<()> {
        let mut candidate =
            self.store.get(DbName::Candidate).map_err(Error::Datastore)?;
        candidate
            .validate(DataValidationFlags::NO_STATE)
            .map_err(Error::Validation)?;
        Ok(())
    }

    // Commits the candidate configuration into running.
    fn process_commit(&mut self, session_id: u32) -> Result<()> {
        self.store
            .verify_write_access(DbName::Candidate, session_id)
            .map_err(Error::Datastore)?;
        self.store
            .verify_write_access(DbName::Running, session_id)
            .map_err(Error::Datastore)?;

        let transaction_id = commit::commit(
            &mut self.store,
            &mut self.plugins,
            &mut self.next_txn_id,
            DbName::Candidate,
        )?;

        if transaction_id != 0 {
            self.streams.notify("NETCONF", &config_change_event(session_id));
        }
        Ok(())
    }

    // Discards uncommitted candidate changes.
    fn process_discard(&mut self, session_id: u32) -> Result<()> {
        self.store
            .verify_write_access(DbName::Candidate, session_id)
            .map_err(Error::Datastore)?;
        self.store
            .copy(DbName::Running, DbName::Candidate)
            .map_err(Error::Datastore)
    }

    // Returns the running configuration merged with the plugin-supplied
    // operational state. A state read always sees a settled running: commits
    // and reads are serialized on this task.
    fn process_get(&mut self, xpath: Option<&str>) -> Result<String> {
        let mut dtree = match xpath {
            Some(xpath) => self.store.get_xpath(DbName::Running, xpath),
            None => self.store.get(DbName::Running),
        }
        .map_err(Error::Datastore)?;

        let statedata = self
            .plugins
            .statedata_all(xpath.unwrap_or("/"))
            .map_err(Error::Plugin)?;
        for state in statedata {
            dtree.merge(&state).map_err(Error::Validation)?;
        }

        print_tree(&dtree)
    }
}

// ===== helper functions =====

// Prints a data tree as XML for the client interface.
fn print_tree(dtree: &DataTree) -> Result<String> {
    let data = dtree
        .print_string(DataFormat::XML, DataPrinterFlags::WITH_SIBLINGS)
        .map_err(Error::Validation)?
        .unwrap_or_default();
    Ok(data)
}

// RFC 6470 style configuration change event.
fn config_change_event(session_id: u32) -> String {
    format!(
        "<netconf-config-change \
         xmlns=\"urn:ietf:params:xml:ns:yang:ietf-netconf-notifications\">\
         <changed-by><session-id>{session_id}</session-id></changed-by>\
         <datastore>running</datastore></netconf-config-change>"
    )
}

// NETCONF capability URIs advertised by the daemon.
pub(crate) fn capabilities(startup_feature: bool) -> Vec<String> {
    let mut capabilities = vec![
        "urn:ietf:params:netconf:base:1.0".to_owned(),
        "urn:ietf:params:netconf:base:1.1".to_owned(),
        "urn:ietf:params:netconf:capability:candidate:1.0".to_owned(),
        "urn:ietf:params:netconf:capability:validate:1.1".to_owned(),
        "urn:ietf:params:netconf:capability:xpath:1.0".to_owned(),
        "urn:ietf:params:netconf:capability:notification:1.0".to_owned(),
    ];
    if startup_feature {
        capabilities
            .push("urn:ietf:params:netconf:capability:startup:1.0".to_owned());
    }

    // Advertise the loaded YANG modules as well.
    let yang_ctx = YANG_CTX.get().unwrap();
    for module in yang_ctx
        .modules(true)
        .filter(|module| module.is_implemented())
    {
        let mut capability =
            format!("{}?module={}", module.namespace(), module.name());
        if let Some(revision) = module.revision() {
            capability.push_str(&format!("&revision={revision}"));
        }
        capabilities.push(capability);
    }

    capabilities
}
