//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use conifer_datastore::{DbName, PutOperation};
use tokio::sync::{mpsc, oneshot};

use crate::northbound::Result;

pub type Responder<T> = oneshot::Sender<T>;
pub type ClientSender = mpsc::Sender<client::Request>;
pub type ClientReceiver = mpsc::Receiver<client::Request>;

// Client -> Daemon requests.
pub mod client {
    use super::*;

    #[derive(Debug)]
    pub enum Request {
        // Session attach: allocate a session id.
        Attach(AttachRequest),
        // Session teardown: release locks and subscriptions.
        Detach(DetachRequest),
        // Request a (sub)tree of a configuration datastore.
        GetConfig(GetConfigRequest),
        // Request an edit-config operation on a datastore.
        Edit(EditRequest),
        // Request an atomic datastore copy.
        CopyConfig(CopyConfigRequest),
        // Request a datastore removal.
        DeleteConfig(DeleteConfigRequest),
        // Request a datastore lock.
        Lock(LockRequest),
        // Release a datastore lock.
        Unlock(UnlockRequest),
        // Validate the candidate configuration.
        Validate(ValidateRequest),
        // Commit the candidate configuration into running.
        Commit(CommitRequest),
        // Discard uncommitted candidate changes.
        Discard(DiscardRequest),
        // Request configuration and operational state.
        Get(GetRequest),
        // Request the RFC 6022 monitoring document.
        NetconfState(NetconfStateRequest),
        // Subscribe to an event stream.
        Subscribe(SubscribeRequest),
    }

    #[derive(Debug)]
    pub struct AttachRequest {
        pub responder: Responder<AttachResponse>,
    }

    #[derive(Debug)]
    pub struct AttachResponse {
        pub session_id: u32,
        pub capabilities: Vec<String>,
    }

    #[derive(Debug)]
    pub struct DetachRequest {
        pub session_id: u32,
    }

    #[derive(Debug)]
    pub struct GetConfigRequest {
        pub session_id: u32,
        pub db: DbName,
        pub xpath: Option<String>,
        pub responder: Responder<Result<String>>,
    }

    #[derive(Debug)]
    pub struct EditRequest {
        pub session_id: u32,
        pub db: DbName,
        pub operation: PutOperation,
        pub config: String,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct CopyConfigRequest {
        pub session_id: u32,
        pub source: DbName,
        pub target: DbName,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct DeleteConfigRequest {
        pub session_id: u32,
        pub db: DbName,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct LockRequest {
        pub session_id: u32,
        pub db: DbName,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct UnlockRequest {
        pub session_id: u32,
        pub db: DbName,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct ValidateRequest {
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct CommitRequest {
        pub session_id: u32,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct DiscardRequest {
        pub session_id: u32,
        pub responder: Responder<Result<()>>,
    }

    #[derive(Debug)]
    pub struct GetRequest {
        pub xpath: Option<String>,
        pub responder: Responder<Result<String>>,
    }

    #[derive(Debug)]
    pub struct NetconfStateRequest {
        pub responder: Responder<String>,
    }

    #[derive(Debug)]
    pub struct SubscribeRequest {
        pub session_id: u32,
        pub stream: String,
        pub notifier: mpsc::UnboundedSender<String>,
        pub responder: Responder<Result<()>>,
    }
}
