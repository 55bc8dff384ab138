//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use conifer_datastore::{DbName, PutOperation};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::northbound::Error;
use crate::northbound::client::{api, protocol};

// Accept loop for the backend server socket. Each connection becomes one
// session, handled in its own task; the session's requests are serialized
// in arrival order.
pub(crate) async fn listen(
    listener: UnixListener,
    request_tx: api::ClientSender,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let request_tx = request_tx.clone();
                tokio::spawn(async move {
                    if let Err(error) =
                        handle_connection(stream, request_tx).await
                    {
                        debug!(%error, "connection closed");
                    }
                });
            }
            Err(error) => {
                error!(%error, "accept failed");
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    request_tx: api::ClientSender,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Allocate a session id for this connection.
    let (responder, rx) = oneshot::channel();
    let request = api::client::Request::Attach(api::client::AttachRequest {
        responder,
    });
    if request_tx.send(request).await.is_err() {
        return Ok(());
    }
    let Ok(attach) = rx.await else {
        return Ok(());
    };
    let session_id = attach.session_id;

    // Channel carrying event-stream notifications for this session.
    let (notifier, mut notifications) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = process_line(
                    &line,
                    session_id,
                    &attach.capabilities,
                    &request_tx,
                    &notifier,
                )
                .await;
                send_response(&mut writer, &response).await?;
            }
            Some(data) = notifications.recv() => {
                let response = protocol::Response::Notification { data };
                send_response(&mut writer, &response).await?;
            }
        }
    }

    // Session teardown releases the session's locks and subscriptions.
    let request = api::client::Request::Detach(api::client::DetachRequest {
        session_id,
    });
    let _ = request_tx.send(request).await;
    Ok(())
}

async fn process_line(
    line: &str,
    session_id: u32,
    capabilities: &[String],
    request_tx: &api::ClientSender,
    notifier: &mpsc::UnboundedSender<String>,
) -> protocol::Response {
    let request = match serde_json::from_str::<protocol::Request>(line) {
        Ok(request) => request,
        Err(error) => {
            return error_response(&Error::InvalidOperation(format!(
                "malformed request: {error}"
            )));
        }
    };
    process_request(request, session_id, capabilities, request_tx, notifier)
        .await
}

async fn process_request(
    request: protocol::Request,
    session_id: u32,
    capabilities: &[String],
    request_tx: &api::ClientSender,
    notifier: &mpsc::UnboundedSender<String>,
) -> protocol::Response {
    match request {
        protocol::Request::Hello => protocol::Response::Hello {
            session_id,
            capabilities: capabilities.to_vec(),
        },
        protocol::Request::GetConfig { db, xpath } => {
            let db = match parse_db(&db) {
                Ok(db) => db,
                Err(error) => return error_response(&error),
            };
            let (responder, rx) = oneshot::channel();
            let request =
                api::client::Request::GetConfig(api::client::GetConfigRequest {
                    session_id,
                    db,
                    xpath,
                    responder,
                });
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => data_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::EditConfig { db, operation, config } => {
            let db = match parse_db(&db) {
                Ok(db) => db,
                Err(error) => return error_response(&error),
            };
            let Ok(operation) = PutOperation::from_str(&operation) else {
                return error_response(&Error::InvalidOperation(format!(
                    "unknown edit operation: {operation}"
                )));
            };
            let (responder, rx) = oneshot::channel();
            let request =
                api::client::Request::Edit(api::client::EditRequest {
                    session_id,
                    db,
                    operation,
                    config,
                    responder,
                });
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::CopyConfig { source, target } => {
            let (source, target) = match (parse_db(&source), parse_db(&target))
            {
                (Ok(source), Ok(target)) => (source, target),
                (Err(error), _) | (_, Err(error)) => {
                    return error_response(&error);
                }
            };
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::CopyConfig(
                api::client::CopyConfigRequest {
                    session_id,
                    source,
                    target,
                    responder,
                },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::DeleteConfig { db } => {
            let db = match parse_db(&db) {
                Ok(db) => db,
                Err(error) => return error_response(&error),
            };
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::DeleteConfig(
                api::client::DeleteConfigRequest {
                    session_id,
                    db,
                    responder,
                },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::Lock { db } => {
            let db = match parse_db(&db) {
                Ok(db) => db,
                Err(error) => return error_response(&error),
            };
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Lock(
                api::client::LockRequest { session_id, db, responder },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::Unlock { db } => {
            let db = match parse_db(&db) {
                Ok(db) => db,
                Err(error) => return error_response(&error),
            };
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Unlock(
                api::client::UnlockRequest { session_id, db, responder },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::Validate => {
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Validate(
                api::client::ValidateRequest { responder },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::Commit => {
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Commit(
                api::client::CommitRequest { session_id, responder },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::DiscardChanges => {
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Discard(
                api::client::DiscardRequest { session_id, responder },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::Get { xpath } => {
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Get(api::client::GetRequest {
                xpath,
                responder,
            });
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => data_response(result),
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::GetMonitoring => {
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::NetconfState(
                api::client::NetconfStateRequest { responder },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(data) => protocol::Response::Data { data },
                Err(error) => error_response(&error),
            }
        }
        protocol::Request::CreateSubscription { stream } => {
            let (responder, rx) = oneshot::channel();
            let request = api::client::Request::Subscribe(
                api::client::SubscribeRequest {
                    session_id,
                    stream,
                    notifier: notifier.clone(),
                    responder,
                },
            );
            match roundtrip(request_tx, request, rx).await {
                Ok(result) => result_response(result),
                Err(error) => error_response(&error),
            }
        }
    }
}

// ===== helper functions =====

// Resolves a client-supplied datastore name. The scratch databases are
// never visible to clients.
fn parse_db(name: &str) -> Result<DbName, Error> {
    DbName::from_str(name)
        .ok()
        .filter(|db| db.is_client_visible())
        .ok_or_else(|| Error::InvalidDatabase(name.to_owned()))
}

async fn roundtrip<T>(
    request_tx: &api::ClientSender,
    request: api::client::Request,
    rx: oneshot::Receiver<T>,
) -> Result<T, Error> {
    request_tx
        .send(request)
        .await
        .map_err(|_| channel_closed())?;
    rx.await.map_err(|_| channel_closed())
}

fn channel_closed() -> Error {
    Error::Socket(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "northbound channel closed",
    ))
}

fn error_response(error: &Error) -> protocol::Response {
    protocol::Response::RpcError(protocol::RpcError::from(error))
}

fn result_response(
    result: crate::northbound::Result<()>,
) -> protocol::Response {
    match result {
        Ok(()) => protocol::Response::Ok,
        Err(error) => error_response(&error),
    }
}

fn data_response(
    result: crate::northbound::Result<String>,
) -> protocol::Response {
    match result {
        Ok(data) => protocol::Response::Data { data },
        Err(error) => error_response(&error),
    }
}

async fn send_response(
    writer: &mut OwnedWriteHalf,
    response: &protocol::Response,
) -> std::io::Result<()> {
    let mut encoded = serde_json::to_string(response)
        .map_err(std::io::Error::other)?;
    encoded.push('\n');
    writer.write_all(encoded.as_bytes()).await?;
    writer.flush().await
}
