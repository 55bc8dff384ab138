//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::northbound::Error;

// Client -> daemon wire messages, one JSON document per line.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    Hello,
    GetConfig { db: String, xpath: Option<String> },
    EditConfig { db: String, operation: String, config: String },
    CopyConfig { source: String, target: String },
    DeleteConfig { db: String },
    Lock { db: String },
    Unlock { db: String },
    Validate,
    Commit,
    DiscardChanges,
    Get { xpath: Option<String> },
    GetMonitoring,
    CreateSubscription { stream: String },
}

// Daemon -> client wire messages.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Response {
    Hello { session_id: u32, capabilities: Vec<String> },
    Ok,
    Data { data: String },
    Notification { data: String },
    RpcError(RpcError),
}

// RFC 6241 rpc-error projection of a northbound error.
#[derive(Debug, Deserialize, Serialize)]
pub struct RpcError {
    pub error_type: String,
    pub error_tag: String,
    pub error_severity: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_info: Option<String>,
}

// ===== impl RpcError =====

impl RpcError {
    fn new(error_type: &str, error_tag: &str, message: String) -> RpcError {
        RpcError {
            error_type: error_type.to_owned(),
            error_tag: error_tag.to_owned(),
            error_severity: "error".to_owned(),
            error_message: message,
            error_path: None,
            error_info: None,
        }
    }
}

impl From<&Error> for RpcError {
    fn from(error: &Error) -> RpcError {
        use conifer_datastore::Error as DsError;

        let message = error.to_string();
        match error {
            Error::Datastore(error) => match error {
                DsError::Locked { held_by, .. } => {
                    let mut rpc_error =
                        RpcError::new("protocol", "lock-denied", message);
                    rpc_error.error_info = Some(held_by.to_string());
                    rpc_error
                }
                DsError::NotLocked(_) => {
                    RpcError::new("protocol", "operation-failed", message)
                }
                DsError::DataExists(path) => {
                    let mut rpc_error =
                        RpcError::new("application", "data-exists", message);
                    rpc_error.error_path = Some(path.clone());
                    rpc_error
                }
                DsError::DataMissing(path) => {
                    let mut rpc_error =
                        RpcError::new("application", "data-missing", message);
                    rpc_error.error_path = Some(path.clone());
                    rpc_error
                }
                DsError::Schema(_) => {
                    RpcError::new("application", "invalid-value", message)
                }
                _ => RpcError::new("application", "operation-failed", message),
            },
            Error::Validation(_) => {
                RpcError::new("application", "invalid-value", message)
            }
            Error::InvalidDatabase(_) | Error::InvalidOperation(_) => {
                RpcError::new("application", "invalid-value", message)
            }
            _ => RpcError::new("application", "operation-failed", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conifer_datastore::DbName;

    #[test]
    fn lock_denied_carries_holder() {
        let error = Error::Datastore(conifer_datastore::Error::Locked {
            db: DbName::Candidate,
            held_by: 3,
        });
        let rpc_error = RpcError::from(&error);
        assert_eq!(rpc_error.error_tag, "lock-denied");
        assert_eq!(rpc_error.error_type, "protocol");
        assert_eq!(rpc_error.error_info.as_deref(), Some("3"));
    }

    #[test]
    fn data_exists_carries_path() {
        let error = Error::Datastore(conifer_datastore::Error::DataExists(
            "/conifer-system:system/hostname".to_owned(),
        ));
        let rpc_error = RpcError::from(&error);
        assert_eq!(rpc_error.error_tag, "data-exists");
        assert_eq!(
            rpc_error.error_path.as_deref(),
            Some("/conifer-system:system/hostname")
        );
    }

    #[test]
    fn wire_roundtrip() {
        let request = Request::EditConfig {
            db: "candidate".to_owned(),
            operation: "merge".to_owned(),
            config: "<system/>".to_owned(),
        };
        let encoded = serde_json::to_string(&request).unwrap();
        assert!(encoded.contains("edit-config"));
        let decoded: Request = serde_json::from_str(&encoded).unwrap();
        assert!(matches!(decoded, Request::EditConfig { .. }));
    }
}
