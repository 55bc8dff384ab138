//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use conifer_northbound as northbound;

//
// Type aliases.
//
pub type Result<T> = std::result::Result<T, Error>;

//
// Northbound errors.
//
#[derive(Debug)]
pub enum Error {
    Config(String),
    Datastore(conifer_datastore::Error),
    // YANG validation failure at a commit boundary.
    Validation(yang3::Error),
    TransactionValidate(northbound::error::Error),
    TransactionCommit(northbound::error::Error),
    Plugin(northbound::error::Error),
    Socket(std::io::Error),
    InvalidDatabase(String),
    InvalidOperation(String),
    StreamNotFound(String),
    // Unrecoverable invariant violation; the process should exit.
    Fatal(String),
}

// ===== impl Error =====

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(message) => {
                write!(f, "configuration error: {message}")
            }
            Error::Datastore(error) => {
                write!(f, "datastore error: {error}")
            }
            Error::Validation(error) => {
                write!(f, "validation failed: {error}")
            }
            Error::TransactionValidate(error) => {
                write!(f, "transaction validation error: {error}")
            }
            Error::TransactionCommit(error) => {
                write!(f, "transaction commit error: {error}")
            }
            Error::Plugin(error) => {
                write!(f, "plugin error: {error}")
            }
            Error::Socket(error) => {
                write!(f, "socket error: {error}")
            }
            Error::InvalidDatabase(name) => {
                write!(f, "unknown datastore: {name}")
            }
            Error::InvalidOperation(message) => {
                write!(f, "invalid operation: {message}")
            }
            Error::StreamNotFound(name) => {
                write!(f, "unknown event stream: {name}")
            }
            Error::Fatal(message) => {
                write!(f, "fatal error: {message}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Datastore(error) => Some(error),
            Error::Validation(error) => Some(error),
            Error::TransactionValidate(error)
            | Error::TransactionCommit(error)
            | Error::Plugin(error) => Some(error),
            Error::Socket(error) => Some(error),
            _ => None,
        }
    }
}
