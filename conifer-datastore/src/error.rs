//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::DbName;

//
// Type aliases.
//
pub type Result<T> = std::result::Result<T, Error>;

//
// Datastore errors.
//
#[derive(Debug)]
pub enum Error {
    // Filesystem or serialization failure.
    Storage(std::io::Error),
    // YANG parse or bind failure; the yang error carries the node path.
    Schema(yang3::Error),
    NotFound(DbName),
    Exists(DbName),
    // Edit-config create precondition failed.
    DataExists(String),
    // Edit-config delete precondition failed.
    DataMissing(String),
    Locked { db: DbName, held_by: u32 },
    NotLocked(DbName),
}

// ===== impl Error =====

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage(error) => {
                write!(f, "storage failure: {error}")
            }
            Error::Schema(error) => {
                write!(f, "schema failure: {error}")
            }
            Error::NotFound(db) => {
                write!(f, "database does not exist: {db}")
            }
            Error::Exists(db) => {
                write!(f, "database already exists: {db}")
            }
            Error::DataExists(path) => {
                write!(f, "data already exists: {path}")
            }
            Error::DataMissing(path) => {
                write!(f, "data is missing: {path}")
            }
            Error::Locked { db, held_by } => {
                write!(f, "database {db} is locked by session {held_by}")
            }
            Error::NotLocked(db) => {
                write!(f, "database {db} is not locked")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(error) => Some(error),
            Error::Schema(error) => Some(error),
            _ => None,
        }
    }
}
