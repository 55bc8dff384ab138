//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

mod error;
mod store;
#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use store::{Datastore, DbLock, parse_tree};

/// Well-known database names.
///
/// `Tmp` and `Backup` are scratch databases that exist only inside startup
/// and commit scopes; they are never visible to clients.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DbName {
    Running,
    Candidate,
    Startup,
    Tmp,
    Backup,
}

/// Database serialization format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DbFormat {
    #[default]
    Xml,
    Json,
}

/// Edit-config operation (RFC 6241 section 7.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PutOperation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

// ===== impl DbName =====

impl DbName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DbName::Running => "running",
            DbName::Candidate => "candidate",
            DbName::Startup => "startup",
            DbName::Tmp => "tmp",
            DbName::Backup => "backup",
        }
    }

    // Whether clients may address this database by name.
    pub const fn is_client_visible(&self) -> bool {
        matches!(self, DbName::Running | DbName::Candidate | DbName::Startup)
    }

    pub const fn all() -> [DbName; 5] {
        [
            DbName::Running,
            DbName::Candidate,
            DbName::Startup,
            DbName::Tmp,
            DbName::Backup,
        ]
    }
}

impl std::fmt::Display for DbName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DbName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<DbName, ()> {
        match s {
            "running" => Ok(DbName::Running),
            "candidate" => Ok(DbName::Candidate),
            "startup" => Ok(DbName::Startup),
            "tmp" => Ok(DbName::Tmp),
            "backup" => Ok(DbName::Backup),
            _ => Err(()),
        }
    }
}

// ===== impl DbFormat =====

impl std::str::FromStr for DbFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<DbFormat, ()> {
        match s {
            "xml" => Ok(DbFormat::Xml),
            "json" => Ok(DbFormat::Json),
            _ => Err(()),
        }
    }
}

// ===== impl PutOperation =====

impl std::fmt::Display for PutOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PutOperation::Merge => "merge",
            PutOperation::Replace => "replace",
            PutOperation::Create => "create",
            PutOperation::Delete => "delete",
            PutOperation::Remove => "remove",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PutOperation {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<PutOperation, ()> {
        match s {
            "merge" => Ok(PutOperation::Merge),
            "replace" => Ok(PutOperation::Replace),
            "create" => Ok(PutOperation::Create),
            "delete" => Ok(PutOperation::Delete),
            "remove" => Ok(PutOperation::Remove),
            _ => Err(()),
        }
    }
}
