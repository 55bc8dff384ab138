//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use conifer_yang::YANG_CTX;
use tracing::debug;
use yang3::data::{
    Data, DataFormat, DataParserFlags, DataPrinterFlags, DataTree,
    DataValidationFlags,
};

use crate::error::{Error, Result};
use crate::{DbFormat, DbName, PutOperation};

/// The tree store.
///
/// Owns the named configuration databases: their on-disk files under the
/// datastore directory, the optional in-memory caches, and the per-database
/// locks. All mutations go through the staging-file-then-rename path so a
/// crash leaves either the pre- or post-image on disk.
pub struct Datastore {
    dir: PathBuf,
    format: DbFormat,
    pretty: bool,
    cache_enabled: bool,
    dbs: BTreeMap<DbName, DbState>,
}

#[derive(Default)]
struct DbState {
    cache: Option<DataTree>,
    lock: Option<DbLock>,
}

/// Exclusive write grant on a database.
#[derive(Clone, Copy, Debug)]
pub struct DbLock {
    pub session_id: u32,
    pub acquired_at: DateTime<Utc>,
}

// ===== impl Datastore =====

impl Datastore {
    pub fn new(
        dir: &Path,
        format: DbFormat,
        pretty: bool,
        cache_enabled: bool,
    ) -> Result<Datastore> {
        std::fs::create_dir_all(dir).map_err(Error::Storage)?;

        Ok(Datastore {
            dir: dir.to_owned(),
            format,
            pretty,
            cache_enabled,
            dbs: Default::default(),
        })
    }

    pub fn exists(&self, db: DbName) -> bool {
        self.db_path(db).exists()
    }

    // Materializes an empty database. Fails if it already exists.
    pub fn create(&mut self, db: DbName) -> Result<()> {
        if self.exists(db) {
            return Err(Error::Exists(db));
        }

        debug!(%db, "creating database");
        let yang_ctx = YANG_CTX.get().unwrap();
        self.write_db(db, &DataTree::new(yang_ctx))
    }

    // Removes the on-disk and cached copy of a database. Idempotent.
    pub fn delete(&mut self, db: DbName) -> Result<()> {
        debug!(%db, "deleting database");
        if let Err(error) = std::fs::remove_file(self.db_path(db))
            && error.kind() != std::io::ErrorKind::NotFound
        {
            return Err(Error::Storage(error));
        }
        if let Some(state) = self.dbs.get_mut(&db) {
            state.cache = None;
        }
        Ok(())
    }

    // Atomically replaces dst with a deep copy of src.
    pub fn copy(&mut self, src: DbName, dst: DbName) -> Result<()> {
        debug!(%src, %dst, "copying database");
        let dtree = self.content(src)?;
        self.write_db(dst, &dtree)
    }

    // Returns a deep copy of the database content.
    pub fn get(&mut self, db: DbName) -> Result<DataTree> {
        self.content(db)
    }

    // Returns a deep copy of the subtrees selected by the xpath expression.
    pub fn get_xpath(
        &mut self,
        db: DbName,
        xpath: &str,
    ) -> Result<DataTree> {
        let yang_ctx = YANG_CTX.get().unwrap();
        let content = self.content(db)?;

        let mut dtree = DataTree::new(yang_ctx);
        for dnode in content.find_xpath(xpath).map_err(Error::Schema)? {
            let subtree = dnode.duplicate(true).map_err(Error::Schema)?;
            dtree.merge(&subtree).map_err(Error::Schema)?;
        }
        Ok(dtree)
    }

    // Applies an edit-config operation to the database.
    pub fn put(
        &mut self,
        db: DbName,
        op: PutOperation,
        payload: &DataTree,
    ) -> Result<()> {
        debug!(%db, %op, "editing database");
        let mut content = self.content(db)?;

        match op {
            PutOperation::Merge => {
                content.merge(payload).map_err(Error::Schema)?;
            }
            PutOperation::Replace => {
                content = payload.duplicate().map_err(Error::Schema)?;
            }
            PutOperation::Create => {
                for path in edit_points(payload) {
                    if content.find_path(&path).is_ok() {
                        return Err(Error::DataExists(path));
                    }
                }
                content.merge(payload).map_err(Error::Schema)?;
            }
            PutOperation::Delete => {
                let paths = edit_points(payload);
                for path in &paths {
                    if content.find_path(path).is_err() {
                        return Err(Error::DataMissing(path.clone()));
                    }
                }
                // A removal may take descendants of a later path with it.
                for path in &paths {
                    if content.find_path(path).is_ok() {
                        content.remove(path).map_err(Error::Schema)?;
                    }
                }
            }
            PutOperation::Remove => {
                for path in edit_points(payload) {
                    if content.find_path(&path).is_ok() {
                        content.remove(&path).map_err(Error::Schema)?;
                    }
                }
            }
        }

        self.write_db(db, &content)
    }

    // Acquires the database lock on behalf of a session.
    pub fn lock(&mut self, db: DbName, session_id: u32) -> Result<()> {
        let state = self.dbs.entry(db).or_default();
        if let Some(lock) = &state.lock {
            return Err(Error::Locked {
                db,
                held_by: lock.session_id,
            });
        }

        debug!(%db, %session_id, "locking database");
        state.lock = Some(DbLock {
            session_id,
            acquired_at: Utc::now(),
        });
        Ok(())
    }

    // Releases the database lock. Only the holder may unlock.
    pub fn unlock(&mut self, db: DbName, session_id: u32) -> Result<()> {
        let state = self.dbs.entry(db).or_default();
        match &state.lock {
            Some(lock) if lock.session_id == session_id => {
                debug!(%db, %session_id, "unlocking database");
                state.lock = None;
                Ok(())
            }
            Some(lock) => Err(Error::Locked {
                db,
                held_by: lock.session_id,
            }),
            None => Err(Error::NotLocked(db)),
        }
    }

    // Releases all locks held by a session.
    pub fn unlock_session(&mut self, session_id: u32) {
        for (db, state) in self.dbs.iter_mut() {
            if let Some(lock) = &state.lock
                && lock.session_id == session_id
            {
                debug!(%db, %session_id, "releasing lock on session teardown");
                state.lock = None;
            }
        }
    }

    pub fn is_locked(&self, db: DbName) -> Option<u32> {
        self.lock_info(db).map(|lock| lock.session_id)
    }

    pub fn lock_info(&self, db: DbName) -> Option<DbLock> {
        self.dbs.get(&db).and_then(|state| state.lock)
    }

    // Checks that a session is allowed to mutate the database: either the
    // database is unlocked or the session holds the lock.
    pub fn verify_write_access(
        &self,
        db: DbName,
        session_id: u32,
    ) -> Result<()> {
        match self.is_locked(db) {
            Some(holder) if holder != session_id => {
                Err(Error::Locked { db, held_by: holder })
            }
            _ => Ok(()),
        }
    }

    // ===== private methods =====

    fn db_path(&self, db: DbName) -> PathBuf {
        self.dir.join(format!("{}_db", db.as_str()))
    }

    fn staging_path(&self, db: DbName) -> PathBuf {
        self.dir.join(format!("{}_db.new", db.as_str()))
    }

    // Returns the database content as an owned tree, serving from the cache
    // when enabled and populating it on miss.
    fn content(&mut self, db: DbName) -> Result<DataTree> {
        if self.cache_enabled
            && let Some(cache) = &self.dbs.entry(db).or_default().cache
        {
            return cache.duplicate().map_err(Error::Schema);
        }

        let dtree = self.read_db(db)?;
        if self.cache_enabled {
            let dup = dtree.duplicate().map_err(Error::Schema)?;
            self.dbs.entry(db).or_default().cache = Some(dup);
        }
        Ok(dtree)
    }

    fn read_db(&self, db: DbName) -> Result<DataTree> {
        let data = std::fs::read_to_string(self.db_path(db)).map_err(
            |error| match error.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(db),
                _ => Error::Storage(error),
            },
        )?;
        parse_tree(&data, self.format)
    }

    // Serializes the tree and renames it into place, then updates the cache.
    fn write_db(&mut self, db: DbName, dtree: &DataTree) -> Result<()> {
        let mut flags = DataPrinterFlags::WITH_SIBLINGS;
        if !self.pretty {
            flags |= DataPrinterFlags::SHRINK;
        }
        let data = dtree
            .print_string(data_format(self.format), flags)
            .map_err(Error::Schema)?
            .unwrap_or_default();

        let staging = self.staging_path(db);
        std::fs::write(&staging, data.as_bytes()).map_err(Error::Storage)?;
        std::fs::rename(&staging, self.db_path(db)).map_err(Error::Storage)?;

        if self.cache_enabled {
            let dup = dtree.duplicate().map_err(Error::Schema)?;
            self.dbs.entry(db).or_default().cache = Some(dup);
        }
        Ok(())
    }
}

// ===== helper functions =====

fn data_format(format: DbFormat) -> DataFormat {
    match format {
        DbFormat::Xml => DataFormat::XML,
        DbFormat::Json => DataFormat::JSON,
    }
}

// Parses database content bound to the loaded YANG schema. Validation is
// deferred to commit time.
pub fn parse_tree(data: &str, format: DbFormat) -> Result<DataTree> {
    let yang_ctx = YANG_CTX.get().unwrap();
    if data.trim().is_empty() {
        return Ok(DataTree::new(yang_ctx));
    }
    let data = std::ffi::CString::new(data).unwrap();
    DataTree::parse_string(
        yang_ctx,
        data.as_bytes_with_nul(),
        data_format(format),
        DataParserFlags::NO_VALIDATION,
        DataValidationFlags::NO_STATE,
    )
    .map_err(Error::Schema)
}

// Computes the set of paths an edit-config payload addresses: the deepest
// nodes of the payload, with list-key leaves standing for their list entry.
fn edit_points(payload: &DataTree) -> Vec<String> {
    let mut paths = Vec::new();

    for dnode in payload.traverse() {
        if dnode.children().next().is_some() {
            continue;
        }
        let dnode = if dnode.schema().is_list_key() {
            match dnode.ancestors().next() {
                Some(parent) => parent,
                None => dnode,
            }
        } else {
            dnode
        };
        let path = dnode.path();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    paths
}
