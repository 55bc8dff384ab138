//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Authenticated caller identities, attributed by a monotonically assigned
/// 32-bit id.
#[derive(Debug, Default)]
pub struct Sessions {
    next_id: u32,
    active: BTreeMap<u32, Session>,
}

#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub connected_at: DateTime<Utc>,
}

// ===== impl Sessions =====

impl Sessions {
    pub(crate) fn new() -> Sessions {
        Default::default()
    }

    pub(crate) fn attach(&mut self) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.active.insert(
            id,
            Session {
                id,
                connected_at: Utc::now(),
            },
        );
        debug!(session_id = %id, "session attached");
        id
    }

    pub(crate) fn detach(&mut self, id: u32) {
        if let Some(session) = self.active.remove(&id) {
            debug!(
                session_id = %session.id,
                connected_at = %session.connected_at,
                "session detached"
            );
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.active.len()
    }
}
