//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::northbound::{Error, Result};

/// Event stream registry.
///
/// Streams are registered once at boot. Subscribers receive events in
/// emission order; a dead subscriber channel is dropped on the next notify.
#[derive(Debug, Default)]
pub struct Streams {
    streams: BTreeMap<String, Stream>,
}

#[derive(Debug)]
struct Stream {
    #[expect(unused)]
    description: String,
    subscribers: Vec<Subscriber>,
}

#[derive(Debug)]
struct Subscriber {
    session_id: u32,
    notifier: UnboundedSender<String>,
}

// ===== impl Streams =====

impl Streams {
    pub(crate) fn new() -> Streams {
        Default::default()
    }

    pub(crate) fn register(&mut self, name: &str, description: &str) {
        debug!(stream = %name, "registering event stream");
        self.streams.insert(
            name.to_owned(),
            Stream {
                description: description.to_owned(),
                subscribers: Vec::new(),
            },
        );
    }

    pub(crate) fn subscribe(
        &mut self,
        name: &str,
        session_id: u32,
        notifier: UnboundedSender<String>,
    ) -> Result<()> {
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| Error::StreamNotFound(name.to_owned()))?;
        debug!(stream = %name, %session_id, "new stream subscription");
        stream.subscribers.push(Subscriber {
            session_id,
            notifier,
        });
        Ok(())
    }

    pub(crate) fn unsubscribe_session(&mut self, session_id: u32) {
        for stream in self.streams.values_mut() {
            stream
                .subscribers
                .retain(|subscriber| subscriber.session_id != session_id);
        }
    }

    // Delivers an event to every subscriber, in subscription order.
    pub(crate) fn notify(&mut self, name: &str, event: &str) {
        if let Some(stream) = self.streams.get_mut(name) {
            stream.subscribers.retain(|subscriber| {
                subscriber.notifier.send(event.to_owned()).is_ok()
            });
        }
    }
}
