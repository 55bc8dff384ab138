//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::HookPhase;

#[derive(Debug)]
pub enum Debug<'a> {
    PluginInit(&'a str),
    PluginStart(&'a str),
    PluginReset(&'a str),
    PluginExit(&'a str),
    HookCallback(HookPhase, &'a str),
}

// ===== impl Debug =====

impl Debug<'_> {
    pub fn log(&self) {
        match self {
            Debug::PluginInit(plugin)
            | Debug::PluginStart(plugin)
            | Debug::PluginReset(plugin)
            | Debug::PluginExit(plugin) => {
                debug_span!("northbound").in_scope(|| {
                    debug!(%plugin, "{}", self);
                });
            }
            Debug::HookCallback(phase, plugin) => {
                debug_span!("northbound").in_scope(|| {
                    debug!(?phase, %plugin, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::PluginInit(..) => {
                write!(f, "plugin init")
            }
            Debug::PluginStart(..) => {
                write!(f, "plugin start")
            }
            Debug::PluginReset(..) => {
                write!(f, "plugin reset")
            }
            Debug::PluginExit(..) => {
                write!(f, "plugin exit")
            }
            Debug::HookCallback(..) => {
                write!(f, "transaction callback")
            }
        }
    }
}
