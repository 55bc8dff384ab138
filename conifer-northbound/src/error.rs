//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

use crate::HookPhase;

// Northbound errors.
#[derive(Debug)]
pub enum Error {
    PluginInit { plugin: &'static str, error: String },
    PluginStart { plugin: &'static str, error: String },
    PluginReset { plugin: &'static str, error: String },
    StateData { plugin: &'static str, error: String },
    HookCallback { phase: HookPhase, plugin: &'static str, error: String },
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::PluginInit { plugin, error }
            | Error::PluginStart { plugin, error }
            | Error::PluginReset { plugin, error }
            | Error::StateData { plugin, error } => {
                warn!(%plugin, %error, "{}", self);
            }
            Error::HookCallback { phase, plugin, error } => {
                warn!(?phase, %plugin, %error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PluginInit { .. } => {
                write!(f, "plugin initialization failed")
            }
            Error::PluginStart { .. } => {
                write!(f, "plugin start failed")
            }
            Error::PluginReset { .. } => {
                write!(f, "plugin reset failed")
            }
            Error::StateData { .. } => {
                write!(f, "state data callback failed")
            }
            Error::HookCallback { phase, .. } => {
                write!(f, "transaction {phase} callback failed")
            }
        }
    }
}

impl std::error::Error for Error {}
