//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub group: String,
    pub socket_path: String,
    pub pidfile_path: String,
    pub datastore: DatastoreConfig,
    pub yang: Yang,
    pub startup: Startup,
    pub monitoring: Monitoring,
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatastoreConfig {
    pub dir: String,
    // Datastore backend plugin; only the built-in text store is compiled in.
    pub plugin: String,
    pub format: String,
    pub pretty: bool,
    pub cache: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Yang {
    pub modules: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Startup {
    pub mode: String,
    // Advertise and expose the startup datastore.
    pub enabled: bool,
    pub extra_xml: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Monitoring {
    // Directory advertised as the filesystem location of the YANG schemas.
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub journald: LoggingJournald,
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingJournald {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub style: LoggingFmtStyle,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    pub style: LoggingFmtStyle,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/coniferd.toml";

    // Reads the configuration file. An explicitly requested file that cannot
    // be read or parsed is a hard error; without `-f` the built-in defaults
    // apply when the default path is absent.
    pub(crate) fn load(config_file: Option<&str>) -> Result<Config, String> {
        let explicit = config_file.is_some();
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str).map_err(|error| {
                format!("failed to parse {config_file}: {error}")
            }),
            Err(error) if explicit => {
                Err(format!("failed to read {config_file}: {error}"))
            }
            Err(_) => Ok(Config::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            group: "conifer".to_owned(),
            socket_path: "/var/run/coniferd.sock".to_owned(),
            pidfile_path: "/var/run/coniferd.pid".to_owned(),
            datastore: Default::default(),
            yang: Default::default(),
            startup: Default::default(),
            monitoring: Default::default(),
            logging: Default::default(),
        }
    }
}

// ===== impl DatastoreConfig =====

impl Default for DatastoreConfig {
    fn default() -> DatastoreConfig {
        DatastoreConfig {
            dir: "/var/lib/conifer".to_owned(),
            plugin: "text".to_owned(),
            format: "xml".to_owned(),
            pretty: false,
            cache: true,
        }
    }
}

// ===== impl Yang =====

impl Default for Yang {
    fn default() -> Yang {
        Yang {
            modules: conifer_yang::YANG_IMPLEMENTED_MODULES
                .iter()
                .map(|module| (*module).to_owned())
                .collect(),
        }
    }
}

// ===== impl Startup =====

impl Default for Startup {
    fn default() -> Startup {
        Startup {
            mode: "startup".to_owned(),
            enabled: true,
            extra_xml: None,
        }
    }
}

// ===== impl LoggingJournald =====

impl Default for LoggingJournald {
    fn default() -> LoggingJournald {
        LoggingJournald { enabled: false }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "coniferd.log".to_owned(),
            style: LoggingFmtStyle::Full,
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            style: LoggingFmtStyle::Full,
        }
    }
}
