//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod northbound;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::str::FromStr;

use clap::{App, Arg};
use config::{Config, LoggingFmtStyle};
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Gid, Group, Pid};
use northbound::{Northbound, StartupMode};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

// Log destination selected with -l: journald, stderr, stdout or file.
enum LogDestination {
    Journald,
    Stderr,
    Stdout,
    File(String),
}

fn init_tracing(
    config: &config::Logging,
    debug_level: u32,
    destination: Option<LogDestination>,
) {
    let log_level = match debug_level {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let log_level_filter = LevelFilter::from_level(log_level);

    // Enable logging to journald.
    let journald_enabled = match &destination {
        Some(destination) => matches!(destination, LogDestination::Journald),
        None => config.journald.enabled,
    };
    let journald = journald_enabled.then(|| {
        tracing_journald::layer().expect("couldn't connect to journald")
    });

    // Enable logging to a file.
    let file_override = match &destination {
        Some(LogDestination::File(path)) => Some(path.clone()),
        _ => None,
    };
    let file_enabled = file_override.is_some()
        || (destination.is_none() && config.file.enabled);
    let file = file_enabled.then(|| {
        let (dir, name) = match &file_override {
            Some(path) => {
                let path = Path::new(path);
                let dir = path
                    .parent()
                    .map(|dir| dir.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ".".to_owned());
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| config.file.name.clone());
                (dir, name)
            }
            None => (config.file.dir.clone(), config.file.name.clone()),
        };
        let file_appender = rolling::never(dir, name);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_ansi(false);
        let layer = match config.file.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout or stderr.
    let stdout_enabled = match &destination {
        Some(destination) => {
            matches!(destination, LogDestination::Stdout | LogDestination::Stderr)
        }
        None => config.stdout.enabled,
    };
    let stderr_writer = matches!(&destination, Some(LogDestination::Stderr));
    let stdout = stdout_enabled.then(|| {
        let layer = match stderr_writer {
            true => {
                let layer = tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                match config.stdout.style {
                    LoggingFmtStyle::Compact => layer.compact().boxed(),
                    LoggingFmtStyle::Full => layer.boxed(),
                    LoggingFmtStyle::Json => layer.json().boxed(),
                    LoggingFmtStyle::Pretty => layer.pretty().boxed(),
                }
            }
            false => {
                let layer =
                    tracing_subscriber::fmt::layer().with_target(false);
                match config.stdout.style {
                    LoggingFmtStyle::Compact => layer.compact().boxed(),
                    LoggingFmtStyle::Full => layer.boxed(),
                    LoggingFmtStyle::Json => layer.json().boxed(),
                    LoggingFmtStyle::Pretty => layer.pretty().boxed(),
                }
            }
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("conifer=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(journald)
        .with(file)
        .with(stdout)
        .init();
}

// Kills an existing daemon instance identified by the pidfile and removes
// its socket.
fn zap(config: &Config) {
    if let Some(pid) = pidfile_read(&config.pidfile_path) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        eprintln!("killed daemon with pid {pid}");
    }
    let _ = std::fs::remove_file(&config.pidfile_path);
    let _ = std::fs::remove_file(&config.socket_path);
}

fn pidfile_read(path: &str) -> Option<i32> {
    let data = std::fs::read_to_string(path).ok()?;
    data.trim().parse().ok()
}

// Whether a process with the given pid is alive.
fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

fn pidfile_write(path: &str) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

fn group_gid(name: &str) -> Option<Gid> {
    Group::from_name(name).ok().flatten().map(|group| group.gid)
}

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Conifer configuration daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("debug")
                .short("D")
                .value_name("level")
                .help("Set debug verbosity level."),
        )
        .arg(
            Arg::with_name("config")
                .short("f")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("log")
                .short("l")
                .value_name("s|e|o|f<file>")
                .help("Log to journald (s), stderr (e), stdout (o) or a file (f<file>)."),
        )
        .arg(
            Arg::with_name("plugin-dir")
                .short("d")
                .value_name("dir")
                .help("Specify the backend plugin directory."),
        )
        .arg(
            Arg::with_name("db-dir")
                .short("b")
                .value_name("dir")
                .help("Specify the datastore directory."),
        )
        .arg(
            Arg::with_name("foreground")
                .short("F")
                .help("Run in foreground, do not run as daemon."),
        )
        .arg(
            Arg::with_name("zap")
                .short("z")
                .help("Kill the running daemon and exit."),
        )
        .arg(
            Arg::with_name("family")
                .short("a")
                .value_name("UNIX|IPv4|IPv6")
                .help("Internal backend socket family."),
        )
        .arg(
            Arg::with_name("sock")
                .short("u")
                .value_name("path|addr")
                .help("Internal socket domain path or IP address (see -a)."),
        )
        .arg(
            Arg::with_name("pidfile")
                .short("P")
                .value_name("file")
                .help("Pid filename."),
        )
        .arg(
            Arg::with_name("once")
                .short("1")
                .help("Run startup reconciliation once and then quit."),
        )
        .arg(
            Arg::with_name("startup-mode")
                .short("s")
                .value_name("mode")
                .help("Startup mode: none|startup|running|init."),
        )
        .arg(
            Arg::with_name("extra-xml")
                .short("c")
                .value_name("file")
                .help("Merge extra xml configuration at startup, without commit."),
        )
        .arg(
            Arg::with_name("group")
                .short("g")
                .value_name("group")
                .help("Client membership required to this group."),
        )
        .arg(
            Arg::with_name("yang-module")
                .short("y")
                .value_name("module")
                .help("Override the main YANG module."),
        )
        .arg(
            Arg::with_name("datastore-plugin")
                .short("x")
                .value_name("plugin")
                .help("Datastore plugin name."),
        )
        .arg(
            Arg::with_name("plugin-args")
                .multiple(true)
                .help("Residual arguments passed to plugin start."),
        )
        .get_matches();

    // Read configuration file and apply command-line overrides.
    let config_file = matches.value_of("config");
    let mut config = match Config::load(config_file) {
        Ok(config) => config,
        Err(error) => fatal(&error),
    };
    if let Some(dir) = matches.value_of("db-dir") {
        config.datastore.dir = dir.to_owned();
    }
    if let Some(sock) = matches.value_of("sock") {
        config.socket_path = sock.to_owned();
    }
    if let Some(pidfile) = matches.value_of("pidfile") {
        config.pidfile_path = pidfile.to_owned();
    }
    if let Some(group) = matches.value_of("group") {
        config.group = group.to_owned();
    }
    if let Some(mode) = matches.value_of("startup-mode") {
        config.startup.mode = mode.to_owned();
    }
    if let Some(file) = matches.value_of("extra-xml") {
        config.startup.extra_xml = Some(file.to_owned());
    }
    if let Some(module) = matches.value_of("yang-module") {
        config.yang.modules = vec![module.to_owned()];
    }
    if let Some(plugin) = matches.value_of("datastore-plugin") {
        config.datastore.plugin = plugin.to_owned();
    }
    if let Some(family) = matches.value_of("family")
        && family != "UNIX"
    {
        fatal(&format!("unsupported socket family: {family}"));
    }
    if config.datastore.plugin != "text" {
        fatal(&format!(
            "unknown datastore plugin: {}",
            config.datastore.plugin
        ));
    }
    let debug_level = matches
        .value_of("debug")
        .map(|level| match level.parse() {
            Ok(level) => level,
            Err(_) => fatal(&format!("invalid debug level: {level}")),
        })
        .unwrap_or(0);
    let log_destination =
        matches.value_of("log").map(|value| match value.chars().next() {
            Some('s') => LogDestination::Journald,
            Some('e') => LogDestination::Stderr,
            Some('o') => LogDestination::Stdout,
            Some('f') if value.len() > 1 => {
                LogDestination::File(value[1..].to_owned())
            }
            _ => fatal(&format!("invalid log destination: {value}")),
        });
    let startup_mode = match StartupMode::from_str(&config.startup.mode) {
        Ok(mode) => mode,
        Err(_) => fatal(&format!("invalid startup mode: {}", config.startup.mode)),
    };
    let plugin_args = matches
        .values_of("plugin-args")
        .map(|values| values.map(String::from).collect::<Vec<_>>())
        .unwrap_or_default();

    // Initialize tracing.
    init_tracing(&config.logging, debug_level, log_destination);

    // Kill an existing daemon instance and exit.
    if matches.is_present("zap") {
        zap(&config);
        return;
    }

    // Refuse to start over a live instance.
    if let Some(pid) = pidfile_read(&config.pidfile_path)
        && pid_alive(pid)
    {
        fatal(&format!(
            "daemon already running with pid {pid} (try killing it with -z)"
        ));
    }
    let _ = std::fs::remove_file(&config.pidfile_path);
    let _ = std::fs::remove_file(&config.socket_path);

    // Sanity check: the configured client group must exist.
    let Some(gid) = group_gid(&config.group) else {
        fatal(&format!(
            "'{}' does not seem to be a valid user group",
            config.group
        ));
    };

    // Create the global YANG context.
    conifer_yang::create_context(config.yang.modules.clone());

    // Initialize the northbound core.
    let (client_tx, client_rx) = mpsc::channel(4);
    let plugins = conifer_northbound::PluginRegistry::new();
    let mut nb = match Northbound::init(&config, plugins, client_rx) {
        Ok(nb) => nb,
        Err(error) => fatal(&format!("initialization failed: {error}")),
    };

    // Boot-time datastore reconciliation.
    let extra_xml = config.startup.extra_xml.as_deref().map(Path::new);
    if let Err(error) = nb.startup(startup_mode, extra_xml) {
        fatal(&format!("startup failed: {error}"));
    }

    // Call plugin start with the residual command-line arguments.
    if let Err(error) = nb.start_plugins(&plugin_args) {
        fatal(&format!("plugin start failed: {error}"));
    }

    // Run once: quit after the startup reconciliation.
    if matches.is_present("once") {
        info!("startup reconciliation complete");
        return;
    }

    // Daemonize unless running in foreground.
    if !matches.is_present("foreground")
        && let Err(error) = nix::unistd::daemon(false, false)
    {
        fatal(&format!("failed to daemonize: {error}"));
    }

    // Write the pidfile after the fork.
    if let Err(error) = pidfile_write(&config.pidfile_path) {
        fatal(&format!("failed to write pidfile: {error}"));
    }

    // Bind the server socket and restrict it to the configured group.
    let listener = match std::os::unix::net::UnixListener::bind(
        &config.socket_path,
    ) {
        Ok(listener) => listener,
        Err(error) => fatal(&format!(
            "failed to bind {}: {error}",
            config.socket_path
        )),
    };
    if let Err(error) =
        nix::unistd::chown(Path::new(&config.socket_path), None, Some(gid))
    {
        error!(%error, "failed to set socket group ownership");
    }
    if let Err(error) = std::fs::set_permissions(
        &config.socket_path,
        std::fs::Permissions::from_mode(0o660),
    ) {
        error!(%error, "failed to set socket permissions");
    }

    info!(pid = %std::process::id(), "started");

    // The core runs on a single-threaded cooperative event loop.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime");
    runtime.block_on(async {
        listener
            .set_nonblocking(true)
            .expect("failed to configure server socket");
        let listener = tokio::net::UnixListener::from_std(listener)
            .expect("failed to register server socket");

        // Accept clients on the server socket.
        tokio::spawn(northbound::client::unix::listen(listener, client_tx));

        // Signal handlers only set a flag observed by the event loop.
        let (signal_tx, signal_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm = signal(SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            let mut sigint = signal(SignalKind::interrupt())
                .expect("failed to register SIGINT handler");
            tokio::select! {
                _ = sigterm.recv() => (),
                _ = sigint.recv() => (),
            }
            let _ = signal_tx.send(()).await;
        });

        nb.run(signal_rx).await;
    });

    // Teardown.
    let _ = std::fs::remove_file(&config.socket_path);
    let _ = std::fs::remove_file(&config.pidfile_path);
    info!("terminated");
}
