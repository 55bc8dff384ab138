//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fmt::Write;

use chrono::SecondsFormat;
use conifer_datastore::{Datastore, DbName};
use conifer_yang::YANG_CTX;

pub const NETCONF_MONITORING_NAMESPACE: &str =
    "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

// Projects the current datastore, lock and schema state as an RFC 6022
// netconf-state document. The view is stateless: each request recomputes
// from live tree-store metadata.
pub(crate) fn netconf_state(
    store: &Datastore,
    capabilities: &[String],
    startup_feature: bool,
    location_dir: Option<&str>,
) -> String {
    let mut cb = String::new();

    write!(cb, "<netconf-state xmlns=\"{NETCONF_MONITORING_NAMESPACE}\">")
        .unwrap();
    write_capabilities(&mut cb, capabilities);
    write_datastores(&mut cb, store, startup_feature);
    write_schemas(&mut cb, location_dir);
    cb.push_str("<sessions/>");
    cb.push_str("<statistics/>");
    cb.push_str("</netconf-state>");

    cb
}

fn write_capabilities(cb: &mut String, capabilities: &[String]) {
    cb.push_str("<capabilities>");
    for capability in capabilities {
        write!(cb, "<capability>{}</capability>", xml_escape(capability))
            .unwrap();
    }
    cb.push_str("</capabilities>");
}

// RFC 6022 section 2.1.2.
fn write_datastores(cb: &mut String, store: &Datastore, startup_feature: bool) {
    cb.push_str("<datastores>");
    per_datastore(cb, store, DbName::Running);
    per_datastore(cb, store, DbName::Candidate);
    if startup_feature {
        per_datastore(cb, store, DbName::Startup);
    }
    cb.push_str("</datastores>");
}

fn per_datastore(cb: &mut String, store: &Datastore, db: DbName) {
    write!(cb, "<datastore><name>{db}</name>").unwrap();
    if let Some(lock) = store.lock_info(db) {
        cb.push_str("<locks>");
        write!(
            cb,
            "<locked-by-session>{}</locked-by-session>",
            lock.session_id
        )
        .unwrap();
        write!(
            cb,
            "<locked-time>{}</locked-time>",
            lock.acquired_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
        .unwrap();
        cb.push_str("</locks>");
    }
    cb.push_str("</datastore>");
}

// RFC 6022 section 2.1.3.
fn write_schemas(cb: &mut String, location_dir: Option<&str>) {
    let yang_ctx = YANG_CTX.get().unwrap();

    cb.push_str("<schemas>");
    for module in yang_ctx.modules(true) {
        let identifier = module.name();
        let revision = module.revision();

        cb.push_str("<schema>");
        write!(cb, "<identifier>{}</identifier>", xml_escape(identifier))
            .unwrap();
        write!(
            cb,
            "<version>{}</version>",
            revision.map(xml_escape).unwrap_or_default()
        )
        .unwrap();
        cb.push_str("<format>yang</format>");
        write!(
            cb,
            "<namespace>{}</namespace>",
            xml_escape(module.namespace())
        )
        .unwrap();
        cb.push_str("<location>NETCONF</location>");
        if let Some(dir) = location_dir {
            match revision {
                Some(revision) => write!(
                    cb,
                    "<location>{dir}/{identifier}@{revision}.yang</location>"
                )
                .unwrap(),
                None => {
                    write!(cb, "<location>{dir}/{identifier}.yang</location>")
                        .unwrap()
                }
            }
        }
        cb.push_str("</schema>");
    }
    cb.push_str("</schemas>");
}

// ===== helper functions =====

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
