//
// Copyright (c) The Conifer Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::sync::{Arc, LazyLock as Lazy, OnceLock};

use maplit::hashmap;
use tracing::error;
use yang3::context::{
    Context, ContextFlags, EmbeddedModuleKey, EmbeddedModules,
};

// Global YANG context.
pub static YANG_CTX: OnceLock<Arc<Context>> = OnceLock::new();

// List of embedded YANG modules.
//
// All implemented or imported modules need to be specified here. Conifer
// doesn't support loading YANG modules from the filesystem; the main-module
// override selects among the embedded ones.
pub static YANG_EMBEDDED_MODULES: Lazy<EmbeddedModules> = Lazy::new(|| {
    hashmap! {
        EmbeddedModuleKey::new("conifer-system", Some("2025-03-20"), None, None) =>
            include_str!("../modules/conifer-system@2025-03-20.yang"),
        EmbeddedModuleKey::new("conifer-interfaces", Some("2025-03-20"), None, None) =>
            include_str!("../modules/conifer-interfaces@2025-03-20.yang"),
    }
});

// All modules implemented by default.
pub static YANG_IMPLEMENTED_MODULES: Lazy<Vec<&'static str>> =
    Lazy::new(|| {
        vec![
            "conifer-system",
            "conifer-interfaces",
        ]
    });

// All features currently enabled, per module.
pub static YANG_FEATURES: Lazy<HashMap<&'static str, Vec<&'static str>>> =
    Lazy::new(|| hashmap! {});

// ===== global functions =====

// Creates empty YANG context.
pub fn new_context() -> Context {
    let mut ctx = Context::new(
        ContextFlags::NO_YANGLIBRARY | ContextFlags::DISABLE_SEARCHDIRS,
    )
    .expect("Failed to create YANG context");
    ctx.set_embedded_modules(&YANG_EMBEDDED_MODULES);
    ctx
}

// Loads a YANG module.
pub fn load_module(ctx: &mut Context, name: &str) {
    let features = YANG_FEATURES
        .get(name)
        .map(|features| features.as_slice())
        .unwrap_or_else(|| &[]);
    if let Err(error) = ctx.load_module(name, None, features) {
        error!(%error, "failed to load YANG module");
        std::process::exit(1);
    }
}

// Creates the global YANG context and loads the requested modules into it.
//
// Idempotent so test processes may call it from multiple entry points.
pub fn create_context(modules: impl IntoIterator<Item = String>) {
    let mut yang_ctx = new_context();
    for module_name in modules {
        load_module(&mut yang_ctx, &module_name);
    }
    let _ = YANG_CTX.set(Arc::new(yang_ctx));
}
