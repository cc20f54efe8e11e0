//! Smoke test module for islet hosts.
//!
//! Exports both entry points. Each initialization sets `value = 42` plus a
//! few properties describing where it ran; the loop-aware one also posts a
//! callback to prove the isolate loop is live.

use std::sync::atomic::{AtomicU64, Ordering};

use islet_extension_sdk::prelude::*;

/// Module name reported in the exports.
pub const MODULE_NAME: &str = "islet-smoke";

static LOOP_CALLBACKS: AtomicU64 = AtomicU64::new(0);

/// Number of loop callbacks that have run in this process.
pub fn loop_callbacks() -> u64 {
    LOOP_CALLBACKS.load(Ordering::SeqCst)
}

fn describe(module: &mut ModuleInit<'_>) -> InitResult<()> {
    let (isolate, context) = (module.isolate_id(), module.context_id());
    let exports = module.exports();
    exports.set_number("value", 42.0)?;
    exports.set_string("name", MODULE_NAME)?;
    exports.set_json("origin", &json!({ "isolate": isolate, "context": context }))
}

fn init(module: &mut ModuleInit<'_>) -> InitResult<()> {
    describe(module)?;
    module.exports().set_bool("loop", false)
}

fn init_with_loop(module: &mut ModuleInit<'_>) -> InitResult<()> {
    describe(module)?;
    let event_loop = module
        .event_loop()
        .ok_or_else(|| InitError::custom("host passed no loop"))?;
    event_loop.post(|| {
        LOOP_CALLBACKS.fetch_add(1, Ordering::SeqCst);
    })?;
    module.exports().set_bool("loop", true)
}

declare_module!(simple: init, with_loop: init_with_loop);
