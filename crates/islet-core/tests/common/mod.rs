//! Statically linked modules shared by the integration tests.

#![allow(dead_code)]

use std::ptr;
use std::sync::Arc;

use islet_core::{EntryPoint, NativeModule};
use islet_extension_sdk::module::run_init;
use islet_extension_sdk::prelude::*;
use islet_extension_sdk::{RawContext, RawExports, RawIsolate, RawLoop};

/// Sets `value = 42` and `name = "answer"`.
pub fn answer(module: &mut ModuleInit<'_>) -> InitResult<()> {
    module.exports().set_number("value", 42.0)?;
    module.exports().set_string("name", "answer")
}

/// Throws instead of exporting anything useful.
pub fn failing(module: &mut ModuleInit<'_>) -> InitResult<()> {
    module.exports().set_number("partial", 1.0)?;
    Err(InitError::custom("initializer refused to run"))
}

pub unsafe extern "C" fn answer_entry(
    isolate: *mut RawIsolate,
    context: *mut RawContext,
    exports: *mut RawExports,
) {
    unsafe { run_init(isolate, context, exports, ptr::null_mut(), answer) }
}

pub unsafe extern "C" fn failing_entry(
    isolate: *mut RawIsolate,
    context: *mut RawContext,
    exports: *mut RawExports,
) {
    unsafe { run_init(isolate, context, exports, ptr::null_mut(), failing) }
}

/// A static module exporting only `InitForContext` with [`answer`].
pub fn answer_module() -> Arc<NativeModule> {
    Arc::new(NativeModule::from_entry_point("static:answer", EntryPoint::Simple(answer_entry)).unwrap())
}

/// A static module whose initializer always fails.
pub fn failing_module() -> Arc<NativeModule> {
    Arc::new(
        NativeModule::from_entry_point("static:failing", EntryPoint::Simple(failing_entry))
            .unwrap(),
    )
}

/// Loop-aware variant of [`answer_entry`].
pub unsafe extern "C" fn answer_with_loop_entry(
    isolate: *mut RawIsolate,
    context: *mut RawContext,
    exports: *mut RawExports,
    event_loop: *mut RawLoop,
) {
    unsafe { run_init(isolate, context, exports, event_loop, answer) }
}
