//! Runs the smoke module's entry points through a real islet host.

use std::sync::Arc;

use islet_core::config::IsolateConfig;
use islet_core::{EntryPoint, EntryPointKind, Isolate, NativeModule, NativeModuleHandle};
use islet_smoke_extension::{InitForContext, InitForContextWithLoop, MODULE_NAME, loop_callbacks};
use serde_json::json;

fn module(entry: EntryPoint) -> NativeModuleHandle {
    let module = NativeModule::from_entry_point("static:islet-smoke", entry).unwrap();
    NativeModuleHandle::from_module(Arc::new(module))
}

#[test]
fn test_simple_entry_point() {
    let isolate = Isolate::new(IsolateConfig::default()).unwrap();
    let context = isolate.create_context().unwrap();
    let handle = module(EntryPoint::Simple(InitForContext));

    let exports = handle.create_sync(&context).unwrap().copy_sync().unwrap();

    assert_eq!(exports["value"], json!(42));
    assert_eq!(exports["name"], json!(MODULE_NAME));
    assert_eq!(exports["loop"], json!(false));
    assert_eq!(exports["origin"]["isolate"], json!(isolate.id().as_u64()));
    assert_eq!(exports["origin"]["context"], json!(context.id().as_u64()));
}

#[test]
fn test_both_entry_points_prefer_loop() {
    let handle = module(EntryPoint::Both {
        simple: InitForContext,
        with_loop: InitForContextWithLoop,
    });
    assert_eq!(handle.module().entry_point().kind(), EntryPointKind::Both);

    let isolate = Isolate::new(IsolateConfig::default()).unwrap();
    let before = loop_callbacks();
    let exports = handle
        .create_sync(&isolate.create_context().unwrap())
        .unwrap();

    assert_eq!(exports.get_sync("loop").unwrap(), Some(json!(true)));
    // get_sync queued behind the posted callback.
    assert!(loop_callbacks() > before);
}
