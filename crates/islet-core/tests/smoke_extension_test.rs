//! Loading the real smoke extension from disk.
//!
//! Build it first: `cargo build -p islet-smoke-extension`. Set
//! `ISLET_SMOKE_EXTENSION` to point at the library if it lives elsewhere.

use std::path::PathBuf;
use std::sync::Arc;

use islet_core::config::IsolateConfig;
use islet_core::prelude::*;
use serde_json::json;

fn smoke_extension_path() -> PathBuf {
    if let Ok(path) = std::env::var("ISLET_SMOKE_EXTENSION") {
        return PathBuf::from(path);
    }
    let file = format!(
        "{}islet_smoke_extension{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../target/debug")
        .join(file)
}

#[test]
#[ignore = "requires the islet-smoke-extension cdylib to be built"]
fn test_load_and_initialize_smoke_extension() {
    let path = smoke_extension_path();
    if !path.exists() {
        eprintln!("Skipping: {} not found", path.display());
        return;
    }

    let handle = NativeModuleHandle::new(&path).unwrap();
    assert!(handle.module().is_dynamic());
    assert_eq!(handle.module().path(), path.as_path());
    assert_eq!(handle.module().entry_point().kind(), EntryPointKind::Both);

    let module = Arc::clone(handle.module());
    let isolate = Isolate::new(IsolateConfig::default()).unwrap();
    let exports = handle
        .create_sync(&isolate.create_context().unwrap())
        .unwrap();

    assert_eq!(exports.get_sync("value").unwrap(), Some(json!(42)));
    assert_eq!(exports.get_sync("loop").unwrap(), Some(json!(true)));

    drop(handle);
    drop(isolate);
    assert_eq!(Arc::strong_count(&module), 1);
}
