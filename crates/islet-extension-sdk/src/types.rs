//! C ABI shared by the host and native modules.
//!
//! Every type here is `#[repr(C)]` and only carries plain data or function
//! pointers, so a module built with a different compiler (or in another
//! language) can implement the contract.

use std::ffi::{c_char, c_void};

/// Symbol of the plain entry point.
pub const INIT_FOR_CONTEXT_SYMBOL: &[u8] = b"InitForContext\0";

/// Symbol of the loop-aware entry point. Preferred when both are exported.
pub const INIT_FOR_CONTEXT_WITH_LOOP_SYMBOL: &[u8] = b"InitForContextWithLoop\0";

/// Status passed to a loop callback that is being run.
pub const LOOP_RUN: i32 = 0;

/// Status passed to a loop callback whose isolate was disposed before it ran.
pub const LOOP_CANCELLED: i32 = 1;

/// Isolate being initialized.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawIsolate {
    pub id: u64,
}

/// Context being initialized.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContext {
    pub id: u64,
}

/// Host view of a freshly created exports object.
///
/// All keys and string values are NUL-terminated UTF-8. The callbacks must
/// only be called while the entry point that received this struct is running.
#[repr(C)]
pub struct RawExports {
    /// Host-owned object the callbacks write into.
    pub target: *mut c_void,
    pub set_number: unsafe extern "C" fn(target: *mut c_void, key: *const c_char, value: f64),
    pub set_bool: unsafe extern "C" fn(target: *mut c_void, key: *const c_char, value: bool),
    pub set_string:
        unsafe extern "C" fn(target: *mut c_void, key: *const c_char, value: *const c_char),
    /// Returns 0 when `json` parsed, non-zero otherwise.
    pub set_json:
        unsafe extern "C" fn(target: *mut c_void, key: *const c_char, json: *const c_char) -> i32,
    /// Raise an error in the isolate. Initialization fails once the entry
    /// point returns.
    pub throw_error: unsafe extern "C" fn(target: *mut c_void, message: *const c_char),
}

/// Callback scheduled through [`RawLoop::post`].
///
/// Called exactly once, with [`LOOP_RUN`] or [`LOOP_CANCELLED`].
pub type LoopCallback = unsafe extern "C" fn(data: *mut c_void, status: i32);

/// Scheduler loop of the isolate a module is initialized in.
///
/// The pointer handed to the entry point is only valid during that call. To
/// post later, copy the struct and hold a reference on `target` through
/// `retain`, given back with `release`. A retained target stays valid after
/// its isolate is disposed; `post` then fails.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawLoop {
    pub target: *const c_void,
    /// Returns 0 when the callback was queued, non-zero when the isolate is
    /// gone (the callback is then never called).
    pub post:
        unsafe extern "C" fn(target: *const c_void, callback: LoopCallback, data: *mut c_void) -> i32,
    pub retain: unsafe extern "C" fn(target: *const c_void),
    pub release: unsafe extern "C" fn(target: *const c_void),
}

/// `InitForContext(isolate, context, exports)`.
pub type InitForContextFn =
    unsafe extern "C" fn(isolate: *mut RawIsolate, context: *mut RawContext, exports: *mut RawExports);

/// `InitForContextWithLoop(isolate, context, exports, loop)`.
pub type InitForContextWithLoopFn = unsafe extern "C" fn(
    isolate: *mut RawIsolate,
    context: *mut RawContext,
    exports: *mut RawExports,
    event_loop: *mut RawLoop,
);
