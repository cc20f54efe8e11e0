//! Integration tests for the module-side wrappers, driven by a fake host.

use std::cell::RefCell;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use islet_extension_sdk::module::run_init;
use islet_extension_sdk::prelude::*;
use islet_extension_sdk::{
    LOOP_CANCELLED, LOOP_RUN, LoopCallback, RawContext, RawExports, RawIsolate, RawLoop,
};

#[derive(Default)]
struct Recorder {
    values: Vec<(String, String)>,
    error: Option<String>,
}

unsafe fn text(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe fn recorder<'a>(target: *mut c_void) -> &'a mut Recorder {
    unsafe { &mut *(target as *mut Recorder) }
}

unsafe extern "C" fn set_number(target: *mut c_void, key: *const c_char, value: f64) {
    unsafe { recorder(target).values.push((text(key), value.to_string())) };
}

unsafe extern "C" fn set_bool(target: *mut c_void, key: *const c_char, value: bool) {
    unsafe { recorder(target).values.push((text(key), value.to_string())) };
}

unsafe extern "C" fn set_string(target: *mut c_void, key: *const c_char, value: *const c_char) {
    unsafe { recorder(target).values.push((text(key), text(value))) };
}

unsafe extern "C" fn set_json(target: *mut c_void, key: *const c_char, json: *const c_char) -> i32 {
    let json = unsafe { text(json) };
    if serde_json::from_str::<serde_json::Value>(&json).is_err() {
        return 1;
    }
    unsafe { recorder(target).values.push((text(key), json)) };
    0
}

unsafe extern "C" fn throw_error(target: *mut c_void, message: *const c_char) {
    unsafe { recorder(target).error = Some(text(message)) };
}

fn raw_exports(recorder: &mut Recorder) -> RawExports {
    RawExports {
        target: recorder as *mut Recorder as *mut c_void,
        set_number,
        set_bool,
        set_string,
        set_json,
        throw_error,
    }
}

type Posted = RefCell<Vec<(LoopCallback, usize)>>;

unsafe extern "C" fn post(target: *const c_void, callback: LoopCallback, data: *mut c_void) -> i32 {
    let queue = unsafe { &*(target as *const Posted) };
    queue.borrow_mut().push((callback, data as usize));
    0
}

unsafe extern "C" fn post_closed(_: *const c_void, _: LoopCallback, _: *mut c_void) -> i32 {
    -1
}

unsafe extern "C" fn untracked(_: *const c_void) {}

unsafe extern "C" fn retain(target: *const c_void) {
    let count = unsafe { &*(target as *const AtomicUsize) };
    count.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn release(target: *const c_void) {
    let count = unsafe { &*(target as *const AtomicUsize) };
    count.fetch_sub(1, Ordering::SeqCst);
}

fn run(recorder: &mut Recorder, event_loop: *mut RawLoop, init: islet_extension_sdk::InitFn) {
    let mut isolate = RawIsolate { id: 7 };
    let mut context = RawContext { id: 3 };
    let mut exports = raw_exports(recorder);
    unsafe { run_init(&mut isolate, &mut context, &mut exports, event_loop, init) };
}

fn init_values(module: &mut ModuleInit<'_>) -> InitResult<()> {
    assert_eq!(module.isolate_id(), 7);
    assert_eq!(module.context_id(), 3);
    assert!(module.event_loop().is_none());
    module.exports().set_number("value", 42.0)?;
    module.exports().set_bool("ready", true)?;
    module.exports().set_string("name", "answer")?;
    module.exports().set_json("nested", &json!({"a": [1, 2]}))
}

#[test]
fn test_initializer_writes_exports() {
    let mut recorder = Recorder::default();
    run(&mut recorder, ptr::null_mut(), init_values);

    assert!(recorder.error.is_none());
    assert_eq!(recorder.values.len(), 4);
    assert_eq!(recorder.values[0], ("value".to_string(), "42".to_string()));
    assert_eq!(recorder.values[1], ("ready".to_string(), "true".to_string()));
    assert_eq!(recorder.values[2], ("name".to_string(), "answer".to_string()));
    assert_eq!(recorder.values[3].0, "nested");
}

fn init_bad_key(module: &mut ModuleInit<'_>) -> InitResult<()> {
    module.exports().set_number("bad\0key", 1.0)
}

#[test]
fn test_error_is_thrown_into_isolate() {
    let mut recorder = Recorder::default();
    run(&mut recorder, ptr::null_mut(), init_bad_key);

    assert!(recorder.values.is_empty());
    let error = recorder.error.expect("error should be thrown");
    assert!(error.contains("NUL"));
}

fn init_panics(_: &mut ModuleInit<'_>) -> InitResult<()> {
    panic!("boom");
}

#[test]
fn test_panic_is_thrown_into_isolate() {
    let mut recorder = Recorder::default();
    run(&mut recorder, ptr::null_mut(), init_panics);

    let error = recorder.error.expect("panic should be thrown");
    assert!(error.contains("panicked"));
    assert!(error.contains("boom"));
}

static POSTED_RAN: AtomicBool = AtomicBool::new(false);

fn init_posts(module: &mut ModuleInit<'_>) -> InitResult<()> {
    let event_loop = module.event_loop().ok_or_else(|| InitError::custom("no loop"))?;
    event_loop.post(|| POSTED_RAN.store(true, Ordering::SeqCst))
}

#[test]
fn test_loop_callback_runs_once_posted() {
    let queue: Posted = RefCell::new(Vec::new());
    let mut raw_loop = RawLoop {
        target: &queue as *const Posted as *const c_void,
        post,
        retain: untracked,
        release: untracked,
    };
    let mut recorder = Recorder::default();
    run(&mut recorder, &mut raw_loop, init_posts);

    assert!(recorder.error.is_none());
    assert!(!POSTED_RAN.load(Ordering::SeqCst));

    let posted: Vec<_> = queue.borrow_mut().drain(..).collect();
    assert_eq!(posted.len(), 1);
    for (callback, data) in posted {
        unsafe { callback(data as *mut c_void, LOOP_RUN) };
    }
    assert!(POSTED_RAN.load(Ordering::SeqCst));
}

#[test]
fn test_cancelled_callback_drops_closure() {
    let queue: Posted = RefCell::new(Vec::new());
    let raw_loop = RawLoop {
        target: &queue as *const Posted as *const c_void,
        post,
        retain: untracked,
        release: untracked,
    };
    let event_loop = unsafe { islet_extension_sdk::Loop::from_raw(&raw_loop) };

    let token = Arc::new(());
    let held = token.clone();
    let ran = Arc::new(AtomicBool::new(false));
    let ran_flag = ran.clone();
    event_loop
        .post(move || {
            let _held = held;
            ran_flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(Arc::strong_count(&token), 2);

    let (callback, data) = queue.borrow_mut().pop().unwrap();
    unsafe { callback(data as *mut c_void, LOOP_CANCELLED) };

    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(Arc::strong_count(&token), 1);
}

#[test]
fn test_closed_loop_rejects_and_reclaims() {
    let raw_loop = RawLoop {
        target: ptr::null(),
        post: post_closed,
        retain: untracked,
        release: untracked,
    };
    let event_loop = unsafe { islet_extension_sdk::Loop::from_raw(&raw_loop) };

    let token = Arc::new(());
    let held = token.clone();
    let result = event_loop.post(move || drop(held));

    assert!(matches!(result, Err(InitError::LoopClosed)));
    assert_eq!(Arc::strong_count(&token), 1);
}

#[test]
fn test_detached_loop_holds_target() {
    let retained = AtomicUsize::new(0);
    let raw_loop = RawLoop {
        target: &retained as *const AtomicUsize as *const c_void,
        post: post_closed,
        retain,
        release,
    };
    let event_loop = unsafe { islet_extension_sdk::Loop::from_raw(&raw_loop) };

    let detached = event_loop.detach();
    assert_eq!(retained.load(Ordering::SeqCst), 1);
    let copy = detached.clone();
    assert_eq!(retained.load(Ordering::SeqCst), 2);

    // The host refuses once its isolate is gone; the handle stays usable.
    assert!(matches!(detached.post(|| {}), Err(InitError::LoopClosed)));

    drop(detached);
    drop(copy);
    assert_eq!(retained.load(Ordering::SeqCst), 0);
}
