//! Scheduler loop exposed to loop-aware native modules.

use std::ffi::c_void;

use islet_extension_sdk::{LOOP_CANCELLED, LOOP_RUN, LoopCallback, RawLoop};
use tracing::trace;

use super::environment::Environment;
use super::holder::IsolateHolder;

/// Per-isolate scheduler.
///
/// Work posted here runs on the isolate thread in queue order. The loop
/// target is the isolate's shared state, which modules may retain past the
/// environment's lifetime.
pub struct Scheduler {
    _holder: IsolateHolder,
    raw_loop: Box<RawLoop>,
}

impl Scheduler {
    pub(crate) fn new(holder: IsolateHolder) -> Self {
        let raw_loop = Box::new(RawLoop {
            target: holder.as_raw(),
            post: post_to_isolate,
            retain: retain_isolate,
            release: release_isolate,
        });
        Self {
            _holder: holder,
            raw_loop,
        }
    }

    /// Loop pointer passed to `InitForContextWithLoop`.
    ///
    /// The struct is valid until the isolate's environment is torn down;
    /// copies with a retained target stay valid longer.
    pub fn raw_loop(&self) -> *mut RawLoop {
        &*self.raw_loop as *const RawLoop as *mut RawLoop
    }
}

/// A module callback waiting in the isolate queue.
struct PostedCallback {
    callback: LoopCallback,
    data: *mut c_void,
    fired: bool,
}

// SAFETY: `data` is owned by the module and only handed back to its callback.
unsafe impl Send for PostedCallback {}

impl PostedCallback {
    fn fire(mut self, status: i32) {
        self.fired = true;
        unsafe { (self.callback)(self.data, status) };
    }
}

impl Drop for PostedCallback {
    fn drop(&mut self) {
        if !self.fired {
            self.fired = true;
            unsafe { (self.callback)(self.data, LOOP_CANCELLED) };
        }
    }
}

unsafe extern "C" fn post_to_isolate(
    target: *const c_void,
    callback: LoopCallback,
    data: *mut c_void,
) -> i32 {
    // SAFETY: `target` is held either by the scheduler or by a retain.
    unsafe {
        IsolateHolder::with_raw(target, |holder| {
            if holder.is_disposed() {
                return -1;
            }

            let posted = PostedCallback {
                callback,
                data,
                fired: false,
            };
            // If the isolate goes away in between, dropping the task cancels
            // the callback, which still counts as its single invocation.
            let _ = holder.schedule(Box::new(move |env: &Environment| {
                trace!(isolate = %env.id(), "Running module loop callback");
                posted.fire(LOOP_RUN);
            }));
            0
        })
    }
}

unsafe extern "C" fn retain_isolate(target: *const c_void) {
    unsafe { IsolateHolder::retain_raw(target) };
}

unsafe extern "C" fn release_isolate(target: *const c_void) {
    unsafe { IsolateHolder::release_raw(target) };
}
