//! Safe wrappers over the raw ABI for module authors.

use std::ffi::{CString, c_void};
use std::panic::{self, AssertUnwindSafe};

use crate::error::{InitError, InitResult};
use crate::types::{LOOP_RUN, RawContext, RawExports, RawIsolate, RawLoop};

/// The exports object handed to an initializer.
pub struct Exports<'a> {
    raw: &'a mut RawExports,
}

impl<'a> Exports<'a> {
    /// Wrap a raw exports table.
    ///
    /// # Safety
    /// `raw` must be the table passed to the currently running entry point.
    pub unsafe fn from_raw(raw: &'a mut RawExports) -> Self {
        Self { raw }
    }

    /// Set a numeric property.
    pub fn set_number(&mut self, key: &str, value: f64) -> InitResult<()> {
        let key = c_string(key)?;
        // SAFETY: the host keeps `target` valid while the entry point runs.
        unsafe { (self.raw.set_number)(self.raw.target, key.as_ptr(), value) };
        Ok(())
    }

    /// Set a boolean property.
    pub fn set_bool(&mut self, key: &str, value: bool) -> InitResult<()> {
        let key = c_string(key)?;
        unsafe { (self.raw.set_bool)(self.raw.target, key.as_ptr(), value) };
        Ok(())
    }

    /// Set a string property.
    pub fn set_string(&mut self, key: &str, value: &str) -> InitResult<()> {
        let c_key = c_string(key)?;
        let c_value = CString::new(value).map_err(|_| InitError::InvalidString(key.to_string()))?;
        unsafe { (self.raw.set_string)(self.raw.target, c_key.as_ptr(), c_value.as_ptr()) };
        Ok(())
    }

    /// Set a property to an arbitrary JSON value (objects, arrays, null).
    pub fn set_json(&mut self, key: &str, value: &serde_json::Value) -> InitResult<()> {
        let c_key = c_string(key)?;
        let json = CString::new(serde_json::to_string(value)?)
            .map_err(|_| InitError::InvalidString(key.to_string()))?;
        let status = unsafe { (self.raw.set_json)(self.raw.target, c_key.as_ptr(), json.as_ptr()) };
        if status != 0 {
            return Err(InitError::InvalidJson(key.to_string()));
        }
        Ok(())
    }

    /// Throw an error into the isolate.
    ///
    /// The host fails the initialization once the entry point returns.
    pub fn throw_error(&mut self, message: &str) {
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        unsafe { (self.raw.throw_error)(self.raw.target, message.as_ptr()) };
    }
}

type PostedFn = Box<dyn FnOnce() + Send>;

/// Scheduler loop of the isolate being initialized.
pub struct Loop<'a> {
    raw: &'a RawLoop,
}

impl<'a> Loop<'a> {
    /// Wrap a raw loop.
    ///
    /// # Safety
    /// `raw` must be the loop passed to the currently running entry point.
    pub unsafe fn from_raw(raw: &'a RawLoop) -> Self {
        Self { raw }
    }

    /// Run `f` later on the isolate's own thread.
    ///
    /// Callbacks run in the isolate's queue order. If the isolate is disposed
    /// before the callback runs, `f` is dropped without being called.
    pub fn post<F>(&self, f: F) -> InitResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        post_raw(self.raw, Box::new(f))
    }

    /// Detach from the initializer's lifetime so callbacks can be posted
    /// later, from any thread.
    ///
    /// The handle keeps the host's loop target alive. Once the isolate is
    /// disposed, posting fails with [`InitError::LoopClosed`].
    pub fn detach(&self) -> DetachedLoop {
        // SAFETY: `raw` is the live loop of the running entry point.
        unsafe { (self.raw.retain)(self.raw.target) };
        DetachedLoop { raw: *self.raw }
    }
}

/// A [`Loop`] that outlives the initializer call.
pub struct DetachedLoop {
    raw: RawLoop,
}

// SAFETY: the host's loop callbacks are callable from any thread.
unsafe impl Send for DetachedLoop {}
unsafe impl Sync for DetachedLoop {}

impl DetachedLoop {
    /// Same as [`Loop::post`].
    pub fn post<F>(&self, f: F) -> InitResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        post_raw(&self.raw, Box::new(f))
    }
}

impl Clone for DetachedLoop {
    fn clone(&self) -> Self {
        // SAFETY: `target` is retained by `self`.
        unsafe { (self.raw.retain)(self.raw.target) };
        Self { raw: self.raw }
    }
}

impl Drop for DetachedLoop {
    fn drop(&mut self) {
        unsafe { (self.raw.release)(self.raw.target) };
    }
}

fn post_raw(raw: &RawLoop, f: PostedFn) -> InitResult<()> {
    let data = Box::into_raw(Box::new(f)) as *mut c_void;
    let status = unsafe { (raw.post)(raw.target, run_posted, data) };
    if status != 0 {
        // Not retained by the host, reclaim it here.
        drop(unsafe { Box::from_raw(data as *mut PostedFn) });
        return Err(InitError::LoopClosed);
    }
    Ok(())
}

unsafe extern "C" fn run_posted(data: *mut c_void, status: i32) {
    let f = unsafe { Box::from_raw(data as *mut PostedFn) };
    if status == LOOP_RUN {
        let _ = panic::catch_unwind(AssertUnwindSafe(move || f()));
    }
}

/// Everything an initializer gets to see.
pub struct ModuleInit<'a> {
    isolate: RawIsolate,
    context: RawContext,
    exports: Exports<'a>,
    event_loop: Option<Loop<'a>>,
}

impl<'a> ModuleInit<'a> {
    /// Id of the isolate being initialized.
    pub fn isolate_id(&self) -> u64 {
        self.isolate.id
    }

    /// Id of the context being initialized.
    pub fn context_id(&self) -> u64 {
        self.context.id
    }

    /// The exports object.
    pub fn exports(&mut self) -> &mut Exports<'a> {
        &mut self.exports
    }

    /// The isolate's loop; only present for `InitForContextWithLoop`.
    pub fn event_loop(&self) -> Option<&Loop<'a>> {
        self.event_loop.as_ref()
    }
}

/// Initializer signature accepted by [`declare_module!`](crate::declare_module).
pub type InitFn = fn(&mut ModuleInit<'_>) -> InitResult<()>;

/// Glue used by the entry points generated by `declare_module!`.
///
/// Errors and panics from `init` are thrown into the isolate instead of
/// unwinding across the FFI boundary.
///
/// # Safety
/// The pointers must be the ones the host passed to the entry point.
#[doc(hidden)]
pub unsafe fn run_init(
    isolate: *mut RawIsolate,
    context: *mut RawContext,
    exports: *mut RawExports,
    event_loop: *mut RawLoop,
    init: InitFn,
) {
    let Some(raw_exports) = (unsafe { exports.as_mut() }) else {
        return;
    };
    let isolate = unsafe { isolate.as_ref() }.copied().unwrap_or(RawIsolate { id: 0 });
    let context = unsafe { context.as_ref() }.copied().unwrap_or(RawContext { id: 0 });
    let event_loop = unsafe { event_loop.as_ref() }.map(|raw| unsafe { Loop::from_raw(raw) });

    let mut module_init = ModuleInit {
        isolate,
        context,
        exports: unsafe { Exports::from_raw(raw_exports) },
        event_loop,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| init(&mut module_init)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => module_init.exports.throw_error(&e.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            module_init
                .exports
                .throw_error(&format!("Module initializer panicked: {}", message));
        }
    }
}

fn c_string(key: &str) -> InitResult<CString> {
    CString::new(key).map_err(|_| InitError::InvalidString(key.to_string()))
}
