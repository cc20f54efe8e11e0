//! Declarative macros for module development.

/// Export the entry points of a native module.
///
/// # Example
///
/// ```rust,ignore
/// use islet_extension_sdk::prelude::*;
///
/// fn init(module: &mut ModuleInit<'_>) -> InitResult<()> {
///     module.exports().set_number("value", 42.0)
/// }
///
/// declare_module!(simple: init);
/// ```
///
/// `with_loop: f` exports `InitForContextWithLoop` instead; both may be given,
/// in which case the host calls the loop-aware one.
#[macro_export]
macro_rules! declare_module {
    (simple: $init:path $(,)?) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn InitForContext(
            isolate: *mut $crate::types::RawIsolate,
            context: *mut $crate::types::RawContext,
            exports: *mut $crate::types::RawExports,
        ) {
            unsafe {
                $crate::module::run_init(isolate, context, exports, ::std::ptr::null_mut(), $init)
            }
        }
    };
    (with_loop: $init:path $(,)?) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn InitForContextWithLoop(
            isolate: *mut $crate::types::RawIsolate,
            context: *mut $crate::types::RawContext,
            exports: *mut $crate::types::RawExports,
            event_loop: *mut $crate::types::RawLoop,
        ) {
            unsafe { $crate::module::run_init(isolate, context, exports, event_loop, $init) }
        }
    };
    (simple: $simple:path, with_loop: $with_loop:path $(,)?) => {
        $crate::declare_module!(simple: $simple);
        $crate::declare_module!(with_loop: $with_loop);
    };
}
