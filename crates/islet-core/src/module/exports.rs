//! Host side of the exports object handed to module initializers.

use std::ffi::{CStr, c_char, c_void};

use islet_extension_sdk::RawExports;
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::error::{Error, Result};

/// Collects the properties a module sets during one initializer call.
#[derive(Debug, Default)]
pub(crate) struct ExportsBuilder {
    properties: Map<String, Value>,
    exception: Option<String>,
}

impl ExportsBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// ABI view of this builder. Must not outlive `self`.
    pub(crate) fn as_raw(&mut self) -> RawExports {
        RawExports {
            target: self as *mut Self as *mut c_void,
            set_number,
            set_bool,
            set_string,
            set_json,
            throw_error,
        }
    }

    /// The finished exports object, or the error the module threw.
    pub(crate) fn finish(self) -> Result<Map<String, Value>> {
        match self.exception {
            Some(message) => Err(Error::Initialization(message)),
            None => Ok(self.properties),
        }
    }

    fn set(&mut self, key: String, value: Value) {
        self.properties.insert(key, value);
    }
}

/// Integral numbers are stored as integers so they compare equal to `json!(42)`.
pub(crate) fn number_value(value: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

unsafe fn builder<'a>(target: *mut c_void) -> Option<&'a mut ExportsBuilder> {
    unsafe { (target as *mut ExportsBuilder).as_mut() }
}

unsafe fn string<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

unsafe extern "C" fn set_number(target: *mut c_void, key: *const c_char, value: f64) {
    if let (Some(builder), Some(key)) = unsafe { (builder(target), string(key)) } {
        builder.set(key.to_string(), number_value(value));
    }
}

unsafe extern "C" fn set_bool(target: *mut c_void, key: *const c_char, value: bool) {
    if let (Some(builder), Some(key)) = unsafe { (builder(target), string(key)) } {
        builder.set(key.to_string(), Value::Bool(value));
    }
}

unsafe extern "C" fn set_string(target: *mut c_void, key: *const c_char, value: *const c_char) {
    if let (Some(builder), Some(key), Some(value)) =
        unsafe { (builder(target), string(key), string(value)) }
    {
        builder.set(key.to_string(), Value::String(value.to_string()));
    }
}

unsafe extern "C" fn set_json(target: *mut c_void, key: *const c_char, json: *const c_char) -> i32 {
    let (Some(builder), Some(key), Some(json)) =
        (unsafe { builder(target) }, unsafe { string(key) }, unsafe { string(json) })
    else {
        return -1;
    };
    match serde_json::from_str::<Value>(json) {
        Ok(value) => {
            builder.set(key.to_string(), value);
            0
        }
        Err(e) => {
            warn!(key, error = %e, "Module exported malformed JSON");
            -1
        }
    }
}

unsafe extern "C" fn throw_error(target: *mut c_void, message: *const c_char) {
    let Some(builder) = (unsafe { builder(target) }) else {
        return;
    };
    let message = unsafe { string(message) }.unwrap_or("unknown error");
    // The first error wins, like an exception that is never caught.
    if builder.exception.is_none() {
        builder.exception = Some(message.to_string());
    }
}
