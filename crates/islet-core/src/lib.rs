//! Core runtime for islet.
//!
//! Isolates are independent execution domains, one thread each. This crate
//! provides the isolate runtime and the native module layer on top of it:
//! loading a shared library once in the default isolate, moving handles to it
//! between isolates, and initializing it into contexts of any isolate.

pub mod config;
pub mod error;
pub mod isolate;
pub mod module;

pub use error::{Error, Result};
pub use isolate::{
    ContextHandle, Environment, Isolate, IsolateHolder, IsolateId, PendingTask, Reference,
    ThreePhaseTask, Transferable, TransferableHandle,
};
pub use module::{
    EntryPoint, EntryPointKind, ModuleId, NativeModule, NativeModuleHandle,
    NativeModuleTransferable,
};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{IsolateConfig, defaults, env_vars};

    // Error handling
    pub use crate::error::{Error, Result};

    // Isolates
    pub use crate::isolate::{
        ContextHandle, Isolate, IsolateHolder, IsolateId, Reference, Transferable,
        TransferableHandle,
    };

    // Native modules
    pub use crate::module::{EntryPoint, EntryPointKind, NativeModule, NativeModuleHandle};
}
