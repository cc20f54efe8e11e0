//! Native modules.
//!
//! A [`NativeModule`] is loaded once in the default isolate and then shared by
//! handles in any isolate. [`NativeModuleHandle::create`] runs the module's
//! initializer inside a target context and hands back a [`Reference`] to the
//! resulting exports object.
//!
//! [`Reference`]: crate::isolate::Reference

mod exports;
pub mod handle;
pub mod native;

pub use handle::{CreateRunner, NativeModuleHandle, NativeModuleTransferable};
pub use native::{EntryPoint, EntryPointKind, ModuleId, NativeModule};
