//! islet Extension SDK
//!
//! The contract between an islet host and a dynamically loaded native module.
//!
//! A module exports `InitForContext` and/or `InitForContextWithLoop`. The host
//! calls one of them on the isolate's own thread each time the module is
//! initialized into a context, handing over a fresh exports object.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use islet_extension_sdk::prelude::*;
//!
//! fn init(module: &mut ModuleInit<'_>) -> InitResult<()> {
//!     module.exports().set_number("value", 42.0)?;
//!     module.exports().set_string("name", "answer")
//! }
//!
//! declare_module!(simple: init);
//! ```

pub mod error;
#[macro_use]
pub mod macros;
pub mod module;
pub mod types;

pub use error::{InitError, InitResult};
pub use module::{DetachedLoop, Exports, InitFn, Loop, ModuleInit};
pub use types::{
    INIT_FOR_CONTEXT_SYMBOL, INIT_FOR_CONTEXT_WITH_LOOP_SYMBOL, InitForContextFn,
    InitForContextWithLoopFn, LOOP_CANCELLED, LOOP_RUN, LoopCallback, RawContext, RawExports,
    RawIsolate, RawLoop,
};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::declare_module;
    pub use crate::error::{InitError, InitResult};
    pub use crate::module::{DetachedLoop, Exports, Loop, ModuleInit};
    pub use serde_json::{Value, json};
}
