//! Isolate runtime.
//!
//! An isolate is a dedicated thread with its own heap and FIFO work queue.
//! Everything in here exists so that the native module layer has somewhere to
//! run: contexts to initialize into, a loop to hand to loop-aware modules, a
//! registry to keep modules alive, and the three-phase task machinery used to
//! cross from one isolate to another.

pub mod context;
pub mod environment;
pub mod heap;
pub mod holder;
pub mod reference;
pub mod scheduler;
pub mod three_phase_task;
pub mod transferable;

use std::any::Any;

pub use context::{ContextHandle, RemoteContext};
pub use environment::{ContextScope, Environment, current, current_isolate_id, is_default};
pub use heap::{ContextId, Heap, ObjectId};
pub use holder::{Isolate, IsolateHolder, IsolateId};
pub use reference::{CopyTask, Reference, ReferenceTransferable};
pub use scheduler::Scheduler;
pub use three_phase_task::{ClosureTask, PendingTask, ThreePhaseTask, run_async, run_sync};
pub use transferable::{Transferable, TransferableHandle};

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
