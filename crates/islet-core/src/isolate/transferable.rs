//! Moving handles between isolates.

use crate::error::Result;

/// Isolate-independent form of a handle.
///
/// Produced on the source isolate, sent across threads, and turned back into a
/// handle on whichever isolate calls [`transfer_in`](Self::transfer_in).
pub trait Transferable: Send + 'static {
    type Local;

    /// Materialize a handle in the isolate running on the current thread.
    fn transfer_in(self) -> Result<Self::Local>;
}

/// A handle that can be captured for transfer.
pub trait TransferableHandle: Sized {
    type Transfer: Transferable<Local = Self>;

    /// Capture this handle. Leaves the handle untouched.
    fn transfer_out(&self) -> Self::Transfer;
}
