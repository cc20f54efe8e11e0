//! Cross-isolate references to heap objects.
//!
//! A referenced object stays alive while any [`Reference`] or
//! [`ReferenceTransferable`] to it exists. Dropping the last one frees it on
//! its isolate.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use super::environment::Environment;
use super::heap::ObjectId;
use super::holder::{IsolateHolder, IsolateId};
use super::three_phase_task::{PendingTask, ThreePhaseTask, run_async, run_sync};
use super::transferable::{Transferable, TransferableHandle};
use crate::error::{Error, Result};

/// Shared ownership of one heap object.
#[derive(Debug)]
struct ObjectLease {
    isolate: IsolateHolder,
    object: ObjectId,
}

impl Drop for ObjectLease {
    fn drop(&mut self) {
        let object = self.object;
        // A disposed isolate has already dropped its heap.
        let _ = self.isolate.schedule(Box::new(move |env: &Environment| {
            if env.heap_mut().remove_object(object) {
                trace!(isolate = %env.id(), object = %object, "Object freed");
            }
        }));
    }
}

/// Handle to an object living in some isolate's heap.
///
/// The handle itself belongs to the isolate it was materialized in and is
/// not `Send`; move it with [`TransferableHandle::transfer_out`].
pub struct Reference {
    lease: Arc<ObjectLease>,
    _local: PhantomData<Rc<()>>,
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("isolate", &self.lease.isolate.id())
            .field("object", &self.lease.object)
            .finish()
    }
}

impl Reference {
    /// Isolate owning the referenced object.
    pub fn isolate_id(&self) -> IsolateId {
        self.lease.isolate.id()
    }

    pub fn object_id(&self) -> ObjectId {
        self.lease.object
    }

    fn copy_task(&self) -> CopyTask {
        CopyTask {
            object: self.lease.object,
        }
    }

    /// Snapshot of the object, taken on its isolate.
    pub fn copy_sync(&self) -> Result<Value> {
        run_sync(&self.lease.isolate, self.copy_task())
    }

    /// Asynchronous [`copy_sync`](Self::copy_sync).
    pub fn copy(&self) -> PendingTask<CopyTask> {
        run_async(&self.lease.isolate, self.copy_task())
    }

    /// Read a single property.
    pub fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        let object = self.lease.object;
        let key = key.to_string();
        self.lease
            .isolate
            .execute_sync(move |env| {
                env.heap()
                    .object(object)
                    .map(|properties| properties.get(&key).cloned())
            })?
            .ok_or(Error::InvalidReference)
    }
}

impl TransferableHandle for Reference {
    type Transfer = ReferenceTransferable;

    fn transfer_out(&self) -> ReferenceTransferable {
        ReferenceTransferable {
            lease: Arc::clone(&self.lease),
        }
    }
}

/// Task behind [`Reference::copy`].
pub struct CopyTask {
    object: ObjectId,
}

impl ThreePhaseTask for CopyTask {
    type Transfer = Value;
    type Output = Value;

    fn phase2(self, env: &Environment) -> Result<Value> {
        env.heap()
            .object(self.object)
            .cloned()
            .map(Value::Object)
            .ok_or(Error::InvalidReference)
    }

    fn phase3(value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Transfer form of a [`Reference`].
#[derive(Debug, Clone)]
pub struct ReferenceTransferable {
    lease: Arc<ObjectLease>,
}

impl ReferenceTransferable {
    /// Start referencing `object`, which must live in `env`'s heap.
    pub(crate) fn new(env: &Environment, object: ObjectId) -> Result<Self> {
        if !env.heap_mut().lease(object) {
            return Err(Error::InvalidReference);
        }
        let lease = ObjectLease {
            isolate: env.holder().clone(),
            object,
        };
        Ok(Self {
            lease: Arc::new(lease),
        })
    }
}

impl Transferable for ReferenceTransferable {
    type Local = Reference;

    fn transfer_in(self) -> Result<Reference> {
        Ok(Reference {
            lease: self.lease,
            _local: PhantomData,
        })
    }
}
