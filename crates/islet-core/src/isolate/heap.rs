//! Isolate-local object storage.
//!
//! The heap is owned by an [`Environment`](super::Environment) and only ever
//! touched from that isolate's thread.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

/// Identifier of a context inside one isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Identifier of an object inside one isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

struct HeapObject {
    context: ContextId,
    properties: Map<String, Value>,
    /// Reachable through a [`Reference`](super::Reference); freed when the
    /// last one goes away instead of with its context.
    leased: bool,
}

/// Contexts and plain objects of a single isolate.
#[derive(Default)]
pub struct Heap {
    next_id: u64,
    contexts: HashMap<ContextId, u64>,
    objects: HashMap<ObjectId, HeapObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn create_context(&mut self) -> ContextId {
        let id = ContextId(self.next());
        self.contexts.insert(id, 0);
        id
    }

    pub fn has_context(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    /// Forget a context and free its objects that no reference points to.
    pub fn release_context(&mut self, id: ContextId) -> bool {
        if self.contexts.remove(&id).is_none() {
            return false;
        }
        self.objects
            .retain(|_, object| object.context != id || object.leased);
        true
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Allocate an object in `context` with the given properties.
    ///
    /// Returns `None` if the context does not exist.
    pub fn insert_object(
        &mut self,
        context: ContextId,
        properties: Map<String, Value>,
    ) -> Option<ObjectId> {
        let objects_in_context = self.contexts.get_mut(&context)?;
        *objects_in_context += 1;
        let id = ObjectId(self.next());
        self.objects.insert(
            id,
            HeapObject {
                context,
                properties,
                leased: false,
            },
        );
        Some(id)
    }

    /// Mark an object as owned by references from now on.
    pub(crate) fn lease(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.leased = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_object(&mut self, id: ObjectId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn object(&self, id: ObjectId) -> Option<&Map<String, Value>> {
        self.objects.get(&id).map(|object| &object.properties)
    }

    pub fn object_context(&self, id: ObjectId) -> Option<ContextId> {
        self.objects.get(&id).map(|object| object.context)
    }

    /// Number of objects ever allocated in a live context.
    pub fn objects_in_context(&self, context: ContextId) -> Option<u64> {
        self.contexts.get(&context).copied()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}
