//! Per-isolate environment.
//!
//! An [`Environment`] lives on its isolate's thread for the whole lifetime of
//! the isolate. Code running on that thread reaches it through [`current`];
//! every other thread is the default (host) isolate.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::heap::{ContextId, Heap, ObjectId};
use super::holder::{IsolateHolder, IsolateId};
use super::scheduler::Scheduler;
use crate::error::{Error, Result};
use crate::module::{ModuleId, NativeModule};

thread_local! {
    static CURRENT: RefCell<Option<Rc<Environment>>> = const { RefCell::new(None) };
}

/// Environment of the isolate running on the current thread, if any.
pub fn current() -> Option<Rc<Environment>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Id of the isolate running on the current thread.
///
/// `None` means the current thread belongs to the default isolate.
pub fn current_isolate_id() -> Option<IsolateId> {
    CURRENT.with(|current| current.borrow().as_ref().map(|env| env.id()))
}

/// Whether the current thread is the privileged default isolate.
pub fn is_default() -> bool {
    current_isolate_id().is_none()
}

pub(crate) fn enter(env: Rc<Environment>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(env));
}

pub(crate) fn exit() -> Option<Rc<Environment>> {
    CURRENT.with(|current| current.borrow_mut().take())
}

/// State owned by one isolate.
pub struct Environment {
    id: IsolateId,
    holder: IsolateHolder,
    heap: RefCell<Heap>,
    scheduler: Scheduler,
    current_context: Cell<Option<ContextId>>,
    /// Modules initialized in this isolate. Insert-only, dropped with the
    /// environment so library code is never unloaded under a live context.
    native_modules: RefCell<HashMap<ModuleId, Arc<NativeModule>>>,
}

impl Environment {
    pub(crate) fn new(holder: IsolateHolder) -> Self {
        Self {
            id: holder.id(),
            scheduler: Scheduler::new(holder.clone()),
            holder,
            heap: RefCell::new(Heap::new()),
            current_context: Cell::new(None),
            native_modules: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// Handle to this isolate, usable from any thread.
    pub fn holder(&self) -> &IsolateHolder {
        &self.holder
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn heap(&self) -> Ref<'_, Heap> {
        self.heap.borrow()
    }

    pub(crate) fn heap_mut(&self) -> RefMut<'_, Heap> {
        self.heap.borrow_mut()
    }

    /// Make `context` the current context until the scope is dropped.
    pub fn enter_context(&self, context: ContextId) -> ContextScope<'_> {
        let previous = self.current_context.replace(Some(context));
        ContextScope {
            env: self,
            previous,
        }
    }

    pub fn current_context(&self) -> Option<ContextId> {
        self.current_context.get()
    }

    /// Allocate an object in the current context.
    pub fn new_object(&self, properties: Map<String, Value>) -> Result<ObjectId> {
        let context = self.current_context().ok_or(Error::InvalidContext)?;
        self.heap_mut()
            .insert_object(context, properties)
            .ok_or(Error::InvalidContext)
    }

    pub fn native_module_count(&self) -> usize {
        self.native_modules.borrow().len()
    }

    pub fn has_native_module(&self, id: ModuleId) -> bool {
        self.native_modules.borrow().contains_key(&id)
    }

    /// Keep `module` alive for the rest of this isolate's life.
    ///
    /// Returns `false` if it was already registered.
    pub(crate) fn register_native_module(&self, module: &Arc<NativeModule>) -> bool {
        let mut modules = self.native_modules.borrow_mut();
        if modules.contains_key(&module.id()) {
            return false;
        }
        modules.insert(module.id(), Arc::clone(module));
        true
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let modules = self.native_modules.get_mut();
        if !modules.is_empty() {
            debug!(isolate = %self.id, count = modules.len(), "Releasing native modules");
        }
    }
}

/// Guard returned by [`Environment::enter_context`].
pub struct ContextScope<'a> {
    env: &'a Environment,
    previous: Option<ContextId>,
}

impl ContextScope<'_> {
    pub fn context(&self) -> Option<ContextId> {
        self.env.current_context()
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.env.current_context.set(self.previous);
    }
}
