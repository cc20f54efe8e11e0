//! Context handles and their remote form.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::environment::Environment;
use super::heap::ContextId;
use super::holder::{IsolateHolder, IsolateId};
use crate::error::{Error, Result};

/// Handle to a context living in some isolate.
///
/// Cheap to clone and safe to send anywhere; the context itself is only
/// touched on its isolate's thread.
#[derive(Clone)]
pub struct ContextHandle {
    isolate: IsolateHolder,
    id: ContextId,
    released: Arc<AtomicBool>,
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("isolate", &self.isolate.id())
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

impl ContextHandle {
    pub(crate) fn new(isolate: IsolateHolder, id: ContextId) -> Self {
        Self {
            isolate,
            id,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn isolate_id(&self) -> IsolateId {
        self.isolate.id()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Resolve the handle into a remote context and the isolate owning it.
    ///
    /// Only inspects handle-local state; the target isolate is not touched.
    pub fn get_context(&self) -> Result<(RemoteContext, IsolateHolder)> {
        if self.is_released() || self.isolate.is_disposed() {
            return Err(Error::InvalidContext);
        }
        let remote = RemoteContext {
            isolate: self.isolate.id(),
            id: self.id,
        };
        Ok((remote, self.isolate.clone()))
    }

    /// Release the context. Every clone of this handle becomes invalid.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let id = self.id;
        // A disposed isolate has no contexts left to release.
        let _ = self.isolate.schedule(Box::new(move |env: &Environment| {
            if env.heap_mut().release_context(id) {
                debug!(isolate = %env.id(), context = %id, "Context released");
            }
        }));
    }
}

/// Isolate-independent reference to a context.
///
/// Only dereferenceable on the owning isolate's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteContext {
    isolate: IsolateId,
    id: ContextId,
}

impl RemoteContext {
    pub fn isolate_id(&self) -> IsolateId {
        self.isolate
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Resolve to the live context inside `env`.
    pub fn deref_in(&self, env: &Environment) -> Result<ContextId> {
        if env.id() != self.isolate || !env.heap().has_context(self.id) {
            return Err(Error::InvalidContext);
        }
        Ok(self.id)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::IsolateConfig;
    use crate::error::Error;
    use crate::isolate::Isolate;

    #[test]
    fn test_get_context_resolves_owner() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let context = isolate.create_context().unwrap();

        let (remote, holder) = context.get_context().unwrap();
        assert_eq!(remote.isolate_id(), isolate.id());
        assert_eq!(holder.id(), isolate.id());
        assert_eq!(remote.id(), context.id());

        let live = isolate
            .holder()
            .execute_sync(move |env| remote.deref_in(env).is_ok())
            .unwrap();
        assert!(live);
    }

    #[test]
    fn test_released_context_is_invalid() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let context = isolate.create_context().unwrap();
        let (remote, _) = context.get_context().unwrap();

        let clone = context.clone();
        context.release();
        assert!(clone.is_released());
        assert!(matches!(clone.get_context(), Err(Error::InvalidContext)));

        // The release runs before this task.
        let result = isolate
            .holder()
            .execute_sync(move |env| remote.deref_in(env).map(|_| ()))
            .unwrap();
        assert!(matches!(result, Err(Error::InvalidContext)));
    }

    #[test]
    fn test_context_of_disposed_isolate_is_invalid() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let context = isolate.create_context().unwrap();
        isolate.dispose();
        assert!(matches!(context.get_context(), Err(Error::InvalidContext)));
    }

    #[test]
    fn test_remote_context_rejects_foreign_isolate() {
        let first = Isolate::new(IsolateConfig::default()).unwrap();
        let second = Isolate::new(IsolateConfig::default()).unwrap();
        let context = first.create_context().unwrap();
        let (remote, _) = context.get_context().unwrap();

        let result = second
            .holder()
            .execute_sync(move |env| remote.deref_in(env).map(|_| ()))
            .unwrap();
        assert!(matches!(result, Err(Error::InvalidContext)));
    }
}
