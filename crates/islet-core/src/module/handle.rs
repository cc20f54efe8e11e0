//! Isolate-local handles to native modules and the task that initializes them.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use islet_extension_sdk::{RawContext, RawIsolate};
use tracing::{debug, info};

use super::exports::ExportsBuilder;
use super::native::NativeModule;
use crate::error::Result;
use crate::isolate::environment::{self, Environment};
use crate::isolate::{
    ContextHandle, IsolateHolder, IsolateId, PendingTask, Reference, ReferenceTransferable,
    RemoteContext, ThreePhaseTask, Transferable, TransferableHandle, run_async, run_sync,
};

/// Handle to a [`NativeModule`], owned by one isolate.
///
/// Any number of handles, in any number of isolates, may share one module.
/// Handles are not `Send`; move them with
/// [`transfer_out`](TransferableHandle::transfer_out).
pub struct NativeModuleHandle {
    module: Arc<NativeModule>,
    owner: Option<IsolateId>,
    _local: PhantomData<Rc<()>>,
}

impl fmt::Debug for NativeModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModuleHandle")
            .field("module", &self.module.id())
            .field("owner", &self.owner)
            .finish()
    }
}

impl NativeModuleHandle {
    /// Load the module at `path`. Only allowed from the default isolate.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let module = NativeModule::load(path)?;
        Ok(Self::from_module(Arc::new(module)))
    }

    /// Wrap an already loaded module in a handle for the current isolate.
    pub fn from_module(module: Arc<NativeModule>) -> Self {
        Self {
            module,
            owner: environment::current_isolate_id(),
            _local: PhantomData,
        }
    }

    pub fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }

    /// Isolate this handle lives in; `None` for the default isolate.
    pub fn owner_isolate(&self) -> Option<IsolateId> {
        self.owner
    }

    /// Initialize the module into `context` without blocking.
    ///
    /// A stale context rejects the returned future.
    pub fn create(&self, context: &ContextHandle) -> PendingTask<CreateRunner> {
        match CreateRunner::new(context, &self.module) {
            Ok((runner, isolate)) => run_async(&isolate, runner),
            Err(e) => PendingTask::rejected(e),
        }
    }

    /// Initialize the module into `context`, blocking until it is done.
    pub fn create_sync(&self, context: &ContextHandle) -> Result<Reference> {
        let (runner, isolate) = CreateRunner::new(context, &self.module)?;
        run_sync(&isolate, runner)
    }
}

impl TransferableHandle for NativeModuleHandle {
    type Transfer = NativeModuleTransferable;

    fn transfer_out(&self) -> NativeModuleTransferable {
        NativeModuleTransferable {
            module: Arc::clone(&self.module),
        }
    }
}

/// Transfer form of a [`NativeModuleHandle`]. Only carries the shared module.
#[derive(Debug, Clone)]
pub struct NativeModuleTransferable {
    module: Arc<NativeModule>,
}

impl NativeModuleTransferable {
    pub fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }
}

impl Transferable for NativeModuleTransferable {
    type Local = NativeModuleHandle;

    fn transfer_in(self) -> Result<NativeModuleHandle> {
        Ok(NativeModuleHandle::from_module(self.module))
    }
}

/// Initializes a module into a context of some isolate.
pub struct CreateRunner {
    context: RemoteContext,
    module: Arc<NativeModule>,
}

impl CreateRunner {
    fn new(context: &ContextHandle, module: &Arc<NativeModule>) -> Result<(Self, IsolateHolder)> {
        let (context, isolate) = context.get_context()?;
        let runner = Self {
            context,
            module: Arc::clone(module),
        };
        Ok((runner, isolate))
    }
}

impl ThreePhaseTask for CreateRunner {
    type Transfer = ReferenceTransferable;
    type Output = Reference;

    fn phase2(self, env: &Environment) -> Result<ReferenceTransferable> {
        let context = self.context.deref_in(env)?;
        let _scope = env.enter_context(context);

        let mut exports = ExportsBuilder::new();
        let mut raw_exports = exports.as_raw();
        let mut raw_isolate = RawIsolate {
            id: env.id().as_u64(),
        };
        let mut raw_context = RawContext {
            id: context.as_u64(),
        };
        let event_loop = env.scheduler().raw_loop();

        // SAFETY: on the isolate thread, and every pointer outlives the call.
        unsafe {
            self.module
                .invoke(&mut raw_isolate, &mut raw_context, &mut raw_exports, event_loop)
        };
        let properties = exports.finish()?;

        if env.register_native_module(&self.module) {
            info!(
                isolate = %env.id(),
                module = %self.module.id(),
                path = %self.module.path().display(),
                "Native module registered"
            );
        }

        let object = env.new_object(properties)?;
        debug!(isolate = %env.id(), context = %context, object = %object, "Module exports created");
        ReferenceTransferable::new(env, object)
    }

    fn phase3(exports: ReferenceTransferable) -> Result<Reference> {
        exports.transfer_in()
    }
}
