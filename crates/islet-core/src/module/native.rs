//! Dynamically loaded native modules.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use islet_extension_sdk::{
    INIT_FOR_CONTEXT_SYMBOL, INIT_FOR_CONTEXT_WITH_LOOP_SYMBOL, InitForContextFn,
    InitForContextWithLoopFn, RawContext, RawExports, RawIsolate, RawLoop,
};
use libloading::Library;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::isolate::environment;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identity of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    fn next() -> Self {
        Self(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module-{}", self.0)
    }
}

/// Which entry points a module exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointKind {
    Simple,
    LoopAware,
    Both,
}

impl fmt::Display for EntryPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "InitForContext",
            Self::LoopAware => "InitForContextWithLoop",
            Self::Both => "InitForContext+InitForContextWithLoop",
        };
        f.write_str(name)
    }
}

/// Entry points resolved from a module, fixed at load time.
#[derive(Clone, Copy)]
pub enum EntryPoint {
    Simple(InitForContextFn),
    LoopAware(InitForContextWithLoopFn),
    Both {
        simple: InitForContextFn,
        with_loop: InitForContextWithLoopFn,
    },
}

impl EntryPoint {
    /// Combine whatever symbols were found. `None` if neither was.
    pub fn resolve(
        simple: Option<InitForContextFn>,
        with_loop: Option<InitForContextWithLoopFn>,
    ) -> Option<Self> {
        match (simple, with_loop) {
            (Some(simple), Some(with_loop)) => Some(Self::Both { simple, with_loop }),
            (Some(simple), None) => Some(Self::Simple(simple)),
            (None, Some(with_loop)) => Some(Self::LoopAware(with_loop)),
            (None, None) => None,
        }
    }

    pub fn kind(&self) -> EntryPointKind {
        match self {
            Self::Simple(_) => EntryPointKind::Simple,
            Self::LoopAware(_) => EntryPointKind::LoopAware,
            Self::Both { .. } => EntryPointKind::Both,
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntryPoint").field(&self.kind()).finish()
    }
}

/// A native module and the library backing it.
///
/// Shared through `Arc` by every handle referencing it and by the registry
/// of every isolate it was initialized in. The library is closed when the
/// last of those goes away.
pub struct NativeModule {
    id: ModuleId,
    path: PathBuf,
    entry: EntryPoint,
    library: Option<Library>,
}

// SAFETY: the library handle and entry points are process-wide and carry no
// isolate or thread affinity.
unsafe impl Send for NativeModule {}
unsafe impl Sync for NativeModule {}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("entry", &self.entry.kind())
            .finish()
    }
}

fn ensure_default_isolate() -> Result<()> {
    if environment::is_default() {
        Ok(())
    } else {
        Err(Error::Precheck)
    }
}

impl NativeModule {
    /// Open the library at `path` and resolve its entry points.
    ///
    /// Only allowed from the default isolate. If the library exports neither
    /// entry point it is closed again before returning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ensure_default_isolate()?;
        let path = path.as_ref().to_path_buf();

        let library = unsafe {
            Library::new(&path).map_err(|e| Error::Load {
                path: path.clone(),
                reason: e.to_string(),
            })?
        };

        let simple = unsafe { library.get::<InitForContextFn>(INIT_FOR_CONTEXT_SYMBOL) }
            .ok()
            .map(|symbol| *symbol);
        let with_loop =
            unsafe { library.get::<InitForContextWithLoopFn>(INIT_FOR_CONTEXT_WITH_LOOP_SYMBOL) }
                .ok()
                .map(|symbol| *symbol);

        let Some(entry) = EntryPoint::resolve(simple, with_loop) else {
            if let Err(e) = library.close() {
                warn!(path = %path.display(), error = %e, "Failed to close incompatible module");
            }
            return Err(Error::IncompatibleModule { path });
        };

        let module = Self {
            id: ModuleId::next(),
            path,
            entry,
            library: Some(library),
        };
        info!(
            module = %module.id,
            path = %module.path.display(),
            entry_point = %entry.kind(),
            "Native module loaded"
        );
        Ok(module)
    }

    /// A module whose entry points are linked into the host binary.
    ///
    /// `name` stands in for the library path.
    pub fn from_entry_point(name: impl Into<PathBuf>, entry: EntryPoint) -> Result<Self> {
        ensure_default_isolate()?;
        let module = Self {
            id: ModuleId::next(),
            path: name.into(),
            entry,
            library: None,
        };
        debug!(
            module = %module.id,
            name = %module.path.display(),
            entry_point = %entry.kind(),
            "Static native module registered"
        );
        Ok(module)
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry
    }

    /// Whether a dynamic library backs this module.
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    /// Call the module's initializer.
    ///
    /// The loop-aware entry point wins when both exist; exactly one is called.
    ///
    /// # Safety
    /// Must run on the isolate thread owning `event_loop`, with pointers that
    /// stay valid for the duration of the call.
    pub(crate) unsafe fn invoke(
        &self,
        isolate: &mut RawIsolate,
        context: &mut RawContext,
        exports: &mut RawExports,
        event_loop: *mut RawLoop,
    ) {
        match self.entry {
            EntryPoint::LoopAware(with_loop) | EntryPoint::Both { with_loop, .. } => unsafe {
                with_loop(isolate, context, exports, event_loop)
            },
            EntryPoint::Simple(simple) => unsafe { simple(isolate, context, exports) },
        }
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        let Some(library) = self.library.take() else {
            return;
        };
        match library.close() {
            Ok(()) => debug!(module = %self.id, path = %self.path.display(), "Native module closed"),
            Err(e) => warn!(
                module = %self.id,
                path = %self.path.display(),
                error = %e,
                "Failed to close native module"
            ),
        }
    }
}
