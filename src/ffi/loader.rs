//! Dynamic Library Loader
//!
//! Safe wrapper around libloading for loading native modules. Every open
//! goes through one process-wide table keyed by canonical path, so a file
//! is backed by a single handle (and a single call lock) no matter how
//! many loaders ask for it.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use libloading::{Library, Symbol};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

use super::error::{FfiError, FfiResult};

/// Live modules of this process, by canonical path
static OPEN_MODULES: Lazy<Mutex<HashMap<PathBuf, Weak<NativeModule>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Lifecycle state of a native module handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Library is open; symbols may be bound and called
    Loaded,
    /// Library has been released; nothing can be bound or called
    Unloaded,
}

/// A loaded native module.
///
/// The library sits behind a mutex that every call holds for its full
/// duration, so calls through any binding of the same module are
/// serialized. Native modules are treated as not reentrant.
pub struct NativeModule {
    /// Path the module was opened from
    path: PathBuf,
    /// The loaded library handle; `None` once released
    library: Mutex<Option<Library>>,
    /// Set once `library` has been taken
    released: AtomicBool,
}

impl NativeModule {
    /// Open a module, sharing the handle with every other open of the same
    /// file in this process.
    ///
    /// A handle that has been released is replaced by a freshly loaded one.
    pub fn open(path: impl AsRef<Path>) -> FfiResult<Arc<Self>> {
        let key = canonical_key(path.as_ref());
        let mut open = OPEN_MODULES.lock();
        open.retain(|_, module| module.strong_count() > 0);

        if let Some(module) = open.get(&key).and_then(Weak::upgrade) {
            if module.state() == ModuleState::Loaded {
                tracing::debug!(path = %key.display(), "reusing loaded native module");
                return Ok(module);
            }
        }

        let module = Arc::new(Self::load(&key)?);
        open.insert(key, Arc::downgrade(&module));
        Ok(module)
    }

    /// Load a private handle, bypassing the process-wide table
    pub(crate) fn load(path: impl AsRef<Path>) -> FfiResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the module's initializers. We trust the path
        // the caller resolved to be a genuine build of the module.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                FfiError::LoadError(format!(
                    "Failed to load module '{}': {}",
                    path.display(),
                    e
                ))
            })?
        };

        tracing::info!(path = %path.display(), "loaded native module");

        Ok(Self {
            path,
            library: Mutex::new(Some(library)),
            released: AtomicBool::new(false),
        })
    }

    /// Get the path of this module
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state. Does not wait for an in-flight call.
    pub fn state(&self) -> ModuleState {
        if self.released.load(Ordering::Acquire) {
            ModuleState::Unloaded
        } else {
            ModuleState::Loaded
        }
    }

    /// Resolve a symbol to its address.
    ///
    /// The address stays valid only while the module is loaded; bindings
    /// re-check the state under the call lock before using it.
    pub fn symbol_address(&self, name: &str) -> FfiResult<usize> {
        let c_name = CString::new(name).map_err(|_| {
            FfiError::SymbolNotFound(format!("Invalid symbol name: {:?}", name))
        })?;

        let guard = self.library.lock();
        let library = guard
            .as_ref()
            .ok_or_else(|| FfiError::Released(self.path.clone()))?;

        // Safety: the symbol is read as an opaque address. Its type is
        // asserted later by the signature the caller binds it with.
        let symbol: Symbol<*const ()> = unsafe {
            library.get(c_name.as_bytes_with_nul()).map_err(|e| {
                FfiError::SymbolNotFound(format!(
                    "Symbol '{}' not found in '{}': {}",
                    name,
                    self.path.display(),
                    e
                ))
            })?
        };

        Ok(*symbol as usize)
    }

    /// Acquire the call lock, failing if the module has been released
    pub(crate) fn acquire(&self) -> FfiResult<MutexGuard<'_, Option<Library>>> {
        let guard = self.library.lock();
        if guard.is_none() {
            return Err(FfiError::Released(self.path.clone()));
        }
        Ok(guard)
    }

    /// Release the module.
    ///
    /// Returns `true` if this call closed the library, `false` if it was
    /// already released. Waits for any in-flight call to finish.
    pub fn release(&self) -> bool {
        let library = {
            let mut guard = self.library.lock();
            let library = guard.take();
            self.released.store(true, Ordering::Release);
            library
        };
        match library {
            Some(library) => {
                if let Err(e) = library.close() {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to close native module");
                } else {
                    tracing::debug!(path = %self.path.display(), "released native module");
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owned set of loaded modules, keyed by canonical path.
///
/// Handles come from [`NativeModule::open`], so two loaders asking for the
/// same file get the same `Arc`. The loader keeps its modules alive until
/// it is dropped or they are unloaded. A handle that has since been
/// released is evicted and the path is opened again.
#[derive(Debug, Default)]
pub struct LibraryLoader {
    /// Loaded modules
    modules: HashMap<PathBuf, Arc<NativeModule>>,
}

impl LibraryLoader {
    /// Create a new, empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a module, reusing the existing handle for the same path
    pub fn load(&mut self, path: impl AsRef<Path>) -> FfiResult<Arc<NativeModule>> {
        let key = canonical_key(path.as_ref());

        if let Some(module) = self.modules.get(&key) {
            if module.state() == ModuleState::Loaded {
                return Ok(Arc::clone(module));
            }
            self.modules.remove(&key);
        }

        let module = NativeModule::open(&key)?;
        self.modules.insert(key, Arc::clone(&module));
        Ok(module)
    }

    /// Get a loaded module
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<NativeModule>> {
        self.modules.get(&canonical_key(path.as_ref())).cloned()
    }

    /// Release a module and drop it from this loader.
    ///
    /// The handle is shared, so other holders see it released too.
    /// Returns `false` if the path was not loaded here.
    pub fn unload(&mut self, path: impl AsRef<Path>) -> bool {
        match self.modules.remove(&canonical_key(path.as_ref())) {
            Some(module) => {
                module.release();
                true
            }
            None => false,
        }
    }

    /// List loaded module paths
    pub fn loaded_paths(&self) -> Vec<&Path> {
        self.modules.keys().map(|p| p.as_path()).collect()
    }
}

/// Key modules by canonical path so `./lib/x.so` and `lib/x.so` share a
/// handle. Paths that cannot be canonicalized are used as given; loading
/// them will fail anyway.
fn canonical_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
