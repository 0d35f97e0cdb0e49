//! FFI Module
//!
//! Loads precompiled native modules and calls their exported entry points
//! synchronously.
//!
//! # Architecture
//!
//! ```text
//! logical name ("libsoratun")
//!       │
//!       ▼
//! Module Resolver (platform → libsoratun.so / .dylib / .dll)
//!       │
//!       ▼
//! LibraryLoader (one NativeModule per canonical path per process, libloading)
//!       │
//!       ▼
//! BoundEntryPoint (symbol + declared FfiSignature)
//!       │
//!       ▼
//! call(&[FfiValue]) → marshal → native call → String
//! ```
//!
//! # Example
//!
//! ```ignore
//! let path = resolve(Platform::current(), "libsoratun", None);
//! let mut loader = LibraryLoader::new();
//! let module = loader.load(&path)?;
//!
//! let send = module.bind(FfiSignature::parse("char* Send(char*, char*, char*, char*)")?)?;
//! let response = send.call(&["{}".into(), "POST".into(), "/".into(), "hello".into()])?;
//! ```
//!
//! Declared signatures are trusted. A signature that disagrees with the
//! compiled symbol is undefined behaviour, not an error.

mod bridge;
mod error;
mod loader;
mod resolver;
mod types;

pub use bridge::{BoundEntryPoint, CStringPtr};
pub use error::{FfiError, FfiResult};
pub use loader::{LibraryLoader, ModuleState, NativeModule};
pub use resolver::{
    library_filename, probe, resolve, Platform, DEFAULT_BASE_DIR, SORATUN_MODULE,
};
pub use types::{CallRequest, FfiSignature, FfiType, FfiValue, MAX_ARITY};

#[cfg(test)]
mod tests;
