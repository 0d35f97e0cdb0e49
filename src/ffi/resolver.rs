//! Module Resolver
//!
//! Maps a logical module name onto the platform-specific file to load.
//! Resolution is a pure lookup keyed by [`Platform`]; nothing here touches
//! the filesystem except [`probe`], which only reports.

use std::fmt;
use std::path::{Path, PathBuf};

use super::error::{FfiError, FfiResult};

/// Base directory used when the caller does not supply one.
///
/// Matches where the native module build drops its shared artifacts.
pub const DEFAULT_BASE_DIR: &str = "lib/shared";

/// Logical name of the transport module.
pub const SORATUN_MODULE: &str = "libsoratun";

const KNOWN_EXTENSIONS: [&str; 3] = ["so", "dylib", "dll"];

/// Operating-system family, as far as module naming is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux (`.so`)
    Linux,
    /// macOS (`.dylib`; the loader used by most hosts rejects `.so` here)
    MacOs,
    /// Windows (`.dll`)
    Windows,
    /// Any other Unix-like system (`.so`)
    OtherUnix,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") || cfg!(target_os = "ios") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") || cfg!(target_os = "android") {
            Platform::Linux
        } else {
            Platform::OtherUnix
        }
    }

    /// Parse a platform identifier (`std::env::consts::OS` style)
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "linux" | "android" => Some(Platform::Linux),
            "macos" | "darwin" | "osx" | "ios" => Some(Platform::MacOs),
            "windows" | "win32" | "win" => Some(Platform::Windows),
            "freebsd" | "openbsd" | "netbsd" | "dragonfly" | "solaris" | "illumos" | "unix" => {
                Some(Platform::OtherUnix)
            }
            _ => None,
        }
    }

    /// Canonical shared-library extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Platform::Linux | Platform::OtherUnix => "so",
            Platform::MacOs => "dylib",
            Platform::Windows => "dll",
        }
    }

    /// Filename prefix for shared libraries
    pub fn prefix(&self) -> &'static str {
        "lib"
    }

    /// All platforms, for table-driven checks
    pub fn all() -> [Platform; 4] {
        [
            Platform::Linux,
            Platform::MacOs,
            Platform::Windows,
            Platform::OtherUnix,
        ]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::OtherUnix => write!(f, "unix"),
        }
    }
}

/// Construct the platform-specific module filename.
///
/// `name` may be bare (`soratun`), prefixed (`libsoratun`) or carry a
/// known extension (`libsoratun.so`); any known extension is replaced with
/// the platform's own.
pub fn library_filename(platform: Platform, name: &str) -> String {
    let stem = KNOWN_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(&format!(".{}", ext)))
        .unwrap_or(name);

    let prefix = platform.prefix();
    let stem = if stem.starts_with(prefix) {
        stem.to_string()
    } else {
        format!("{}{}", prefix, stem)
    };

    format!("{}.{}", stem, platform.extension())
}

/// Resolve a logical module name to a concrete path.
///
/// Pure in `(platform, name, base_dir)`. A missing file is only discovered
/// when the module is loaded.
pub fn resolve(platform: Platform, name: &str, base_dir: Option<&Path>) -> PathBuf {
    let base = base_dir.unwrap_or_else(|| Path::new(DEFAULT_BASE_DIR));
    base.join(library_filename(platform, name))
}

/// Check that a resolved path exists.
///
/// On a miss, lists sibling files with the same stem and another known
/// extension so the caller can retry with an explicit path.
pub fn probe(path: &Path) -> FfiResult<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let candidates = match path.file_stem() {
        Some(stem) => KNOWN_EXTENSIONS
            .iter()
            .map(|ext| path.with_file_name(stem).with_extension(ext))
            .filter(|candidate| candidate != path && candidate.is_file())
            .collect(),
        None => Vec::new(),
    };

    tracing::warn!(
        path = %path.display(),
        candidates = candidates.len(),
        "native module not found at resolved path"
    );

    Err(FfiError::ResolutionAmbiguity {
        path: path.to_path_buf(),
        candidates,
    })
}
