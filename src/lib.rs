//! Soratun Bridge - invocation bridge for the libsoratun native module
//!
//! libsoratun is a precompiled transport module that tunnels requests to
//! the SORACOM Unified Endpoint over WireGuard. This crate loads it at
//! runtime and calls its entry points:
//!
//! - **Module Resolver** ([`ffi::resolve`]): logical name + platform → file
//! - **Invocation Bridge** ([`ffi::LibraryLoader`], [`ffi::BoundEntryPoint`]):
//!   load once per path, bind symbols to declared signatures, marshal and call
//! - **Client** ([`soratun::Soratun`]): typed `Send` / `SendUDP` wrappers
//!
//! # Example
//!
//! ```no_run
//! use soratun_bridge::config::BridgeConfig;
//! use soratun_bridge::ffi::LibraryLoader;
//! use soratun_bridge::soratun::Soratun;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load_from_cwd()?;
//! let mut loader = LibraryLoader::new();
//! let client = Soratun::open(&config, &mut loader)?;
//!
//! let arc = std::fs::read_to_string("arc.json")?;
//! let response = client.send(&arc, "POST", "/", r#"{"temperature":21}"#)?;
//! // The module may answer with an error report in the same text channel
//! println!("{}", response);
//! # Ok(())
//! # }
//! ```
//!
//! # Threading
//!
//! Calls into one module are serialized by a lock held for the duration of
//! each native call. A call blocks its thread until the module returns;
//! the only upper bound is the timeout argument of the five-argument
//! `SendUDP`.

pub mod arc;
pub mod config;
pub mod ffi;
pub mod soratun;

pub use config::BridgeConfig;
pub use ffi::{FfiError, FfiResult};
pub use soratun::{ErrorConvention, Response, Soratun, UdpOptions};
