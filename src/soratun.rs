//! libsoratun Client
//!
//! Typed wrappers over the entry points exported by the libsoratun native
//! module:
//!
//! ```text
//! char* Send(char* config, char* method, char* path, char* body)
//! char* SendUDP(char* config, uint8_t* payload, int length)
//! char* SendUDP(char* config, uint8_t* payload, int length, int port, int timeoutMs)
//! ```
//!
//! The two `SendUDP` forms come from different builds of the module. Every
//! entry point is bound the first time it is used, so a module missing one
//! of them still serves the others. Calling
//! the form the loaded build does not export is undefined behaviour (see
//! [`BoundEntryPoint`]).
//!
//! # Response text
//!
//! The module reports some failures by returning null and others as plain
//! text in the same channel as real responses. Unless an
//! [`ErrorConvention`] says otherwise, every non-null result comes back as
//! an `Ok(Response)` and callers must inspect its content.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::config::BridgeConfig;
use crate::ffi::{
    BoundEntryPoint, CallRequest, FfiError, FfiResult, FfiSignature, FfiType,
    LibraryLoader, NativeModule,
};

/// `Send(config, method, path, body)`
pub fn send_signature() -> FfiSignature {
    FfiSignature::known(
        "Send",
        &[FfiType::Text, FfiType::Text, FfiType::Text, FfiType::Text],
    )
}

/// `SendUDP(config, payload, length)`
pub fn send_udp_signature() -> FfiSignature {
    FfiSignature::known("SendUDP", &[FfiType::Text, FfiType::Buffer, FfiType::Length])
}

/// `SendUDP(config, payload, length, port, timeoutMs)`
pub fn send_udp_with_options_signature() -> FfiSignature {
    FfiSignature::known(
        "SendUDP",
        &[
            FfiType::Text,
            FfiType::Buffer,
            FfiType::Length,
            FfiType::Int,
            FfiType::Int,
        ],
    )
}

/// How error reports are recognised in response text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorConvention {
    /// Errors are indistinguishable from responses; everything is returned
    #[default]
    Opaque,
    /// Responses starting with this prefix are errors
    Prefix(String),
}

impl ErrorConvention {
    /// Apply the convention to text returned by `entry_point`
    pub fn interpret(&self, entry_point: &str, text: String) -> FfiResult<Response> {
        if let ErrorConvention::Prefix(prefix) = self {
            if let Some(message) = text.strip_prefix(prefix.as_str()) {
                return Err(FfiError::Native {
                    entry_point: entry_point.to_string(),
                    message: message.trim().to_string(),
                });
            }
        }
        Ok(Response { text })
    }
}

/// Text returned by an entry point.
///
/// Under [`ErrorConvention::Opaque`] this may be an error report; nothing
/// at the type level says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    text: String,
}

impl Response {
    /// Response text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take the response text
    pub fn into_string(self) -> String {
        self.text
    }

    /// Parse the text as JSON, for callers whose endpoint answers in JSON
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.text)
    }

    /// Whether the text is empty
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Explicit destination port and timeout for `SendUDP`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpOptions {
    port: u16,
    timeout: Duration,
}

impl UdpOptions {
    /// Create options; the port must be non-zero and the timeout between
    /// 1ms and `i32::MAX` ms.
    pub fn new(port: u16, timeout: Duration) -> FfiResult<Self> {
        if port == 0 {
            return Err(FfiError::InvalidArgument {
                position: 3,
                reason: "port must be between 1 and 65535".to_string(),
            });
        }
        let millis = timeout.as_millis();
        if millis == 0 || millis > i32::MAX as u128 {
            return Err(FfiError::InvalidArgument {
                position: 4,
                reason: format!("timeout of {}ms is out of range", millis),
            });
        }
        Ok(Self { port, timeout })
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Response timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_millis(&self) -> i32 {
        // Range checked in `new`
        self.timeout.as_millis() as i32
    }
}

/// Client for a loaded libsoratun module
#[derive(Debug)]
pub struct Soratun {
    module: Arc<NativeModule>,
    convention: ErrorConvention,
    free_symbol: Option<String>,
    send: OnceCell<BoundEntryPoint>,
    send_udp: OnceCell<BoundEntryPoint>,
    send_udp_with_options: OnceCell<BoundEntryPoint>,
}

impl Soratun {
    /// Load the module described by `config` through `loader`
    pub fn open(config: &BridgeConfig, loader: &mut LibraryLoader) -> FfiResult<Self> {
        let module = loader.load(config.module_path())?;
        Ok(Self::from_module(
            module,
            config.error_convention(),
            config.library.free_symbol.clone(),
        ))
    }

    /// Wrap an already loaded module. No symbol is looked up yet.
    pub fn from_module(
        module: Arc<NativeModule>,
        convention: ErrorConvention,
        free_symbol: Option<String>,
    ) -> Self {
        Self {
            module,
            convention,
            free_symbol,
            send: OnceCell::new(),
            send_udp: OnceCell::new(),
            send_udp_with_options: OnceCell::new(),
        }
    }

    /// Underlying module handle
    pub fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }

    /// Send one HTTP request through the tunnel described by `config`.
    ///
    /// `config` is the Arc credential JSON, passed through verbatim. The
    /// module only accepts GET and POST.
    pub fn send(&self, config: &str, method: &str, path: &str, body: &str) -> FfiResult<Response> {
        let entry = self
            .send
            .get_or_try_init(|| self.bind(send_signature()))?;
        let text = entry.call_request(&CallRequest::send(config, method, path, body))?;
        self.convention.interpret("Send", text)
    }

    /// Send one UDP datagram using the module's default port and timeout
    pub fn send_udp(&self, config: &str, payload: &[u8]) -> FfiResult<Response> {
        let entry = self
            .send_udp
            .get_or_try_init(|| self.bind(send_udp_signature()))?;
        let text = entry.call_request(&CallRequest::send_udp(config, payload)?)?;
        self.convention.interpret("SendUDP", text)
    }

    /// Send one UDP datagram with an explicit port and timeout.
    ///
    /// The only way to bound how long the call blocks.
    pub fn send_udp_with(
        &self,
        config: &str,
        payload: &[u8],
        options: UdpOptions,
    ) -> FfiResult<Response> {
        let entry = self
            .send_udp_with_options
            .get_or_try_init(|| self.bind(send_udp_with_options_signature()))?;
        let text = entry.call_request(&CallRequest::send_udp_with(
            config,
            payload,
            i32::from(options.port()),
            options.timeout_millis(),
        )?)?;
        self.convention.interpret("SendUDP", text)
    }

    /// Release the module. Safe to call more than once.
    pub fn release(&self) -> bool {
        self.module.release()
    }

    fn bind(&self, signature: FfiSignature) -> FfiResult<BoundEntryPoint> {
        bind(&self.module, signature, self.free_symbol.as_deref())
    }
}

fn bind(
    module: &Arc<NativeModule>,
    signature: FfiSignature,
    free_symbol: Option<&str>,
) -> FfiResult<BoundEntryPoint> {
    match free_symbol {
        Some(free) => BoundEntryPoint::bind_with_deallocator(module, signature, free),
        None => BoundEntryPoint::bind(module, signature),
    }
}
