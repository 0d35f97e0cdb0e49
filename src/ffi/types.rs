//! FFI Type System
//!
//! Type tags, argument values and entry point signatures for calls into
//! native modules.

use std::fmt;

use super::error::{FfiError, FfiResult};

/// Maximum number of native arguments an entry point may take.
pub const MAX_ARITY: usize = 6;

/// Primitive type tags for entry point parameters and return values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfiType {
    /// Null-terminated UTF-8 string (const char*)
    Text,
    /// Byte buffer pointer (const uint8_t*)
    Buffer,
    /// C int holding the byte length of the preceding buffer
    Length,
    /// C int
    Int,
}

impl FfiType {
    /// Whether values of this type are passed as pointers
    pub fn is_pointer(&self) -> bool {
        matches!(self, FfiType::Text | FfiType::Buffer)
    }

    /// Whether values of this type are passed as signed integers
    pub fn is_integer(&self) -> bool {
        matches!(self, FfiType::Length | FfiType::Int)
    }

    /// Parse from a C-style type name
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.to_lowercase().as_str() {
            "text" | "cstr" | "string" | "char*" | "constchar*" => Some(FfiType::Text),
            "buffer" | "bytes" | "pointer" | "uint8_t*" | "constuint8_t*" | "void*" => {
                Some(FfiType::Buffer)
            }
            "len" | "length" | "size" => Some(FfiType::Length),
            "int" | "i32" | "int32" | "int32_t" => Some(FfiType::Int),
            _ => None,
        }
    }
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiType::Text => write!(f, "text"),
            FfiType::Buffer => write!(f, "buffer"),
            FfiType::Length => write!(f, "len"),
            FfiType::Int => write!(f, "int"),
        }
    }
}

/// A concrete argument value for an entry point call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfiValue {
    /// UTF-8 text, marshaled as a null-terminated string
    Text(String),
    /// Raw bytes, marshaled as a pointer
    Bytes(Vec<u8>),
    /// Fixed-width signed integer
    Int(i32),
}

impl FfiValue {
    /// Get the natural type tag of this value
    pub fn ffi_type(&self) -> FfiType {
        match self {
            FfiValue::Text(_) => FfiType::Text,
            FfiValue::Bytes(_) => FfiType::Buffer,
            FfiValue::Int(_) => FfiType::Int,
        }
    }

    /// Whether this value can be passed for a parameter of type `ty`
    pub fn satisfies(&self, ty: FfiType) -> bool {
        matches!(
            (self, ty),
            (FfiValue::Text(_), FfiType::Text)
                | (FfiValue::Bytes(_), FfiType::Buffer)
                | (FfiValue::Int(_), FfiType::Int)
                | (FfiValue::Int(_), FfiType::Length)
        )
    }
}

impl From<&str> for FfiValue {
    fn from(s: &str) -> Self {
        FfiValue::Text(s.to_string())
    }
}

impl From<String> for FfiValue {
    fn from(s: String) -> Self {
        FfiValue::Text(s)
    }
}

impl From<Vec<u8>> for FfiValue {
    fn from(b: Vec<u8>) -> Self {
        FfiValue::Bytes(b)
    }
}

impl From<&[u8]> for FfiValue {
    fn from(b: &[u8]) -> Self {
        FfiValue::Bytes(b.to_vec())
    }
}

impl From<i32> for FfiValue {
    fn from(v: i32) -> Self {
        FfiValue::Int(v)
    }
}

/// Entry point signature: symbol name, parameter tags and return tag.
///
/// Signatures are immutable once built. The return type of every entry
/// point this bridge supports is [`FfiType::Text`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FfiSignature {
    name: String,
    params: Vec<FfiType>,
    return_type: FfiType,
}

impl FfiSignature {
    /// Create a new signature returning text.
    ///
    /// Rejects empty names, arities above [`MAX_ARITY`], and buffers that
    /// are not immediately followed by their length (or lengths that do
    /// not immediately follow a buffer).
    pub fn new(name: impl Into<String>, params: Vec<FfiType>) -> FfiResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(FfiError::InvalidSignature(
                "entry point name is empty".to_string(),
            ));
        }
        if params.len() > MAX_ARITY {
            return Err(FfiError::InvalidSignature(format!(
                "'{}' takes {} arguments (max {})",
                name,
                params.len(),
                MAX_ARITY
            )));
        }
        for (i, param) in params.iter().enumerate() {
            match param {
                FfiType::Buffer if params.get(i + 1) != Some(&FfiType::Length) => {
                    return Err(FfiError::InvalidSignature(format!(
                        "'{}': buffer at position {} is not followed by its length",
                        name, i
                    )));
                }
                FfiType::Length if i == 0 || params[i - 1] != FfiType::Buffer => {
                    return Err(FfiError::InvalidSignature(format!(
                        "'{}': length at position {} does not follow a buffer",
                        name, i
                    )));
                }
                _ => {}
            }
        }

        Ok(Self {
            name,
            params,
            return_type: FfiType::Text,
        })
    }

    /// Build a signature known to be well-formed
    pub(crate) fn known(name: &str, params: &[FfiType]) -> Self {
        debug_assert!(Self::new(name, params.to_vec()).is_ok());
        Self {
            name: name.to_string(),
            params: params.to_vec(),
            return_type: FfiType::Text,
        }
    }

    /// Exported symbol name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types in call order
    pub fn params(&self) -> &[FfiType] {
        &self.params
    }

    /// Return type
    pub fn return_type(&self) -> FfiType {
        self.return_type
    }

    /// Number of native arguments
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check an argument list against this signature.
    ///
    /// Every mismatch (count, type, or a length that disagrees with its
    /// buffer) is reported here, before any native code runs.
    pub fn check_args(&self, args: &[FfiValue]) -> FfiResult<()> {
        if args.len() != self.params.len() {
            return Err(FfiError::InvalidArgCount {
                expected: self.params.len(),
                got: args.len(),
            });
        }

        for (position, (arg, &expected)) in args.iter().zip(&self.params).enumerate() {
            if !arg.satisfies(expected) {
                return Err(FfiError::InvalidArgType {
                    position,
                    expected,
                    got: arg.ffi_type(),
                });
            }
        }

        for (i, param) in self.params.iter().enumerate() {
            if *param != FfiType::Length {
                continue;
            }
            if let (FfiValue::Bytes(buf), FfiValue::Int(declared)) = (&args[i - 1], &args[i]) {
                if usize::try_from(*declared).ok() != Some(buf.len()) {
                    return Err(FfiError::LengthMismatch {
                        declared: i64::from(*declared),
                        actual: buf.len(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse from a C-style declaration.
    /// Format: "char* Name(type name, type name, ...)"
    pub fn parse(declaration: &str) -> FfiResult<Self> {
        let invalid = || FfiError::InvalidSignature(declaration.to_string());
        // Collapse all whitespace to single ASCII spaces so byte offsets
        // found below always sit on char boundaries
        let normalized = declaration.split_whitespace().collect::<Vec<_>>().join(" ");
        let declaration = normalized.trim_end_matches(';');

        let paren_pos = declaration.find('(').ok_or_else(invalid)?;
        let close_pos = declaration.rfind(')').ok_or_else(invalid)?;
        if close_pos < paren_pos {
            return Err(invalid());
        }
        let before_paren = declaration[..paren_pos].trim();
        let inside = declaration[paren_pos + 1..close_pos].trim();

        // Split return type and name; "char*Name" and "char *Name" both occur
        let split = before_paren
            .rfind(|c: char| c.is_whitespace() || c == '*')
            .ok_or_else(invalid)?;
        let name = before_paren[split + 1..].trim();
        let return_type = before_paren[..=split].replace(' ', "");
        if FfiType::parse(&return_type) != Some(FfiType::Text) {
            return Err(FfiError::InvalidSignature(format!(
                "'{}' must return text, found '{}'",
                name, return_type
            )));
        }

        let mut params = Vec::new();
        if !inside.is_empty() && inside != "void" {
            for param in inside.split(',') {
                let param = param.trim();
                // Drop the parameter name when present
                let type_str = match param.rfind(|c: char| c.is_whitespace() || c == '*') {
                    Some(pos) if FfiType::parse(&param.replace(' ', "")).is_none() => {
                        param[..=pos].replace(' ', "")
                    }
                    _ => param.replace(' ', ""),
                };
                let ty = FfiType::parse(&type_str).ok_or_else(|| {
                    FfiError::InvalidSignature(format!("unknown parameter type '{}'", param))
                })?;
                params.push(ty);
            }
        }

        Self::new(name, params)
    }
}

impl fmt::Display for FfiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

/// A single call: target entry point and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Entry point symbol name
    pub entry_point: String,
    /// Arguments in call order
    pub args: Vec<FfiValue>,
}

impl CallRequest {
    /// Create a new request
    pub fn new(entry_point: impl Into<String>, args: Vec<FfiValue>) -> Self {
        Self {
            entry_point: entry_point.into(),
            args,
        }
    }

    /// Arguments for `Send(config, method, path, body)`
    pub fn send(config: &str, method: &str, path: &str, body: &str) -> Self {
        Self::new(
            "Send",
            vec![config.into(), method.into(), path.into(), body.into()],
        )
    }

    /// Arguments for `SendUDP(config, payload, length)`.
    ///
    /// The length is taken from the payload.
    pub fn send_udp(config: &str, payload: &[u8]) -> FfiResult<Self> {
        let len = payload_len(payload)?;
        Ok(Self::new(
            "SendUDP",
            vec![config.into(), payload.into(), FfiValue::Int(len)],
        ))
    }

    /// Arguments for `SendUDP(config, payload, length, port, timeout)`
    pub fn send_udp_with(
        config: &str,
        payload: &[u8],
        port: i32,
        timeout_ms: i32,
    ) -> FfiResult<Self> {
        let len = payload_len(payload)?;
        Ok(Self::new(
            "SendUDP",
            vec![
                config.into(),
                payload.into(),
                FfiValue::Int(len),
                FfiValue::Int(port),
                FfiValue::Int(timeout_ms),
            ],
        ))
    }
}

fn payload_len(payload: &[u8]) -> FfiResult<i32> {
    i32::try_from(payload.len()).map_err(|_| FfiError::InvalidArgument {
        position: 1,
        reason: format!("payload of {} bytes exceeds C int range", payload.len()),
    })
}
