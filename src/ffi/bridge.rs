//! Invocation Bridge
//!
//! Binds entry points of a [`NativeModule`] to declared signatures and
//! performs synchronous calls through them.
//!
//! # Safety boundary
//!
//! The bridge cannot see the compiled signature of a native symbol. Binding
//! `SendUDP` with five parameters against a module that exports the
//! three-parameter form (or any other disagreement) is undefined behaviour
//! at call time and may corrupt native memory. Argument lists are checked
//! against the *declared* signature only.

use std::ffi::{c_char, CStr, CString};
use std::mem;
use std::sync::Arc;

use super::error::{FfiError, FfiResult};
use super::loader::NativeModule;
use super::types::{CallRequest, FfiSignature, FfiValue};

type Deallocator = unsafe extern "C" fn(*mut c_char);

/// RAII wrapper for C strings returned from an entry point.
///
/// When the module exports a deallocator it is called on drop; otherwise
/// the string is left to the module (libsoratun's `C.CString` results are
/// never handed back).
pub struct CStringPtr {
    ptr: *mut c_char,
    free: Option<Deallocator>,
}

impl CStringPtr {
    /// Creates a new wrapper from a raw pointer
    ///
    /// # Safety
    /// The caller must ensure that:
    /// - `ptr` is either null or a valid NUL-terminated string from the module
    /// - `free`, when given, is the module's matching deallocator
    /// - the module stays loaded until the wrapper is dropped
    pub unsafe fn new(ptr: *mut c_char, free: Option<Deallocator>) -> Self {
        Self { ptr, free }
    }

    /// Checks if the wrapped pointer is null
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Converts the C string to a Rust &str
    ///
    /// # Safety
    /// The caller must ensure that the wrapped pointer is not null
    pub unsafe fn to_str(&self, entry_point: &str) -> FfiResult<&str> {
        debug_assert!(
            !self.is_null(),
            "Attempted to convert null pointer to string"
        );

        CStr::from_ptr(self.ptr).to_str().map_err(|e| {
            FfiError::Conversion(format!(
                "'{}' returned text that is not UTF-8: {}",
                entry_point, e
            ))
        })
    }
}

impl Drop for CStringPtr {
    fn drop(&mut self) {
        if let (false, Some(free)) = (self.ptr.is_null(), self.free) {
            unsafe {
                free(self.ptr);
            }
        }
    }
}

/// An entry point resolved in a module and tied to its declared signature
#[derive(Debug, Clone)]
pub struct BoundEntryPoint {
    module: Arc<NativeModule>,
    signature: FfiSignature,
    address: usize,
    deallocator: Option<usize>,
}

impl BoundEntryPoint {
    /// Bind `signature` to the symbol of the same name in `module`.
    ///
    /// Fails with [`FfiError::SymbolNotFound`] when the symbol is absent.
    /// The declared signature is trusted; see the module docs.
    pub fn bind(module: &Arc<NativeModule>, signature: FfiSignature) -> FfiResult<Self> {
        let address = module.symbol_address(signature.name())?;
        tracing::debug!(
            module = %module.path().display(),
            signature = %signature,
            "bound entry point"
        );
        Ok(Self {
            module: Arc::clone(module),
            signature,
            address,
            deallocator: None,
        })
    }

    /// Bind as [`bind`](Self::bind), releasing returned strings through the
    /// module's `free_symbol`, which must have C type `void (*)(char*)`.
    pub fn bind_with_deallocator(
        module: &Arc<NativeModule>,
        signature: FfiSignature,
        free_symbol: &str,
    ) -> FfiResult<Self> {
        let deallocator = module.symbol_address(free_symbol)?;
        let mut bound = Self::bind(module, signature)?;
        bound.deallocator = Some(deallocator);
        Ok(bound)
    }

    /// Declared signature
    pub fn signature(&self) -> &FfiSignature {
        &self.signature
    }

    /// Module this entry point belongs to
    pub fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }

    /// Call the entry point and return its text result.
    ///
    /// Blocks until the native call returns. Calls on the same module are
    /// serialized. A successful return only means the module produced text;
    /// whether that text reports an error is the module's own convention.
    pub fn call(&self, args: &[FfiValue]) -> FfiResult<String> {
        self.signature.check_args(args)?;

        let marshaled = Marshaled::new(args)?;
        let name = self.signature.name();

        let _guard = self.module.acquire()?;
        tracing::debug!(entry_point = name, arity = args.len(), "calling entry point");

        // Safety: the module is loaded and held by `_guard`, the argument
        // words match the declared signature, and `marshaled` outlives the
        // call. Agreement between declared and compiled signatures is the
        // binder's responsibility.
        let raw = unsafe { dispatch(self.address, &marshaled.words)? };
        let free = self
            .deallocator
            .map(|addr| unsafe { mem::transmute::<usize, Deallocator>(addr) });
        let result = unsafe { CStringPtr::new(raw, free) };

        if result.is_null() {
            tracing::debug!(entry_point = name, "entry point returned null");
            return Err(FfiError::NullResponse(name.to_string()));
        }

        let text = unsafe { result.to_str(name)? }.to_string();
        tracing::debug!(entry_point = name, bytes = text.len(), "entry point returned");
        Ok(text)
    }

    /// Call with a [`CallRequest`] addressed to this entry point
    pub fn call_request(&self, request: &CallRequest) -> FfiResult<String> {
        if request.entry_point != self.signature.name() {
            return Err(FfiError::InvalidSignature(format!(
                "request for '{}' sent to binding of '{}'",
                request.entry_point,
                self.signature.name()
            )));
        }
        self.call(&request.args)
    }
}

/// Arguments converted to machine words, plus the storage they point into
struct Marshaled {
    words: Vec<usize>,
    // Keeps pointed-to text alive for the duration of the call
    _texts: Vec<CString>,
}

impl Marshaled {
    fn new(args: &[FfiValue]) -> FfiResult<Self> {
        let mut words = Vec::with_capacity(args.len());
        let mut texts = Vec::new();

        for (position, arg) in args.iter().enumerate() {
            match arg {
                FfiValue::Text(s) => {
                    let c = CString::new(s.as_str()).map_err(|e| FfiError::InvalidArgument {
                        position,
                        reason: format!("text contains NUL at byte {}", e.nul_position()),
                    })?;
                    words.push(c.as_ptr() as usize);
                    texts.push(c);
                }
                // Borrowed from `args`, which outlives the call
                FfiValue::Bytes(b) => words.push(b.as_ptr() as usize),
                // Sign-extended to a full word; callees read the low 32 bits
                FfiValue::Int(v) => words.push(*v as isize as usize),
            }
        }

        Ok(Self {
            words,
            _texts: texts,
        })
    }
}

// Every supported parameter is word-sized (pointer or C int widened to a
// word), so each arity needs exactly one function pointer type.
unsafe fn dispatch(addr: usize, w: &[usize]) -> FfiResult<*mut c_char> {
    type R = *mut c_char;
    let result = match *w {
        [] => {
            let f: extern "C" fn() -> R = mem::transmute(addr);
            f()
        }
        [a] => {
            let f: extern "C" fn(usize) -> R = mem::transmute(addr);
            f(a)
        }
        [a, b] => {
            let f: extern "C" fn(usize, usize) -> R = mem::transmute(addr);
            f(a, b)
        }
        [a, b, c] => {
            let f: extern "C" fn(usize, usize, usize) -> R = mem::transmute(addr);
            f(a, b, c)
        }
        [a, b, c, d] => {
            let f: extern "C" fn(usize, usize, usize, usize) -> R = mem::transmute(addr);
            f(a, b, c, d)
        }
        [a, b, c, d, e] => {
            let f: extern "C" fn(usize, usize, usize, usize, usize) -> R = mem::transmute(addr);
            f(a, b, c, d, e)
        }
        [a, b, c, d, e, g] => {
            let f: extern "C" fn(usize, usize, usize, usize, usize, usize) -> R =
                mem::transmute(addr);
            f(a, b, c, d, e, g)
        }
        _ => {
            return Err(FfiError::InvalidSignature(format!(
                "unsupported arity {}",
                w.len()
            )))
        }
    };
    Ok(result)
}

impl NativeModule {
    /// Bind an entry point of this module; see [`BoundEntryPoint::bind`]
    pub fn bind(self: &Arc<Self>, signature: FfiSignature) -> FfiResult<BoundEntryPoint> {
        BoundEntryPoint::bind(self, signature)
    }
}
