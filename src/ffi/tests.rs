//! FFI Module Tests

use std::sync::Arc;

use super::*;

#[test]
fn test_ffi_type_parsing() {
    assert_eq!(FfiType::parse("char*"), Some(FfiType::Text));
    assert_eq!(FfiType::parse("const char *"), Some(FfiType::Text));
    assert_eq!(FfiType::parse("buffer"), Some(FfiType::Buffer));
    assert_eq!(FfiType::parse("len"), Some(FfiType::Length));
    assert_eq!(FfiType::parse("int"), Some(FfiType::Int));
    assert_eq!(FfiType::parse("double"), None);
}

#[test]
fn test_ffi_type_properties() {
    assert!(FfiType::Text.is_pointer());
    assert!(FfiType::Buffer.is_pointer());
    assert!(!FfiType::Int.is_pointer());

    assert!(FfiType::Length.is_integer());
    assert!(FfiType::Int.is_integer());
    assert!(!FfiType::Text.is_integer());
}

#[test]
fn test_value_satisfies() {
    assert!(FfiValue::Int(4).satisfies(FfiType::Length));
    assert!(FfiValue::Int(4).satisfies(FfiType::Int));
    assert!(!FfiValue::Text("4".into()).satisfies(FfiType::Int));
    assert!(!FfiValue::Bytes(vec![1]).satisfies(FfiType::Text));
    assert_eq!(FfiValue::from(vec![1u8, 2]).ffi_type(), FfiType::Buffer);
}

#[test]
fn test_signature_parsing() {
    let sig = FfiSignature::parse("char* Send(char* config, char* method, char* path, char* body)")
        .unwrap();
    assert_eq!(sig.name(), "Send");
    assert_eq!(sig.return_type(), FfiType::Text);
    assert_eq!(sig.params(), &[FfiType::Text; 4]);

    let sig = FfiSignature::parse("char *SendUDP(const char *config, buffer payload, len n);")
        .unwrap();
    assert_eq!(sig.name(), "SendUDP");
    assert_eq!(
        sig.params(),
        &[FfiType::Text, FfiType::Buffer, FfiType::Length]
    );

    let sig = FfiSignature::parse("char* Version(void)").unwrap();
    assert_eq!(sig.arity(), 0);

    assert!(FfiSignature::parse("int Add(int a, int b)").is_err());
    assert!(FfiSignature::parse("char* Broken(float x)").is_err());
    assert!(FfiSignature::parse("no parens").is_err());
}

#[test]
fn test_signature_parsing_unicode_whitespace() {
    let sig = FfiSignature::parse("char*\u{3000}Send(void)").unwrap();
    assert_eq!(sig.name(), "Send");
    assert_eq!(sig.arity(), 0);

    let sig = FfiSignature::parse("char* Send(char*\u{3000}cfg)").unwrap();
    assert_eq!(sig.params(), &[FfiType::Text]);

    let sig = FfiSignature::parse("char*\u{a0}SendUDP(char*\u{2003}c,\tbuffer p,\nlen n)").unwrap();
    assert_eq!(sig.arity(), 3);

    assert!(FfiSignature::parse("char*\u{3000}(void)").is_err());
    assert!(FfiSignature::parse("\u{3000}").is_err());
}

#[test]
fn test_signature_display() {
    let sig = FfiSignature::new(
        "SendUDP",
        vec![FfiType::Text, FfiType::Buffer, FfiType::Length],
    )
    .unwrap();
    assert_eq!(sig.to_string(), "text SendUDP(text, buffer, len)");
}

#[test]
fn test_signature_shape_rules() {
    assert!(FfiSignature::new("", vec![]).is_err());
    assert!(FfiSignature::new("F", vec![FfiType::Buffer]).is_err());
    assert!(FfiSignature::new("F", vec![FfiType::Length]).is_err());
    assert!(FfiSignature::new("F", vec![FfiType::Buffer, FfiType::Int]).is_err());
    assert!(FfiSignature::new("F", vec![FfiType::Int; MAX_ARITY + 1]).is_err());
    assert!(FfiSignature::new("F", vec![FfiType::Int; MAX_ARITY]).is_ok());
}

#[test]
fn test_check_args_count_and_type() {
    let sig = FfiSignature::new(
        "SendUDP",
        vec![FfiType::Text, FfiType::Buffer, FfiType::Length],
    )
    .unwrap();

    let err = sig.check_args(&["{}".into()]).unwrap_err();
    assert!(matches!(
        err,
        FfiError::InvalidArgCount {
            expected: 3,
            got: 1
        }
    ));

    let err = sig
        .check_args(&["{}".into(), "payload".into(), FfiValue::Int(7)])
        .unwrap_err();
    assert!(matches!(
        err,
        FfiError::InvalidArgType {
            position: 1,
            expected: FfiType::Buffer,
            got: FfiType::Text
        }
    ));
}

#[test]
fn test_check_args_length_must_match_buffer() {
    let sig = FfiSignature::new(
        "SendUDP",
        vec![FfiType::Text, FfiType::Buffer, FfiType::Length],
    )
    .unwrap();
    let payload = vec![0x4d, 1, 3, 0x51];

    assert!(sig
        .check_args(&["{}".into(), payload.clone().into(), FfiValue::Int(4)])
        .is_ok());

    for bad in [3, 5, -4, 0] {
        let err = sig
            .check_args(&["{}".into(), payload.clone().into(), FfiValue::Int(bad)])
            .unwrap_err();
        assert!(
            matches!(err, FfiError::LengthMismatch { actual: 4, .. }),
            "length {} accepted",
            bad
        );
        assert!(err.is_call_error());
    }
}

#[test]
fn test_call_request_builders() {
    let req = CallRequest::send("{}", "POST", "/", "hello");
    assert_eq!(req.entry_point, "Send");
    assert_eq!(req.args.len(), 4);
    assert_eq!(req.args[3], FfiValue::Text("hello".to_string()));

    let req = CallRequest::send_udp("{}", &[0x4d, 1, 3, 0x51]).unwrap();
    assert_eq!(req.args[2], FfiValue::Int(4));

    let req = CallRequest::send_udp_with("{}", &[1, 2], 23080, 5000).unwrap();
    assert_eq!(req.args.len(), 5);
    assert_eq!(req.args[3], FfiValue::Int(23080));
    assert_eq!(req.args[4], FfiValue::Int(5000));
}

#[test]
fn test_ffi_error_display() {
    let err = FfiError::LoadError("test".to_string());
    assert!(err.to_string().contains("Load error"));
    assert!(!err.is_call_error());

    let err = FfiError::InvalidArgCount {
        expected: 3,
        got: 5,
    };
    assert!(err.to_string().contains('3'));
    assert!(err.to_string().contains('5'));

    let err = FfiError::ResolutionAmbiguity {
        path: "lib/shared/libsoratun.dylib".into(),
        candidates: vec!["lib/shared/libsoratun.so".into()],
    };
    assert!(err.to_string().contains("libsoratun.so"));
}

#[test]
fn test_load_missing_module() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(library_filename(Platform::current(), "missing"));

    let err = NativeModule::load(&path).unwrap_err();
    assert!(matches!(err, FfiError::LoadError(_)));

    let mut loader = LibraryLoader::new();
    assert!(matches!(loader.load(&path), Err(FfiError::LoadError(_))));
    assert!(loader.loaded_paths().is_empty());
}

#[test]
fn test_load_invalid_module() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(library_filename(Platform::current(), "corrupt"));
    std::fs::write(&path, b"definitely not a shared object").unwrap();

    assert!(matches!(
        NativeModule::load(&path),
        Err(FfiError::LoadError(_))
    ));
}

#[test]
fn test_loader_starts_empty() {
    let loader = LibraryLoader::new();
    assert!(loader.loaded_paths().is_empty());
    assert!(loader.get("lib/shared/libsoratun.so").is_none());
}

// libc exports `char* getenv(const char*)`, which has the same shape as the
// text-returning entry points this bridge targets.
#[cfg(target_os = "linux")]
#[test]
fn test_libc_getenv_round_trip() {
    let mut loader = LibraryLoader::new();
    let Ok(libc) = loader.load("libc.so.6") else {
        return;
    };

    std::env::set_var("SORATUN_BRIDGE_TEST_VALUE", "tunnel-up");
    let getenv = libc
        .bind(FfiSignature::parse("char* getenv(const char* name)").unwrap())
        .unwrap();

    let value = getenv
        .call(&["SORATUN_BRIDGE_TEST_VALUE".into()])
        .unwrap();
    assert_eq!(value, "tunnel-up");

    let missing = getenv.call(&["SORATUN_BRIDGE_TEST_UNSET_VALUE".into()]);
    assert!(matches!(missing, Err(FfiError::NullResponse(_))));

    let nul = getenv.call(&["BAD\0NAME".into()]);
    assert!(matches!(
        nul,
        Err(FfiError::InvalidArgument { position: 0, .. })
    ));

    // Second load of the same path shares the handle, from any loader
    let again = loader.load("libc.so.6").unwrap();
    assert!(Arc::ptr_eq(&libc, &again));
    let mut other = LibraryLoader::new();
    assert!(Arc::ptr_eq(&libc, &other.load("libc.so.6").unwrap()));
    assert!(Arc::ptr_eq(&libc, &NativeModule::open("libc.so.6").unwrap()));

    assert!(matches!(
        libc.bind(FfiSignature::parse("char* NoSuchEntryPoint(void)").unwrap()),
        Err(FfiError::SymbolNotFound(_))
    ));
}
