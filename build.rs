//! Build script for the libsoratun test double
//!
//! Compiles `test/fixtures/mock_soratun.c` into two shared libraries with
//! the host C compiler: one exporting the three-argument `SendUDP` and one
//! exporting the five-argument form. Integration tests load them from
//! `$SORATUN_MOCK_DIR/{basic,options}/`. A missing compiler only disables
//! those tests.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const MOCK_SOURCE: &str = "test/fixtures/mock_soratun.c";

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let mock_dir = out_dir.join("mock");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}", MOCK_SOURCE);
    println!("cargo:rustc-env=SORATUN_MOCK_DIR={}", mock_dir.display());

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let extension = match target_os.as_str() {
        "macos" | "ios" => "dylib",
        "windows" => "dll",
        _ => "so",
    };

    for (variant, defines) in [("basic", &[][..]), ("options", &["SORATUN_UDP_OPTIONS"][..])] {
        let dir = mock_dir.join(variant);
        fs::create_dir_all(&dir).expect("Failed to create mock module directory");
        let output = dir.join(format!("libsoratun.{}", extension));
        if let Err(e) = build_mock(&output, defines, &target_os) {
            println!(
                "cargo:warning=Skipping {} mock module ({}); bridge integration tests will not run",
                variant, e
            );
        }
    }
}

fn build_mock(output: &Path, defines: &[&str], target_os: &str) -> Result<(), String> {
    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .try_get_compiler()
        .map_err(|e| e.to_string())?;

    if compiler.is_like_msvc() {
        return Err("MSVC toolchain not supported for the mock module".to_string());
    }

    let mut cmd = compiler.to_command();
    cmd.arg("-fPIC");
    cmd.arg(if target_os == "macos" || target_os == "ios" {
        "-dynamiclib"
    } else {
        "-shared"
    });
    for define in defines {
        cmd.arg(format!("-D{}", define));
    }
    cmd.arg("-o").arg(output).arg(MOCK_SOURCE);

    let status = cmd
        .status()
        .map_err(|e| format!("failed to run compiler: {}", e))?;
    if !status.success() {
        return Err(format!("compiler exited with {}", status));
    }
    Ok(())
}
