//! Build script for NPI coprocessor firmware
//!
//! Handles:
//! - Linker script arguments for the `embedded` target build

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (tests) link normally
    if std::env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        return;
    }

    // memory.x is generated by embassy-stm32's `memory-x` feature
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
