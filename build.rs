//! Build script for the CDC relay firmware
//!
//! Handles:
//! - Memory layout search path
//! - Linker scripts for Cortex-M firmware builds

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    if let Ok(dir) = env::var("CARGO_MANIFEST_DIR") {
        println!("cargo:rustc-link-search={dir}");
    }

    // Host test builds link with the system linker
    let target = env::var("TARGET").unwrap_or_default();
    let embedded = env::var_os("CARGO_FEATURE_EMBEDDED").is_some();
    if embedded && target.starts_with("thumb") {
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
