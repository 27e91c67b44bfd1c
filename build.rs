// SPDX-License-Identifier: MIT

//! Embeds the launcher payload and its build-time settings.
//!
//! The payload text is copied into `OUT_DIR` so that `include_str!` always has
//! a file to read, even when no payload was supplied.

use std::env::var;
use std::env::var_os;
use std::fs::copy;
use std::fs::write;
use std::path::PathBuf;

const PAYLOAD: &str = "STAGEXEC_PAYLOAD";
const PLACEHOLDER: &str = "STAGEXEC_PLACEHOLDER";
const SCRATCH_DIR: &str = "STAGEXEC_SCRATCH_DIR";

fn main() {
    let out_dir = PathBuf::from(var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    let target = out_dir.join("payload.b64");

    match var_os(PAYLOAD) {
        Some(source) => {
            let source = PathBuf::from(source);
            copy(&source, &target).unwrap_or_else(|e| {
                panic!("unable to copy payload `{}`: {e}", source.display())
            });
            println!("cargo::rerun-if-changed={}", source.display());
        }
        None => write(&target, "").expect("unable to write empty payload"),
    }

    let placeholder = var(PLACEHOLDER).unwrap_or_else(|_| "binary".to_string());
    assert!(
        !placeholder.is_empty() && !placeholder.contains('\0'),
        "{PLACEHOLDER} must be a non-empty string without NUL bytes"
    );
    let scratch_dir = var(SCRATCH_DIR).unwrap_or_else(|_| "/tmp".to_string());

    // `env!` requires UTF-8, which `OUT_DIR` is expected to be.
    let target = target
        .to_str()
        .expect("Rust expects UTF-8 paths for `env!`");

    println!("cargo::rerun-if-env-changed={PAYLOAD}");
    println!("cargo::rerun-if-env-changed={PLACEHOLDER}");
    println!("cargo::rerun-if-env-changed={SCRATCH_DIR}");
    println!("cargo::rerun-if-changed=build.rs");
    println!("cargo::rustc-env=STAGEXEC_PAYLOAD_FILE={target}");
    println!("cargo::rustc-env={PLACEHOLDER}={placeholder}");
    println!("cargo::rustc-env={SCRATCH_DIR}={scratch_dir}");
}
