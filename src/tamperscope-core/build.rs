//! Build script for tamperscope-core.
//!
//! Records the target triple for diagnostics.

fn main() {
    println!(
        "cargo::rustc-env=TARGET={}",
        std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string())
    );
    println!("cargo::rerun-if-env-changed=TARGET");
}
