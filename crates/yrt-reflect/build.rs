//! Build script for yrt-reflect
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (let-else and `div_ceil` need Rust 1.73.0+)
//! - Target platform (symbol discovery reads `/proc`, which only Linux provides)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    // Check minimum Rust version
    match rustc_version::version() {
        Ok(found) => {
            let required = rustc_version::Version::new(1, 73, 0);
            if found < required {
                panic!("yrt-reflect requires Rust {required} or newer, found {found}");
            }
        }
        // If we can't get version (e.g., in some build environments), just warn
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    // Platform check: the target, not the host, decides whether discovery works
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        println!(
            "cargo:warning=yrt-reflect: symbol discovery is inert on {target_os}; only explicitly declared classes are available"
        );
    }
}
