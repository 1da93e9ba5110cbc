//! # yrt-reflect
//!
//! Runtime reflection for programs built by the `_Y` compiler.
//!
//! This crate provides:
//! - Symbol discovery: the functions and vtables of the running executable and
//!   its shared libraries, read from their ELF symbol tables
//! - A name-based symbol registry with reverse (address) lookup
//! - Class instantiation from a class name, with or without its default constructor
//! - Deep copy of object graphs that preserves sharing and cycles
//!
//! ## Platform Support
//!
//! - **Linux**: full discovery through `/proc/self/maps`
//! - **Other platforms**: discovery is inert; explicitly declared classes still work
//!
//! ## Why unsafe code is allowed
//!
//! Allocating an instance without running its constructor leaves class
//! invariants unestablished. That entry point is an `unsafe fn` so callers have
//! to acknowledge the contract; the crate itself performs no unsafe operations.

#![allow(unsafe_code)] // Required for ReflectiveAllocator::create_from_name_unconstructed

pub mod config;
pub mod error;
pub mod prelude;
pub mod reflect;
pub mod symbols;
pub mod types;

pub use config::ReflectConfig;
// Re-export commonly used types
pub use error::{ReflectError, ReflectResult};
pub use reflect::{GraphDuplicator, ReflectiveAllocator, Value};
pub use symbols::SymbolRegistry;
pub use types::{Address, ReflectSymbol, SymbolKind};
