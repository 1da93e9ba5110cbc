//! # Symbol Discovery
//!
//! Finds the functions and vtables the companion compiler emitted into the
//! running executable and its shared libraries.
//!
//! ```text
//! ProcessMapReader ──► ElfImage ──► SymbolRegistry
//!  (mapped files)     (symbols)     (name → address)
//! ```
//!
//! - [`demangle`]: linkage-name codec and derived symbol names
//! - [`elf`]: zero-copy ELF64 parsing and symbol classification
//! - [`maps`]: memory-map enumeration
//! - [`registry`]: the symbol table itself

pub mod demangle;
pub mod elf;
pub mod maps;
pub mod registry;

pub use demangle::{demangle, make_symbol_name, mangle};
pub use elf::{ElfHeader, ElfImage, SectionHeader, SymbolEntry};
pub use maps::{MapEntry, ProcessMapReader};
pub use registry::{RefreshReport, SymbolRegistry};
