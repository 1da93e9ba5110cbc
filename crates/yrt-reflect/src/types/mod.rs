//! # Types
//!
//! Plain data types shared by the symbol discovery and reflection layers.

pub mod address;
pub mod symbols;

pub use address::Address;
pub use symbols::{ReflectSymbol, SymbolKind, SymbolLanguage, SymbolName};
