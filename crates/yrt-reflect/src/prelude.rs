//! Common module for library exports

pub use crate::config::ReflectConfig;
pub use crate::error::{ReflectError, ReflectResult};
pub use crate::reflect::{
    AggregateBuilder, ClassBuilder, ClassDescriptor, GraphDuplicator, Heap, IdentityMap, ReflectiveAllocator, Shape,
    SliceRef, Value,
};
pub use crate::symbols::{demangle, mangle, ElfImage, ProcessMapReader, SymbolRegistry};
pub use crate::types::{Address, ReflectSymbol, SymbolKind};
