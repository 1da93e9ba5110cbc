//! # Reflection
//!
//! Class instantiation by name and deep copy of object graphs.
//!
//! Everything lives on a [`Heap`] of untyped blocks; types are described by
//! explicit field tables ([`layout`]) rather than by the host language's own
//! layout, and every access goes through `(block, offset, size)` triples.
//!
//! - [`heap`]: zeroed, never-freed blocks
//! - [`layout`]: shapes, aggregate layouts and class descriptors
//! - [`catalog`]: vtables and constructor symbols of declared classes
//! - [`object`]: typed field access on instances
//! - [`allocator`]: `create_from_name` and `alloc_from_vtable`
//! - [`duplicate`]: identity-preserving deep copy

pub mod allocator;
pub mod catalog;
pub mod duplicate;
pub mod heap;
pub mod layout;
pub mod object;

pub use allocator::ReflectiveAllocator;
pub use catalog::ClassCatalog;
pub use duplicate::{GraphDuplicator, IdentityMap, Value};
pub use heap::{Heap, SliceRef};
pub use layout::{AggregateBuilder, AggregateLayout, ClassBuilder, ClassDescriptor, Constructor, FieldDescriptor, Shape};
pub use object::{ObjectView, ObjectViewMut};
