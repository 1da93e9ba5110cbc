//! # Graph Duplication
//!
//! Deep copy of values living on the reflection heap.
//!
//! | shape          | copy                                                        |
//! |----------------|-------------------------------------------------------------|
//! | scalar, null   | returned as is                                              |
//! | aggregate      | fresh block, each field copied at its declared offset       |
//! | slice          | fresh buffer, each element copied independently             |
//! | class instance | identity-mapped: one destination per distinct source object |
//!
//! ## Identity and cycles
//!
//! Every class instance reached during one [`GraphDuplicator::deep_copy`] call is
//! recorded in an [`IdentityMap`] *before* its fields are copied. A reference to
//! an object that is already in the map, whether through a cycle or a second
//! path from the root, resolves to the existing destination. The map is purged
//! when the outermost call returns.
//!
//! Instances are allocated through their own vtable, read from the live object,
//! so a derived instance reached through a base-typed reference is copied
//! whole. Their fields are copied from a work queue rather than by recursion,
//! which keeps long linked structures from exhausting the stack.
//!
//! Class fields without deep-copy behaviour ([`Shape::Opaque`], or slices of
//! them) are copied bit for bit and therefore shared with the source.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, debug_span};

use super::allocator::ReflectiveAllocator;
use super::heap::SliceRef;
use super::layout::{AggregateLayout, ClassDescriptor, FieldDescriptor, Shape, VTABLE_OFFSET};
use crate::error::{ReflectError, ReflectResult};
use crate::types::Address;

/// A value handed to [`GraphDuplicator::deep_copy`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value
{
    /// Plain bytes, held by value.
    Scalar(SmallVec<[u8; 16]>),
    /// Aggregate stored in its own heap block.
    Aggregate(Address, Arc<AggregateLayout>),
    /// Slice header and element shape.
    Slice(SliceRef, Arc<Shape>),
    /// Nullable reference to a class instance.
    Object(Option<Address>),
}

impl Value
{
    /// Scalar holding a little-endian `i64`.
    pub fn from_i64(value: i64) -> Self
    {
        Value::Scalar(SmallVec::from_slice(&value.to_le_bytes()))
    }

    /// The scalar as `i64`, if it is 8 bytes wide.
    pub fn as_i64(&self) -> Option<i64>
    {
        match self {
            Value::Scalar(bytes) => <[u8; 8]>::try_from(bytes.as_slice()).ok().map(i64::from_le_bytes),
            _ => None,
        }
    }

    /// Object reference, if this is a non-null object.
    pub fn as_object(&self) -> Option<Address>
    {
        match self {
            Value::Object(address) => *address,
            _ => None,
        }
    }

    /// Slice header, if this is a slice.
    pub fn as_slice(&self) -> Option<SliceRef>
    {
        match self {
            Value::Slice(slice, _) => Some(*slice),
            _ => None,
        }
    }
}

/// Source object to destination object mapping of one traversal.
///
/// The table is only allocated when the first object is inserted.
#[derive(Debug, Default)]
pub struct IdentityMap
{
    table: Option<HashMap<Address, Address>>,
}

impl IdentityMap
{
    /// Create an empty, unstarted map.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Destination already created for `source`.
    pub fn find(&self, source: Address) -> Option<Address>
    {
        self.table.as_ref()?.get(&source).copied()
    }

    /// Record the destination of `source`.
    pub fn insert(&mut self, source: Address, destination: Address)
    {
        let previous = self.table.get_or_insert_with(HashMap::new).insert(source, destination);
        debug_assert!(previous.is_none(), "source {source} copied twice");
    }

    /// `true` once anything has been inserted since the last purge.
    pub fn is_started(&self) -> bool
    {
        self.table.is_some()
    }

    /// Number of recorded objects.
    pub fn len(&self) -> usize
    {
        self.table.as_ref().map_or(0, HashMap::len)
    }

    /// `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Drop every entry and release the table.
    pub fn purge(&mut self)
    {
        self.table = None;
    }
}

/// Deep-copies values on a [`ReflectiveAllocator`]'s heap.
///
/// A duplicator is reusable; each [`GraphDuplicator::deep_copy`] call starts from
/// an empty identity map. It is not meant to be shared between threads.
#[derive(Debug, Default)]
pub struct GraphDuplicator
{
    identity: IdentityMap,
    pending: VecDeque<(Address, Address, Arc<ClassDescriptor>)>,
}

impl GraphDuplicator
{
    /// Create a duplicator.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Identity map of the traversal in progress (empty between calls).
    pub fn identity_map(&self) -> &IdentityMap
    {
        &self.identity
    }

    /// Produce a storage-disjoint copy of `value`.
    ///
    /// ## Errors
    ///
    /// - `UnknownVtable` if a reachable object has a vtable of no declared class
    /// - `InvalidAddress` if a reachable reference points outside the heap
    /// - `InvalidLayout` for a slice whose elements cannot be copied
    pub fn deep_copy(&mut self, allocator: &mut ReflectiveAllocator, value: &Value) -> ReflectResult<Value>
    {
        let span = debug_span!("deep_copy");
        let _enter = span.enter();

        let result = self.copy_root(allocator, value);
        if self.identity.is_started() {
            debug!(objects = self.identity.len(), "Deep copy finished");
        }
        self.identity.purge();
        self.pending.clear();
        result
    }

    fn copy_root(&mut self, allocator: &mut ReflectiveAllocator, value: &Value) -> ReflectResult<Value>
    {
        let copy = match value {
            Value::Scalar(_) | Value::Object(None) => return Ok(value.clone()),
            Value::Object(Some(source)) => Value::Object(Some(self.copy_object(allocator, *source)?)),
            Value::Aggregate(source, layout) => {
                let destination = allocator.heap_mut().allocate_block(layout.size());
                self.copy_fields(allocator, *source, destination, layout.fields())?;
                Value::Aggregate(destination, Arc::clone(layout))
            }
            Value::Slice(slice, element) => {
                if !element.is_copiable() {
                    return Err(ReflectError::InvalidLayout(format!("slice of {element} cannot be copied")));
                }
                Value::Slice(self.copy_slice(allocator, *slice, element)?, Arc::clone(element))
            }
        };
        self.drain(allocator)?;
        Ok(copy)
    }

    fn copy_object(&mut self, allocator: &mut ReflectiveAllocator, source: Address) -> ReflectResult<Address>
    {
        if let Some(destination) = self.identity.find(source) {
            return Ok(destination);
        }

        let vtable = allocator.heap().read_address(source + VTABLE_OFFSET as u64)?;
        let class = Arc::clone(allocator.catalog().descriptor_for_vtable(allocator.heap(), vtable)?);
        let destination = allocator.alloc_from_vtable(vtable)?;
        self.identity.insert(source, destination);
        self.pending.push_back((source, destination, class));
        Ok(destination)
    }

    fn drain(&mut self, allocator: &mut ReflectiveAllocator) -> ReflectResult<()>
    {
        while let Some((source, destination, class)) = self.pending.pop_front() {
            for level in class.ancestry() {
                for field in level.fields() {
                    if field.shape.is_copiable() {
                        self.copy_field(allocator, source, destination, field)?;
                    } else {
                        let offset = field.offset as u64;
                        allocator
                            .heap_mut()
                            .copy(source + offset, destination + offset, field.shape.size())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn copy_fields(
        &mut self,
        allocator: &mut ReflectiveAllocator,
        source: Address,
        destination: Address,
        fields: &[FieldDescriptor],
    ) -> ReflectResult<()>
    {
        for field in fields {
            self.copy_field(allocator, source, destination, field)?;
        }
        Ok(())
    }

    fn copy_field(
        &mut self,
        allocator: &mut ReflectiveAllocator,
        source: Address,
        destination: Address,
        field: &FieldDescriptor,
    ) -> ReflectResult<()>
    {
        let offset = field.offset as u64;
        self.copy_in_place(allocator, source + offset, destination + offset, &field.shape)
    }

    fn copy_in_place(
        &mut self,
        allocator: &mut ReflectiveAllocator,
        source: Address,
        destination: Address,
        shape: &Shape,
    ) -> ReflectResult<()>
    {
        match shape {
            Shape::Scalar { size } | Shape::Opaque { size } => allocator.heap_mut().copy(source, destination, *size),
            Shape::Aggregate(layout) => self.copy_fields(allocator, source, destination, layout.fields()),
            Shape::Slice(element) => {
                let slice = allocator.heap().read_slice_ref(source)?;
                let copy = self.copy_slice(allocator, slice, element)?;
                allocator.heap_mut().write_slice_ref(destination, copy)
            }
            Shape::Object => {
                let target = allocator.heap().read_address(source)?;
                let copy = if target.is_null() {
                    Address::ZERO
                } else {
                    self.copy_object(allocator, target)?
                };
                allocator.heap_mut().write_address(destination, copy)
            }
        }
    }

    fn copy_slice(&mut self, allocator: &mut ReflectiveAllocator, slice: SliceRef, element: &Shape) -> ReflectResult<SliceRef>
    {
        let stride = element.size();
        // A corrupt header must not size the destination buffer.
        allocator.heap().check_slice(slice, stride)?;
        let copy = allocator.heap_mut().allocate_slice(stride, slice.len)?;
        for index in 0..slice.len {
            let offset = index * stride as u64;
            self.copy_in_place(allocator, slice.data + offset, copy.data + offset, element)?;
        }
        Ok(copy)
    }
}
