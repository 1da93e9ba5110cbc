//! # Object Views
//!
//! Typed access to the fields of a class instance living in the [`Heap`].
//!
//! A view pairs an instance address with the [`ClassDescriptor`] of its dynamic
//! class. Fields are resolved by name through the descriptor (own fields
//! first, then ancestors) and checked against the accessor's expected shape.

use super::heap::{Heap, SliceRef};
use super::layout::{ClassDescriptor, FieldDescriptor, Shape, MONITOR_OFFSET, VTABLE_OFFSET};
use crate::error::{ReflectError, ReflectResult};
use crate::types::Address;

fn resolve<'c>(class: &'c ClassDescriptor, name: &str) -> ReflectResult<&'c FieldDescriptor>
{
    class.field(name).ok_or_else(|| ReflectError::FieldNotFound {
        class: class.path().to_string(),
        field: name.to_string(),
    })
}

fn expect_shape<'c>(
    class: &'c ClassDescriptor,
    name: &str,
    expected: &str,
    matches: impl Fn(&Shape) -> bool,
) -> ReflectResult<&'c FieldDescriptor>
{
    let field = resolve(class, name)?;
    if matches(&field.shape) {
        Ok(field)
    } else {
        Err(ReflectError::FieldShapeMismatch {
            class: class.path().to_string(),
            field: name.to_string(),
            expected: expected.to_string(),
            actual: field.shape.to_string(),
        })
    }
}

fn is_word(shape: &Shape) -> bool
{
    matches!(shape, Shape::Scalar { size: 8 })
}

fn is_half_word(shape: &Shape) -> bool
{
    matches!(shape, Shape::Scalar { size: 4 })
}

/// Read-only view of a class instance.
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a>
{
    heap: &'a Heap,
    class: &'a ClassDescriptor,
    address: Address,
}

impl<'a> ObjectView<'a>
{
    /// View `address` as an instance of `class`.
    pub fn new(heap: &'a Heap, class: &'a ClassDescriptor, address: Address) -> Self
    {
        Self { heap, class, address }
    }

    /// Instance address.
    pub fn address(&self) -> Address
    {
        self.address
    }

    /// Dynamic class of the instance.
    pub fn class(&self) -> &'a ClassDescriptor
    {
        self.class
    }

    /// Vtable pointer stored in the header.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the instance is not on the heap.
    pub fn vtable(&self) -> ReflectResult<Address>
    {
        self.heap.read_address(self.address + VTABLE_OFFSET as u64)
    }

    /// Monitor slot stored in the header.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the instance is not on the heap.
    pub fn monitor(&self) -> ReflectResult<Address>
    {
        self.heap.read_address(self.address + MONITOR_OFFSET as u64)
    }

    /// Address of a field.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound` for an unknown name.
    pub fn field_address(&self, name: &str) -> ReflectResult<Address>
    {
        Ok(self.address + resolve(self.class, name)?.offset as u64)
    }

    /// Raw bytes of a field, whatever its shape.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound` or `InvalidAddress`.
    pub fn field_bytes(&self, name: &str) -> ReflectResult<&'a [u8]>
    {
        let field = resolve(self.class, name)?;
        self.heap.read(self.address + field.offset as u64, field.shape.size())
    }

    /// Read an 8-byte scalar field as `i64`.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_i64(&self, name: &str) -> ReflectResult<i64>
    {
        let field = expect_shape(self.class, name, "scalar[8]", is_word)?;
        self.heap.read_i64(self.address + field.offset as u64)
    }

    /// Read an 8-byte scalar field as `u64`.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_u64(&self, name: &str) -> ReflectResult<u64>
    {
        let field = expect_shape(self.class, name, "scalar[8]", is_word)?;
        self.heap.read_u64(self.address + field.offset as u64)
    }

    /// Read a 4-byte scalar field as `i32`.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_i32(&self, name: &str) -> ReflectResult<i32>
    {
        let field = expect_shape(self.class, name, "scalar[4]", is_half_word)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.heap.read(self.address + field.offset as u64, 4)?);
        Ok(i32::from_le_bytes(raw))
    }

    /// Read an object reference field; `None` for null.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_object(&self, name: &str) -> ReflectResult<Option<Address>>
    {
        let field = expect_shape(self.class, name, "object", |shape| matches!(shape, Shape::Object))?;
        let target = self.heap.read_address(self.address + field.offset as u64)?;
        Ok((!target.is_null()).then_some(target))
    }

    /// Read a slice header field.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_slice(&self, name: &str) -> ReflectResult<SliceRef>
    {
        let field = expect_shape(self.class, name, "slice", |shape| matches!(shape, Shape::Slice(_)))?;
        self.heap.read_slice_ref(self.address + field.offset as u64)
    }
}

/// Mutable view of a class instance, handed to default constructors.
#[derive(Debug)]
pub struct ObjectViewMut<'a>
{
    heap: &'a mut Heap,
    class: &'a ClassDescriptor,
    address: Address,
}

impl<'a> ObjectViewMut<'a>
{
    /// View `address` as an instance of `class`.
    pub fn new(heap: &'a mut Heap, class: &'a ClassDescriptor, address: Address) -> Self
    {
        Self { heap, class, address }
    }

    /// Reborrow as a read-only view.
    pub fn as_view(&self) -> ObjectView<'_>
    {
        ObjectView::new(&*self.heap, self.class, self.address)
    }

    /// Instance address.
    pub fn address(&self) -> Address
    {
        self.address
    }

    /// Dynamic class of the instance.
    pub fn class(&self) -> &'a ClassDescriptor
    {
        self.class
    }

    /// Heap holding the instance, for allocating slice buffers or other objects.
    pub fn heap_mut(&mut self) -> &mut Heap
    {
        &mut *self.heap
    }

    /// See [`ObjectView::read_i64`].
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_i64(&self, name: &str) -> ReflectResult<i64>
    {
        self.as_view().read_i64(name)
    }

    /// See [`ObjectView::read_object`].
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_object(&self, name: &str) -> ReflectResult<Option<Address>>
    {
        self.as_view().read_object(name)
    }

    /// See [`ObjectView::read_slice`].
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn read_slice(&self, name: &str) -> ReflectResult<SliceRef>
    {
        self.as_view().read_slice(name)
    }

    /// Write an 8-byte scalar field.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn write_i64(&mut self, name: &str, value: i64) -> ReflectResult<()>
    {
        let field = expect_shape(self.class, name, "scalar[8]", is_word)?;
        self.heap.write_i64(self.address + field.offset as u64, value)
    }

    /// Write an 8-byte scalar field.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn write_u64(&mut self, name: &str, value: u64) -> ReflectResult<()>
    {
        let field = expect_shape(self.class, name, "scalar[8]", is_word)?;
        self.heap.write_u64(self.address + field.offset as u64, value)
    }

    /// Write a 4-byte scalar field.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn write_i32(&mut self, name: &str, value: i32) -> ReflectResult<()>
    {
        let field = expect_shape(self.class, name, "scalar[4]", is_half_word)?;
        self.heap.write(self.address + field.offset as u64, &value.to_le_bytes())
    }

    /// Write an object reference field; `None` stores null.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn write_object(&mut self, name: &str, target: Option<Address>) -> ReflectResult<()>
    {
        let field = expect_shape(self.class, name, "object", |shape| matches!(shape, Shape::Object))?;
        self.heap
            .write_address(self.address + field.offset as u64, target.unwrap_or(Address::ZERO))
    }

    /// Write a slice header field.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` or `InvalidAddress`.
    pub fn write_slice(&mut self, name: &str, slice: SliceRef) -> ReflectResult<()>
    {
        let field = expect_shape(self.class, name, "slice", |shape| matches!(shape, Shape::Slice(_)))?;
        self.heap.write_slice_ref(self.address + field.offset as u64, slice)
    }

    /// Overwrite the raw bytes of a field of any shape.
    ///
    /// ## Errors
    ///
    /// Returns `FieldNotFound`, `FieldShapeMismatch` when `bytes` has the wrong
    /// length, or `InvalidAddress`.
    pub fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> ReflectResult<()>
    {
        let field = resolve(self.class, name)?;
        if field.shape.size() != bytes.len() {
            return Err(ReflectError::FieldShapeMismatch {
                class: self.class.path().to_string(),
                field: name.to_string(),
                expected: format!("{} bytes", bytes.len()),
                actual: field.shape.to_string(),
            });
        }
        self.heap.write(self.address + field.offset as u64, bytes)
    }
}
