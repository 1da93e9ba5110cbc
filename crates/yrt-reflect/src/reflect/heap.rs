//! # Reflection Heap
//!
//! Arena of zero-initialised byte blocks addressed by [`Address`].
//!
//! The heap stands in for the runtime's garbage-collected allocator: blocks are
//! handed out zeroed and are never freed individually; the whole arena goes away
//! with its owner. Every access is bounds-checked against the block that
//! contains its first byte, so a stray address turns into
//! [`ReflectError::InvalidAddress`] instead of memory corruption.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::{ReflectError, ReflectResult};
use crate::types::Address;

/// Address of the first block.
pub const HEAP_BASE: Address = Address::new(0x1000_0000);

/// Alignment of every block start.
pub const BLOCK_ALIGN: u64 = 16;

/// In-memory representation of a slice: element count followed by a data pointer.
///
/// ```text
/// +0  len   u64
/// +8  data  address of the first element (null when len is 0)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceRef
{
    /// Number of elements
    pub len: u64,
    /// First element
    pub data: Address,
}

impl SliceRef
{
    /// Bytes occupied by a slice header.
    pub const SIZE: usize = 16;

    /// The empty slice.
    pub const EMPTY: SliceRef = SliceRef {
        len: 0,
        data: Address::ZERO,
    };

    /// `true` if the slice has no elements.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }
}

/// Block arena.
#[derive(Debug)]
pub struct Heap
{
    blocks: BTreeMap<Address, Vec<u8>>,
    next: Address,
}

impl Default for Heap
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Heap
{
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            blocks: BTreeMap::new(),
            next: HEAP_BASE,
        }
    }

    /// Allocate a zeroed block of `size` bytes.
    ///
    /// Zero-sized blocks still get a distinct address.
    pub fn allocate_block(&mut self, size: usize) -> Address
    {
        let base = self.next;
        self.next = (base + (size.max(1) as u64)).align_up(BLOCK_ALIGN);
        self.blocks.insert(base, vec![0; size]);
        base
    }

    /// Number of blocks allocated so far.
    pub fn block_count(&self) -> usize
    {
        self.blocks.len()
    }

    /// Total bytes handed out.
    pub fn bytes_allocated(&self) -> usize
    {
        self.blocks.values().map(Vec::len).sum()
    }

    /// Size of the block starting exactly at `base`.
    pub fn block_size(&self, base: Address) -> Option<usize>
    {
        self.blocks.get(&base).map(Vec::len)
    }

    fn locate(&self, address: Address, len: usize) -> ReflectResult<(Address, usize)>
    {
        let invalid = || ReflectError::InvalidAddress { address, len };
        let (base, block) = self.blocks.range(..=address).next_back().ok_or_else(invalid)?;
        let offset = usize::try_from(address.offset_from(*base).ok_or_else(invalid)?).map_err(|_| invalid())?;
        match offset.checked_add(len) {
            Some(end) if end <= block.len() => Ok((*base, offset)),
            _ => Err(invalid()),
        }
    }

    /// Borrow `len` bytes at `address`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the range is not inside one block.
    pub fn read(&self, address: Address, len: usize) -> ReflectResult<&[u8]>
    {
        let (base, offset) = self.locate(address, len)?;
        Ok(&self.blocks[&base][offset..offset + len])
    }

    /// Overwrite bytes at `address`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the range is not inside one block.
    pub fn write(&mut self, address: Address, bytes: &[u8]) -> ReflectResult<()>
    {
        let (base, offset) = self.locate(address, bytes.len())?;
        let block = self
            .blocks
            .get_mut(&base)
            .ok_or(ReflectError::InvalidAddress { address, len: bytes.len() })?;
        block[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy `len` bytes between two possibly different blocks.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if either range is not inside one block.
    pub fn copy(&mut self, from: Address, to: Address, len: usize) -> ReflectResult<()>
    {
        if len == 0 {
            return Ok(());
        }
        let bytes: SmallVec<[u8; 64]> = SmallVec::from_slice(self.read(from, len)?);
        self.write(to, &bytes)
    }

    /// Read a little-endian `u64`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the 8 bytes are not inside one block.
    pub fn read_u64(&self, address: Address) -> ReflectResult<u64>
    {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read(address, 8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Write a little-endian `u64`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the 8 bytes are not inside one block.
    pub fn write_u64(&mut self, address: Address, value: u64) -> ReflectResult<()>
    {
        self.write(address, &value.to_le_bytes())
    }

    /// Read a little-endian `i64`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the 8 bytes are not inside one block.
    pub fn read_i64(&self, address: Address) -> ReflectResult<i64>
    {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read(address, 8)?);
        Ok(i64::from_le_bytes(raw))
    }

    /// Write a little-endian `i64`.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the 8 bytes are not inside one block.
    pub fn write_i64(&mut self, address: Address, value: i64) -> ReflectResult<()>
    {
        self.write(address, &value.to_le_bytes())
    }

    /// Read an address (a nullable reference).
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the 8 bytes are not inside one block.
    pub fn read_address(&self, address: Address) -> ReflectResult<Address>
    {
        self.read_u64(address).map(Address::new)
    }

    /// Write an address.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the 8 bytes are not inside one block.
    pub fn write_address(&mut self, address: Address, value: Address) -> ReflectResult<()>
    {
        self.write_u64(address, value.value())
    }

    /// Read a slice header.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the header is not inside one block.
    pub fn read_slice_ref(&self, address: Address) -> ReflectResult<SliceRef>
    {
        Ok(SliceRef {
            len: self.read_u64(address)?,
            data: self.read_address(address + 8)?,
        })
    }

    /// Write a slice header.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the header is not inside one block.
    pub fn write_slice_ref(&mut self, address: Address, slice: SliceRef) -> ReflectResult<()>
    {
        self.write_u64(address, slice.len)?;
        self.write_address(address + 8, slice.data)
    }

    /// Verify that the buffer of `slice` lies inside one block.
    ///
    /// Returns the buffer size in bytes; an empty slice is always valid.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the size overflows or the buffer is not on the heap.
    pub fn check_slice(&self, slice: SliceRef, element_size: usize) -> ReflectResult<usize>
    {
        if slice.is_empty() {
            return Ok(0);
        }
        let total = usize::try_from(slice.len)
            .ok()
            .and_then(|len| len.checked_mul(element_size))
            .ok_or(ReflectError::InvalidAddress {
                address: slice.data,
                len: usize::MAX,
            })?;
        self.read(slice.data, total)?;
        Ok(total)
    }

    /// Allocate a zeroed buffer of `len` elements of `element_size` bytes.
    ///
    /// An empty slice allocates nothing.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the buffer size overflows.
    pub fn allocate_slice(&mut self, element_size: usize, len: u64) -> ReflectResult<SliceRef>
    {
        if len == 0 {
            return Ok(SliceRef::EMPTY);
        }
        let total = usize::try_from(len)
            .ok()
            .and_then(|len| len.checked_mul(element_size))
            .ok_or(ReflectError::InvalidAddress {
                address: Address::ZERO,
                len: usize::MAX,
            })?;
        Ok(SliceRef {
            len,
            data: self.allocate_block(total),
        })
    }

    /// Allocate a slice holding `values`.
    ///
    /// ## Errors
    ///
    /// Never fails for slices that fit in memory.
    pub fn allocate_i64_slice(&mut self, values: &[i64]) -> ReflectResult<SliceRef>
    {
        let slice = self.allocate_slice(8, values.len() as u64)?;
        for (index, value) in values.iter().enumerate() {
            self.write_i64(slice.data + (index as u64) * 8, *value)?;
        }
        Ok(slice)
    }

    /// Read the elements of an `i64` slice.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if the buffer is not inside one block.
    pub fn read_i64_slice(&self, slice: SliceRef) -> ReflectResult<Vec<i64>>
    {
        (0..slice.len)
            .map(|index| self.read_i64(slice.data + index * 8))
            .collect()
    }
}
