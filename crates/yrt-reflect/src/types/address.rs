//! Address type shared by symbols and heap blocks.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address
///
/// Symbol addresses discovered in ELF images and the addresses handed out by
/// the reflection heap are both `u64` values. Wrapping them keeps them from
/// being mixed up with sizes, offsets and symbol counts.
///
/// The null address (`Address::ZERO`) doubles as the null reference: a class
/// field holding zero points at nothing, and an ELF symbol with value zero is
/// an undefined import.
///
/// ## Example
///
/// ```rust
/// use yrt_reflect::types::Address;
///
/// let block = Address::from(0x1000_0000);
/// let field = block + 16;
/// assert_eq!(field.value(), 0x1000_0010);
/// assert_eq!(field.offset_from(block), Some(16));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value, usable in const contexts.
    ///
    /// ```rust
    /// use yrt_reflect::types::Address;
    ///
    /// const TEXT_BASE: Address = Address::new(0x40_0000);
    /// assert!(!TEXT_BASE.is_null());
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw `u64` value of this address.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `true` for the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset, returning `None` on overflow.
    ///
    /// ```rust
    /// use yrt_reflect::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset, returning `None` on underflow.
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset, saturating at `u64::MAX`.
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Distance from `base` to this address, if this address is not below `base`.
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Round up to the next multiple of `align` (a power of two).
    ///
    /// ```rust
    /// use yrt_reflect::types::Address;
    ///
    /// assert_eq!(Address::new(0x1001).align_up(16), Address::new(0x1010));
    /// assert_eq!(Address::new(0x1010).align_up(16), Address::new(0x1010));
    /// ```
    pub const fn align_up(self, align: u64) -> Self
    {
        debug_assert!(align.is_power_of_two());
        Address((self.0 + align - 1) & !(align - 1))
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
