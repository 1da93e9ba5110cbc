//! # Error Types
//!
//! Error handling for symbol discovery and reflection.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Address, SymbolKind};

/// Error returned by a reflective default constructor.
pub type ConstructorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for reflection operations
///
/// ## Error Categories
///
/// 1. **Lookup errors**: SymbolNotFound, UnknownVtable, FieldNotFound
/// 2. **Construction errors**: ConstructionFailed
/// 3. **Definition errors**: InvalidLayout (raised while a type is being declared)
/// 4. **Memory errors**: InvalidAddress, FieldShapeMismatch
/// 5. **Discovery errors**: MemoryMapUnavailable, Io
///
/// Malformed or unreadable binaries are not represented here: the symbol
/// registry skips them and reports the skip in its refresh summary.
#[derive(Error, Debug)]
pub enum ReflectError
{
    /// No symbol with this exact name and kind is registered
    ///
    /// Returned by class instantiation when either the vtable or the default
    /// constructor cannot be found, and by function/method lookups.
    #[error("Symbol not found: {kind} {name}")]
    SymbolNotFound
    {
        /// Mangled name that was looked up
        name: String,
        /// Kind that was looked up
        kind: SymbolKind,
    },

    /// The default constructor of a class reported a failure
    ///
    /// The constructor's own error is kept as the source.
    #[error("Construction of {class} failed: {source}")]
    ConstructionFailed
    {
        /// Class path (demangled)
        class: String,
        /// Error raised by the constructor
        #[source]
        source: ConstructorError,
    },

    /// An address used as a vtable does not identify a declared class
    ///
    /// Vtables discovered in foreign binaries have no class descriptor and
    /// cannot be used to allocate instances.
    #[error("No class descriptor for vtable at {0}")]
    UnknownVtable(Address),

    /// A memory access fell outside every heap block
    #[error("Invalid access of {len} bytes at {address}")]
    InvalidAddress
    {
        /// First byte of the access
        address: Address,
        /// Number of bytes accessed
        len: usize,
    },

    /// A class and its ancestors declare no field with this name
    #[error("Class {class} has no field named {field}")]
    FieldNotFound
    {
        /// Class path
        class: String,
        /// Requested field name
        field: String,
    },

    /// A field was accessed through an accessor of the wrong width or shape
    #[error("Field {class}.{field} is {actual}, accessed as {expected}")]
    FieldShapeMismatch
    {
        /// Class path
        class: String,
        /// Field name
        field: String,
        /// Shape required by the accessor
        expected: String,
        /// Declared shape of the field
        actual: String,
    },

    /// A type descriptor could not be built
    ///
    /// This is the definition-time failure for aggregates holding a field
    /// without deep-copy behaviour, duplicate field names and empty paths.
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// The process memory-map description could not be read
    ///
    /// Symbol discovery cannot proceed without it.
    #[error("Cannot read memory map {path}: {source}")]
    MemoryMapUnavailable
    {
        /// Path of the map description (normally `/proc/self/maps`)
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, ReflectError>`
///
/// ```rust
/// use yrt_reflect::error::ReflectResult;
/// fn foo() -> ReflectResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type ReflectResult<T> = std::result::Result<T, ReflectError>;
