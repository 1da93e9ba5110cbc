//! # Class Catalog
//!
//! Binds declared classes to vtables and constructor symbols.
//!
//! A compiled program finds its classes through the vtables and constructors
//! its compiler emitted. Classes declared here get the same treatment: each one
//! receives a vtable block on the reflection heap, registered in the
//! [`SymbolRegistry`] under the class's vtable linkage name, and its default
//! constructor is registered as a function symbol under the constructor
//! linkage name. Lookups then go through the registry exactly as they would
//! for compiler-emitted symbols.
//!
//! ## Vtable layout
//!
//! ```text
//! +0  type-info id (1-based index into the catalog)
//! +8  instance size
//! ```
//!
//! Vtables discovered in foreign binaries carry no catalog id; using one to
//! allocate fails with [`ReflectError::UnknownVtable`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::heap::Heap;
use super::layout::ClassDescriptor;
use crate::error::{ReflectError, ReflectResult};
use crate::symbols::demangle::demangle;
use crate::symbols::SymbolRegistry;
use crate::types::{Address, ReflectSymbol, SymbolKind};

/// Bytes of a vtable block.
pub const VTABLE_SIZE: usize = 16;

/// Base of the synthetic code addresses given to registered constructors.
pub const TEXT_BASE: Address = Address::new(0x40_0000);

/// Distance between two synthetic constructor addresses.
pub const CONSTRUCTOR_STRIDE: u64 = 16;

#[derive(Debug)]
struct CatalogEntry
{
    class: Arc<ClassDescriptor>,
    vtable: Address,
}

/// Declared classes, indexed by path, vtable and constructor address.
#[derive(Debug, Default)]
pub struct ClassCatalog
{
    entries: Vec<CatalogEntry>,
    by_path: HashMap<String, usize>,
    constructors: HashMap<Address, usize>,
}

impl ClassCatalog
{
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Declare a class: allocate its vtable and register its symbols.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidLayout` if a class with the same path is already declared.
    pub fn declare(
        &mut self,
        heap: &mut Heap,
        registry: &mut SymbolRegistry,
        class: ClassDescriptor,
    ) -> ReflectResult<Arc<ClassDescriptor>>
    {
        if self.by_path.contains_key(class.path()) {
            return Err(ReflectError::InvalidLayout(format!("class {} is already declared", class.path())));
        }

        let index = self.entries.len();
        let vtable = heap.allocate_block(VTABLE_SIZE);
        heap.write_u64(vtable, index as u64 + 1)?;
        heap.write_u64(vtable + 8, class.size() as u64)?;

        registry.register(ReflectSymbol {
            kind: SymbolKind::Vtable,
            address: vtable,
            name: class.vtable_symbol(),
            demangled: class.path().to_string(),
            size: VTABLE_SIZE as u64,
        });

        if class.constructor().is_some() {
            let address = TEXT_BASE + self.constructors.len() as u64 * CONSTRUCTOR_STRIDE;
            let name = class.constructor_symbol();
            registry.register(ReflectSymbol {
                kind: SymbolKind::Function,
                address,
                demangled: demangle(&name).into_owned(),
                name,
                size: CONSTRUCTOR_STRIDE,
            });
            self.constructors.insert(address, index);
        }

        debug!(
            class = class.path(),
            vtable = %vtable,
            size = class.size(),
            constructor = class.constructor().is_some(),
            "Declared class"
        );

        let class = Arc::new(class);
        self.by_path.insert(class.path().to_string(), index);
        self.entries.push(CatalogEntry {
            class: Arc::clone(&class),
            vtable,
        });
        Ok(class)
    }

    /// Class declared at `path`.
    pub fn class(&self, path: &str) -> Option<&Arc<ClassDescriptor>>
    {
        self.by_path.get(path).map(|index| &self.entries[*index].class)
    }

    /// Vtable of the class declared at `path`.
    pub fn vtable_of(&self, path: &str) -> Option<Address>
    {
        self.by_path.get(path).map(|index| self.entries[*index].vtable)
    }

    /// Class whose vtable is at `vtable`.
    ///
    /// ## Errors
    ///
    /// Returns `UnknownVtable` unless `vtable` is the vtable of a declared class.
    pub fn descriptor_for_vtable(&self, heap: &Heap, vtable: Address) -> ReflectResult<&Arc<ClassDescriptor>>
    {
        let id = heap.read_u64(vtable).map_err(|_| ReflectError::UnknownVtable(vtable))?;
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| self.entries.get(index))
            .filter(|entry| entry.vtable == vtable)
            .map(|entry| &entry.class)
            .ok_or(ReflectError::UnknownVtable(vtable))
    }

    /// Class whose default constructor was registered at `address`.
    pub fn constructor_at(&self, address: Address) -> Option<&Arc<ClassDescriptor>>
    {
        self.constructors.get(&address).map(|index| &self.entries[*index].class)
    }

    /// Declared classes in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDescriptor>>
    {
        self.entries.iter().map(|entry| &entry.class)
    }

    /// Number of declared classes.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// `true` if no class is declared.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}
