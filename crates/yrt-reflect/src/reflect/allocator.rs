//! # Reflective Allocator
//!
//! Instantiates classes whose type is known only by name at run time.
//!
//! ## Lookup
//!
//! A class path such as `main::Node` is turned into two linkage names:
//!
//! - the vtable, `_Y4main4NodeVT`
//! - the default constructor, `_Y4main4Node4selfFxP11x4main4NodeZxP11x4main4Node`
//!
//! Both are resolved through the [`SymbolRegistry`] before any memory is
//! allocated, so a failed lookup leaves the heap untouched. When the
//! configuration allows it, a miss refreshes the registry from the process's
//! memory map once before giving up.

use std::sync::Arc;

use tracing::debug;

use super::catalog::ClassCatalog;
use super::duplicate::{GraphDuplicator, Value};
use super::heap::Heap;
use super::layout::{ClassDescriptor, VTABLE_OFFSET};
use super::object::{ObjectView, ObjectViewMut};
use crate::config::ReflectConfig;
use crate::error::{ReflectError, ReflectResult};
use crate::symbols::demangle::{constructor_symbol, vtable_symbol};
use crate::symbols::SymbolRegistry;
use crate::types::{Address, SymbolKind};

/// Creates class instances from names and vtables.
///
/// ## Example
///
/// ```rust
/// use yrt_reflect::prelude::*;
///
/// let mut allocator = ReflectiveAllocator::isolated();
/// allocator.declare_class(
///     ClassBuilder::new("main::Counter")
///         .field("count", Shape::i64())
///         .constructor(|counter| counter.write_i64("count", 10))
///         .build()?,
/// )?;
///
/// let counter = allocator.create_from_name("main::Counter")?;
/// assert_eq!(allocator.object(counter)?.read_i64("count")?, 10);
///
/// assert!(allocator.create_from_name("Unknown::Class").is_err());
/// # Ok::<(), ReflectError>(())
/// ```
#[derive(Debug)]
pub struct ReflectiveAllocator
{
    config: ReflectConfig,
    heap: Heap,
    catalog: ClassCatalog,
    registry: SymbolRegistry,
}

impl Default for ReflectiveAllocator
{
    fn default() -> Self
    {
        Self::new(ReflectConfig::default())
    }
}

impl ReflectiveAllocator
{
    /// Create an allocator with its own heap, catalog and registry.
    pub fn new(config: ReflectConfig) -> Self
    {
        let registry = SymbolRegistry::from_config(&config);
        Self::with_registry(config, registry)
    }

    /// Create an allocator over an already populated registry.
    ///
    /// Each allocator owns its registry because declared classes register
    /// vtables that live on this allocator's heap. To avoid parsing the mapped
    /// files once per allocator, refresh one registry and hand out clones:
    ///
    /// ```rust
    /// use yrt_reflect::prelude::*;
    ///
    /// let shared = SymbolRegistry::global().lock().unwrap().clone();
    /// let allocator = ReflectiveAllocator::with_registry(ReflectConfig::isolated(), shared);
    /// assert!(allocator.catalog().is_empty());
    /// ```
    pub fn with_registry(config: ReflectConfig, registry: SymbolRegistry) -> Self
    {
        Self {
            config,
            heap: Heap::new(),
            catalog: ClassCatalog::new(),
            registry,
        }
    }

    /// Allocator that only sees explicitly declared classes.
    #[must_use]
    pub fn isolated() -> Self
    {
        Self::new(ReflectConfig::isolated())
    }

    /// Active configuration.
    pub fn config(&self) -> &ReflectConfig
    {
        &self.config
    }

    /// Heap holding every allocated block.
    pub fn heap(&self) -> &Heap
    {
        &self.heap
    }

    /// Mutable heap access, for building values outside of constructors.
    pub fn heap_mut(&mut self) -> &mut Heap
    {
        &mut self.heap
    }

    /// Declared classes.
    pub fn catalog(&self) -> &ClassCatalog
    {
        &self.catalog
    }

    /// Symbol table used for class lookups.
    pub fn registry(&self) -> &SymbolRegistry
    {
        &self.registry
    }

    /// Mutable symbol table, e.g. to index an extra image.
    pub fn registry_mut(&mut self) -> &mut SymbolRegistry
    {
        &mut self.registry
    }

    /// Declare a class, making it instantiable by name.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidLayout` if the path is already declared.
    pub fn declare_class(&mut self, class: ClassDescriptor) -> ReflectResult<Arc<ClassDescriptor>>
    {
        self.catalog.declare(&mut self.heap, &mut self.registry, class)
    }

    /// Declared class at `path`.
    pub fn class(&self, path: &str) -> Option<Arc<ClassDescriptor>>
    {
        self.catalog.class(path).cloned()
    }

    fn resolve(&mut self, name: &str, kind: SymbolKind) -> ReflectResult<Address>
    {
        if let Some(address) = self.registry.lookup(name, kind) {
            return Ok(address);
        }
        if self.config.discover_on_miss {
            debug!(name, %kind, "Symbol miss, refreshing registry");
            self.registry.try_refresh()?;
        }
        self.registry.require(name, kind).map(|symbol| symbol.address)
    }

    /// Allocate an instance of `class_name` and run its default constructor.
    ///
    /// ## Errors
    ///
    /// - `SymbolNotFound` if the vtable or the default constructor is not
    ///   registered; nothing is allocated in that case
    /// - `UnknownVtable` if the vtable belongs to no declared class
    /// - `ConstructionFailed` if the constructor returns an error
    pub fn create_from_name(&mut self, class_name: &str) -> ReflectResult<Address>
    {
        let vtable = self.resolve(&vtable_symbol(class_name), SymbolKind::Vtable)?;
        let constructor_name = constructor_symbol(class_name);
        let constructor_address = self.resolve(&constructor_name, SymbolKind::Function)?;

        let class = Arc::clone(self.catalog.descriptor_for_vtable(&self.heap, vtable)?);
        // Registered but not backed by a declared constructor (e.g. found in a foreign image).
        let constructor = self
            .catalog
            .constructor_at(constructor_address)
            .and_then(|owner| owner.constructor().cloned())
            .ok_or_else(|| ReflectError::SymbolNotFound {
                name: constructor_name,
                kind: SymbolKind::Function,
            })?;

        let object = self.alloc_from_vtable(vtable)?;
        let mut view = ObjectViewMut::new(&mut self.heap, &class, object);
        constructor(&mut view).map_err(|source| ReflectError::ConstructionFailed {
            class: class.path().to_string(),
            source,
        })?;

        debug!(class = class.path(), object = %object, "Created instance");
        Ok(object)
    }

    /// Allocate an instance of `class_name` without running any constructor.
    ///
    /// The instance has its vtable set and every field zeroed.
    ///
    /// # Safety
    ///
    /// Class invariants established by the default constructor do not hold for
    /// the returned instance. The caller must populate every field from
    /// validated data (e.g. a decoded packet) before the instance is used as a
    /// value of its class.
    ///
    /// ## Errors
    ///
    /// - `SymbolNotFound` if the vtable is not registered
    /// - `UnknownVtable` if the vtable belongs to no declared class
    pub unsafe fn create_from_name_unconstructed(&mut self, class_name: &str) -> ReflectResult<Address>
    {
        let vtable = self.resolve(&vtable_symbol(class_name), SymbolKind::Vtable)?;
        self.alloc_from_vtable(vtable)
    }

    /// Allocate a zeroed instance sized for the class of `vtable` and attach the vtable.
    ///
    /// ## Errors
    ///
    /// Returns `UnknownVtable` if `vtable` belongs to no declared class.
    pub fn alloc_from_vtable(&mut self, vtable: Address) -> ReflectResult<Address>
    {
        let size = self.catalog.descriptor_for_vtable(&self.heap, vtable)?.size();
        let object = self.heap.allocate_block(size);
        self.heap.write_address(object + VTABLE_OFFSET as u64, vtable)?;
        Ok(object)
    }

    /// Dynamic class of an instance, read from its vtable.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidAddress` if `object` is not on the heap, or `UnknownVtable`.
    pub fn class_of(&self, object: Address) -> ReflectResult<&Arc<ClassDescriptor>>
    {
        let vtable = self.heap.read_address(object + VTABLE_OFFSET as u64)?;
        self.catalog.descriptor_for_vtable(&self.heap, vtable)
    }

    /// Read-only view of an instance.
    ///
    /// ## Errors
    ///
    /// See [`ReflectiveAllocator::class_of`].
    pub fn object(&self, object: Address) -> ReflectResult<ObjectView<'_>>
    {
        let class = self.class_of(object)?;
        Ok(ObjectView::new(&self.heap, class, object))
    }

    /// Mutable view of an instance.
    ///
    /// ## Errors
    ///
    /// See [`ReflectiveAllocator::class_of`].
    pub fn object_mut(&mut self, object: Address) -> ReflectResult<ObjectViewMut<'_>>
    {
        let vtable = self.heap.read_address(object + VTABLE_OFFSET as u64)?;
        let class = self.catalog.descriptor_for_vtable(&self.heap, vtable)?;
        Ok(ObjectViewMut::new(&mut self.heap, class, object))
    }

    /// Deep-copy a value with a fresh identity map.
    ///
    /// ## Errors
    ///
    /// See [`GraphDuplicator::deep_copy`].
    pub fn deep_copy(&mut self, value: &Value) -> ReflectResult<Value>
    {
        GraphDuplicator::new().deep_copy(self, value)
    }
}
