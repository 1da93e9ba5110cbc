//! # Type Layouts
//!
//! Descriptors giving every reflected type an explicit field table:
//! `(name, offset, shape)` triples computed once, when the type is declared.
//! Field access and deep copy work only through these tables.
//!
//! ## Object layout
//!
//! ```text
//! +0   vtable pointer
//! +8   monitor (always null in fresh objects)
//! +16  fields of the most-base class, then each subclass in turn
//! ```
//!
//! Every class level appends its own fields after its parent's, so a derived
//! instance can be read through any of its ancestors' field tables.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::heap::SliceRef;
use super::object::ObjectViewMut;
use crate::error::{ConstructorError, ReflectError, ReflectResult};
use crate::symbols::demangle::{constructor_symbol, mangle, vtable_symbol};

/// Offset of the vtable pointer in every object.
pub const VTABLE_OFFSET: usize = 0;

/// Offset of the monitor slot in every object.
pub const MONITOR_OFFSET: usize = 8;

/// Bytes reserved before the first field of a class.
pub const OBJECT_HEADER_SIZE: usize = 16;

/// Bytes of a nullable object reference.
pub const POINTER_SIZE: usize = 8;

/// Default constructor: initialises the fields of a freshly allocated, zeroed instance.
pub type Constructor = Arc<dyn Fn(&mut ObjectViewMut<'_>) -> Result<(), ConstructorError> + Send + Sync>;

/// Storage shape of a field, slice element or aggregate member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape
{
    /// Plain bytes copied by value (integers, floats, booleans, characters).
    Scalar
    {
        /// Width in bytes
        size: usize,
    },
    /// Struct stored inline.
    Aggregate(Arc<AggregateLayout>),
    /// Slice header pointing at a separately allocated element buffer.
    Slice(Arc<Shape>),
    /// Nullable reference to a class instance.
    Object,
    /// Bytes with no deep-copy behaviour, such as a raw resource handle.
    Opaque
    {
        /// Width in bytes
        size: usize,
    },
}

impl Shape
{
    /// Scalar of `size` bytes.
    pub const fn scalar(size: usize) -> Self
    {
        Shape::Scalar { size }
    }

    /// 64-bit integer.
    pub const fn i64() -> Self
    {
        Shape::Scalar { size: 8 }
    }

    /// 32-bit integer.
    pub const fn i32() -> Self
    {
        Shape::Scalar { size: 4 }
    }

    /// Boolean.
    pub const fn bool() -> Self
    {
        Shape::Scalar { size: 1 }
    }

    /// Opaque handle of `size` bytes.
    pub const fn opaque(size: usize) -> Self
    {
        Shape::Opaque { size }
    }

    /// Slice of `element`.
    pub fn slice_of(element: Shape) -> Self
    {
        Shape::Slice(Arc::new(element))
    }

    /// Inline aggregate.
    pub fn aggregate(layout: Arc<AggregateLayout>) -> Self
    {
        Shape::Aggregate(layout)
    }

    /// Bytes occupied inline.
    pub fn size(&self) -> usize
    {
        match self {
            Shape::Scalar { size } | Shape::Opaque { size } => *size,
            Shape::Aggregate(layout) => layout.size,
            Shape::Slice(_) => SliceRef::SIZE,
            Shape::Object => POINTER_SIZE,
        }
    }

    /// Alignment of the inline storage.
    pub fn align(&self) -> usize
    {
        match self {
            Shape::Scalar { size } | Shape::Opaque { size } => size.next_power_of_two().clamp(1, 8),
            Shape::Aggregate(layout) => layout.align,
            Shape::Slice(_) | Shape::Object => 8,
        }
    }

    /// `true` if a deep copy of this shape is defined.
    pub fn is_copiable(&self) -> bool
    {
        match self {
            Shape::Opaque { .. } => false,
            Shape::Slice(element) => element.is_copiable(),
            Shape::Scalar { .. } | Shape::Aggregate(_) | Shape::Object => true,
        }
    }
}

impl fmt::Display for Shape
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Shape::Scalar { size } => write!(f, "scalar[{size}]"),
            Shape::Aggregate(layout) => write!(f, "{}", layout.name),
            Shape::Slice(element) => write!(f, "[{element}]"),
            Shape::Object => write!(f, "object"),
            Shape::Opaque { size } => write!(f, "opaque[{size}]"),
        }
    }
}

/// One entry of a field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor
{
    /// Field name
    pub name: String,
    /// Byte offset from the start of the containing object or aggregate
    pub offset: usize,
    /// Storage shape
    pub shape: Shape,
}

fn align_to(value: usize, align: usize) -> usize
{
    value.div_ceil(align) * align
}

fn place_fields(
    owner: &str,
    start: usize,
    fields: Vec<(String, Shape)>,
    taken: &mut HashSet<String>,
) -> ReflectResult<(Vec<FieldDescriptor>, usize, usize)>
{
    let mut offset = start;
    let mut align = 1;
    let mut placed = Vec::with_capacity(fields.len());
    for (name, shape) in fields {
        if !taken.insert(name.clone()) {
            return Err(ReflectError::InvalidLayout(format!("{owner} declares field {name} twice")));
        }
        align = align.max(shape.align());
        offset = align_to(offset, shape.align());
        let size = shape.size();
        placed.push(FieldDescriptor { name, offset, shape });
        offset += size;
    }
    Ok((placed, offset, align))
}

/// Layout of a struct-like value with no identity.
#[derive(Debug, PartialEq, Eq)]
pub struct AggregateLayout
{
    name: String,
    fields: Vec<FieldDescriptor>,
    size: usize,
    align: usize,
}

impl AggregateLayout
{
    /// Type name, used in diagnostics.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor]
    {
        &self.fields
    }

    /// Field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor>
    {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Size in bytes, padded to the alignment.
    pub fn size(&self) -> usize
    {
        self.size
    }
}

/// Builder for [`AggregateLayout`].
///
/// ```rust
/// use yrt_reflect::reflect::layout::{AggregateBuilder, Shape};
///
/// let point = AggregateBuilder::new("main::Point")
///     .field("x", Shape::i32())
///     .field("y", Shape::i64())
///     .build()?;
/// assert_eq!(point.field("y").map(|f| f.offset), Some(8));
/// assert_eq!(point.size(), 16);
/// # Ok::<(), yrt_reflect::error::ReflectError>(())
/// ```
#[derive(Debug)]
pub struct AggregateBuilder
{
    name: String,
    fields: Vec<(String, Shape)>,
}

impl AggregateBuilder
{
    /// Start a layout named `name`.
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, shape: Shape) -> Self
    {
        self.fields.push((name.into(), shape));
        self
    }

    /// Compute offsets.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidLayout` if a field has no deep-copy behaviour or a name
    /// is used twice.
    pub fn build(self) -> ReflectResult<Arc<AggregateLayout>>
    {
        if let Some((name, shape)) = self.fields.iter().find(|(_, shape)| !shape.is_copiable()) {
            return Err(ReflectError::InvalidLayout(format!(
                "aggregate {} cannot be copied: field {name} is {shape}",
                self.name
            )));
        }

        let (fields, end, align) = place_fields(&self.name, 0, self.fields, &mut HashSet::new())?;
        Ok(Arc::new(AggregateLayout {
            size: align_to(end, align),
            name: self.name,
            fields,
            align,
        }))
    }
}

/// Layout and behaviour of a class.
pub struct ClassDescriptor
{
    path: String,
    mangled: String,
    parent: Option<Arc<ClassDescriptor>>,
    fields: Vec<FieldDescriptor>,
    size: usize,
    constructor: Option<Constructor>,
}

impl fmt::Debug for ClassDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ClassDescriptor")
            .field("path", &self.path)
            .field("parent", &self.parent.as_ref().map(|parent| parent.path()))
            .field("fields", &self.fields)
            .field("size", &self.size)
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

impl ClassDescriptor
{
    /// Namespaced path, e.g. `main::Node`.
    pub fn path(&self) -> &str
    {
        &self.path
    }

    /// Length-prefixed encoding of the path (without prefix or suffix).
    pub fn mangled(&self) -> &str
    {
        &self.mangled
    }

    /// Linkage name of this class's vtable.
    pub fn vtable_symbol(&self) -> String
    {
        vtable_symbol(&self.path)
    }

    /// Linkage name of this class's default constructor.
    pub fn constructor_symbol(&self) -> String
    {
        constructor_symbol(&self.path)
    }

    /// Direct superclass.
    pub fn parent(&self) -> Option<&Arc<ClassDescriptor>>
    {
        self.parent.as_ref()
    }

    /// Fields declared by this class itself.
    pub fn fields(&self) -> &[FieldDescriptor]
    {
        &self.fields
    }

    /// Instance size in bytes, header included.
    pub fn size(&self) -> usize
    {
        self.size
    }

    /// Default constructor, if the class has one.
    pub fn constructor(&self) -> Option<&Constructor>
    {
        self.constructor.as_ref()
    }

    /// This class and its ancestors, most-base first.
    pub fn ancestry(&self) -> Vec<&ClassDescriptor>
    {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Field by name, searching this class and then its ancestors.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor>
    {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.field(name)))
    }

    /// `true` if this class is `path` or derives from it.
    pub fn is_subclass_of(&self, path: &str) -> bool
    {
        self.ancestry().iter().any(|class| class.path == path)
    }
}

/// Builder for [`ClassDescriptor`].
///
/// ```rust
/// use yrt_reflect::reflect::layout::{ClassBuilder, Shape, OBJECT_HEADER_SIZE};
///
/// let node = ClassBuilder::new("main::Node")
///     .field("value", Shape::i64())
///     .field("next", Shape::Object)
///     .constructor(|node| node.write_i64("value", 1))
///     .build()?;
/// assert_eq!(node.field("value").map(|f| f.offset), Some(OBJECT_HEADER_SIZE));
/// assert_eq!(node.size(), OBJECT_HEADER_SIZE + 16);
/// # Ok::<(), yrt_reflect::error::ReflectError>(())
/// ```
pub struct ClassBuilder
{
    path: String,
    parent: Option<Arc<ClassDescriptor>>,
    fields: Vec<(String, Shape)>,
    constructor: Option<Constructor>,
}

impl ClassBuilder
{
    /// Start a class at `path`.
    pub fn new(path: impl Into<String>) -> Self
    {
        Self {
            path: path.into(),
            parent: None,
            fields: Vec::new(),
            constructor: None,
        }
    }

    /// Derive from `parent`.
    #[must_use]
    pub fn extends(mut self, parent: &Arc<ClassDescriptor>) -> Self
    {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, shape: Shape) -> Self
    {
        self.fields.push((name.into(), shape));
        self
    }

    /// Attach a default constructor.
    ///
    /// Construction errors from the closure are reported as
    /// [`ReflectError::ConstructionFailed`]; any error convertible to a boxed error
    /// works, including [`ReflectError`] itself.
    #[must_use]
    pub fn constructor<F, E>(mut self, constructor: F) -> Self
    where
        F: Fn(&mut ObjectViewMut<'_>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<ConstructorError>,
    {
        let constructor: Constructor =
            Arc::new(move |object: &mut ObjectViewMut<'_>| constructor(object).map_err(Into::into));
        self.constructor = Some(constructor);
        self
    }

    /// Compute offsets.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidLayout` for an empty path or a field name already used by
    /// this class or an ancestor.
    pub fn build(self) -> ReflectResult<ClassDescriptor>
    {
        let mangled = mangle(&self.path);
        if mangled.is_empty() {
            return Err(ReflectError::InvalidLayout(format!("class path {:?} has no segments", self.path)));
        }

        let mut taken: HashSet<String> = HashSet::new();
        let mut start = OBJECT_HEADER_SIZE;
        if let Some(parent) = &self.parent {
            for class in parent.ancestry() {
                taken.extend(class.fields.iter().map(|field| field.name.clone()));
            }
            start = parent.size;
        }

        let (fields, end, _) = place_fields(&self.path, start, self.fields, &mut taken)?;
        Ok(ClassDescriptor {
            path: self.path,
            mangled,
            parent: self.parent,
            fields,
            size: align_to(end, POINTER_SIZE),
            constructor: self.constructor,
        })
    }
}
