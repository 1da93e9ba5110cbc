//! Symbol types.

use std::fmt;

use super::Address;

/// Kind of a reflection symbol.
///
/// Only two kinds of compiler-emitted symbols are meaningful to the
/// reflection layer: callable code and per-class dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolKind
{
    /// A function (`STT_FUNC`) whose name carries the compiler prefix.
    Function,
    /// A vtable object (`STT_OBJECT`) whose name carries the compiler prefix and vtable suffix.
    Vtable,
}

impl fmt::Display for SymbolKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolKind::Function => "function",
            SymbolKind::Vtable => "vtable",
        };
        f.pad(label)
    }
}

/// A registered reflection symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectSymbol
{
    /// Function or vtable.
    pub kind: SymbolKind,
    /// Runtime address of the symbol.
    pub address: Address,
    /// Linkage (mangled) name, the lookup key.
    pub name: String,
    /// Human readable path decoded from `name`.
    pub demangled: String,
    /// Size in bytes as recorded in the symbol table.
    pub size: u64,
}

impl ReflectSymbol
{
    /// `true` if `address` falls inside `[address, address + size)`.
    ///
    /// Zero-sized symbols only contain their own start address.
    pub fn contains(&self, address: Address) -> bool
    {
        match address.offset_from(self.address) {
            Some(0) => true,
            Some(delta) => delta < self.size,
            None => false,
        }
    }
}

impl fmt::Display for ReflectSymbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:<8} {} {:>6} {}", self.kind, self.address, self.size, self.demangled)
    }
}

/// Programming language associated with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Emitted by the companion compiler (`_Y` prefix).
    Ymir,
    /// Rust symbol (legacy `_ZN` or v0 `_R` mangling).
    Rust,
    /// C++ symbol (Itanium mangling without Rust extensions).
    Cpp,
    /// C symbol or unmangled global.
    C,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Ymir => "ymir",
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::C => "c",
        };
        f.pad(label)
    }
}

/// A linkage name with demangling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    /// Construct from a raw linkage name.
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Raw (mangled) name emitted in the object file.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    /// Demangled human-friendly name if available.
    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Preferred presentation (demangled fallback to raw).
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    /// Language classification for the symbol.
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}
