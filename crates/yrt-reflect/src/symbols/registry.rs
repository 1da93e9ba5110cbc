//! # Symbol Registry
//!
//! Name to address table of the functions and vtables emitted by the companion
//! compiler, built by indexing every ELF file mapped into the process.
//!
//! The registry grows monotonically: a file is parsed once, remembered in the
//! indexed set and never parsed again, and registering an existing
//! `(kind, name)` pair replaces the previous record.
//!
//! ## Error policy
//!
//! Per-file failures (unreadable, not ELF, truncated) are logged, counted in the
//! [`RefreshReport`] and otherwise ignored. Only the process's own memory map
//! being unreadable is fatal to [`SymbolRegistry::refresh`].
//!
//! ## Thread Safety
//!
//! Mutating methods take `&mut self`. The process-wide instance returned by
//! [`SymbolRegistry::global`] sits behind a `Mutex`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::{debug, info, info_span, trace, warn};

use super::demangle::{function_symbol, method_symbol};
use super::elf::ElfImage;
use super::maps::{self, ProcessMapReader};
use crate::config::ReflectConfig;
use crate::error::{ReflectError, ReflectResult};
use crate::types::{Address, ReflectSymbol, SymbolKind};

type SymbolKey = (SymbolKind, String);

static GLOBAL: Lazy<Mutex<SymbolRegistry>> = Lazy::new(|| Mutex::new(SymbolRegistry::from_config(&ReflectConfig::from_env())));

/// Outcome of one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport
{
    /// Files parsed as ELF images during this refresh
    pub files_indexed: usize,
    /// Files that could not be read or were not 64-bit ELF
    pub files_skipped: usize,
    /// Reflection symbols registered (including replacements)
    pub symbols_registered: usize,
}

impl RefreshReport
{
    fn absorb(&mut self, other: RefreshReport)
    {
        self.files_indexed += other.files_indexed;
        self.files_skipped += other.files_skipped;
        self.symbols_registered += other.symbols_registered;
    }
}

/// Table of reflection symbols.
///
/// ## Example
///
/// ```rust
/// use yrt_reflect::symbols::SymbolRegistry;
/// use yrt_reflect::types::{Address, ReflectSymbol, SymbolKind};
///
/// let mut registry = SymbolRegistry::isolated();
/// registry.register(ReflectSymbol {
///     kind: SymbolKind::Vtable,
///     address: Address::new(0x4000),
///     name: "_Y4main4NodeVT".into(),
///     demangled: "main::Node".into(),
///     size: 16,
/// });
///
/// assert_eq!(registry.lookup("_Y4main4NodeVT", SymbolKind::Vtable), Some(Address::new(0x4000)));
/// assert_eq!(registry.lookup("_Y4main4NodeVT", SymbolKind::Function), None);
/// ```
#[derive(Debug, Clone)]
pub struct SymbolRegistry
{
    reader: ProcessMapReader,
    indexed_files: HashSet<PathBuf>,
    symbols: HashMap<SymbolKey, ReflectSymbol>,
    by_path: HashMap<SymbolKey, String>,
    by_address: BTreeMap<Address, SymbolKey>,
}

impl Default for SymbolRegistry
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl SymbolRegistry
{
    /// Registry discovering symbols through the calling process's memory map.
    #[must_use]
    pub fn new() -> Self
    {
        Self::with_reader(ProcessMapReader::new())
    }

    /// Registry reading the map description named by `config`.
    pub fn from_config(config: &ReflectConfig) -> Self
    {
        Self::with_reader(ProcessMapReader::with_path(config.maps_path.clone()))
    }

    /// Registry over an explicit map reader.
    pub fn with_reader(reader: ProcessMapReader) -> Self
    {
        Self {
            reader,
            indexed_files: HashSet::new(),
            symbols: HashMap::new(),
            by_path: HashMap::new(),
            by_address: BTreeMap::new(),
        }
    }

    /// Empty registry for explicitly registered symbols.
    ///
    /// Its reader still points at the default map; callers that never refresh
    /// never touch it.
    #[must_use]
    pub fn isolated() -> Self
    {
        Self::new()
    }

    /// The process-wide registry.
    ///
    /// Created empty on first use, configured from the environment, and never
    /// torn down.
    pub fn global() -> &'static Mutex<SymbolRegistry>
    {
        &GLOBAL
    }

    /// Map reader used by [`SymbolRegistry::refresh`].
    pub fn reader(&self) -> &ProcessMapReader
    {
        &self.reader
    }

    /// Insert or replace a symbol, returning the replaced record.
    pub fn register(&mut self, symbol: ReflectSymbol) -> Option<ReflectSymbol>
    {
        let key = (symbol.kind, symbol.name.clone());
        let previous = self.symbols.remove(&key);
        if let Some(old) = &previous {
            if self.by_address.get(&old.address) == Some(&key) {
                self.by_address.remove(&old.address);
            }
            let path_key = (old.kind, old.demangled.clone());
            if self.by_path.get(&path_key) == Some(&old.name) {
                self.by_path.remove(&path_key);
            }
        }

        trace!(kind = %symbol.kind, address = %symbol.address, name = %symbol.name, "Registered symbol");
        self.by_address.insert(symbol.address, key.clone());
        self.by_path.insert((symbol.kind, symbol.demangled.clone()), symbol.name.clone());
        self.symbols.insert(key, symbol);
        previous
    }

    /// Index every mapped file that has not been indexed yet.
    ///
    /// ## Errors
    ///
    /// Returns [`ReflectError::MemoryMapUnavailable`] if the map description cannot
    /// be read. Per-file failures are not errors; see [`RefreshReport::files_skipped`].
    pub fn try_refresh(&mut self) -> ReflectResult<RefreshReport>
    {
        let span = info_span!("refresh", maps = %self.reader.path().display());
        let _enter = span.enter();

        let entries = self.reader.read_entries()?;
        let bases = maps::load_bases(&entries);
        let mut report = RefreshReport::default();

        for path in maps::mapped_files(&entries) {
            if self.indexed_files.contains(&path) {
                continue;
            }
            let base = bases.get(&path).copied();
            report.absorb(self.index_file(&path, base));
        }

        info!(
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            symbols = report.symbols_registered,
            total = self.symbols.len(),
            "Symbol refresh complete"
        );
        Ok(report)
    }

    /// Index every mapped file that has not been indexed yet.
    ///
    /// ## Panics
    ///
    /// Panics if the process's memory map cannot be read: discovery has no way to
    /// proceed without it. Use [`SymbolRegistry::try_refresh`] to handle that case.
    pub fn refresh(&mut self) -> RefreshReport
    {
        match self.try_refresh() {
            Ok(report) => report,
            Err(err) => panic!("symbol discovery cannot continue: {err}"),
        }
    }

    /// Index one file, typically a library the caller just loaded.
    ///
    /// Does nothing if the file was already indexed. The load base comes from
    /// the memory map when the file is mapped; otherwise symbols are registered
    /// at their link-time values.
    pub fn refresh_path(&mut self, path: impl AsRef<Path>) -> RefreshReport
    {
        let path = path.as_ref();
        if self.indexed_files.contains(path) {
            return RefreshReport::default();
        }
        let base = self
            .reader
            .load_bases()
            .ok()
            .and_then(|bases| bases.get(path).copied());
        self.index_file(path, base)
    }

    /// Register the reflection symbols of an in-memory image.
    ///
    /// Symbols of position-independent images are shifted by `load_base`.
    /// Returns the number of symbols registered, or `None` if `bytes` is not a
    /// 64-bit ELF image.
    pub fn index_image(&mut self, bytes: &[u8], load_base: Option<Address>) -> Option<usize>
    {
        let image = ElfImage::new(bytes);
        let header = image.header()?;
        let bias = if header.is_relocatable_image() {
            load_base.unwrap_or(Address::ZERO)
        } else {
            Address::ZERO
        };

        let mut count = 0;
        for symbol in image.reflect_symbols(bias) {
            self.register(symbol);
            count += 1;
        }
        Some(count)
    }

    fn index_file(&mut self, path: &Path, base: Option<Address>) -> RefreshReport
    {
        // Marked up front: a file that fails now fails the same way next time.
        self.indexed_files.insert(path.to_path_buf());

        let mut report = RefreshReport::default();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping unreadable mapped file");
                report.files_skipped = 1;
                return report;
            }
        };

        match self.index_image(&bytes, base) {
            Some(count) => {
                debug!(path = %path.display(), symbols = count, "Indexed image");
                report.files_indexed = 1;
                report.symbols_registered = count;
            }
            None => {
                warn!(path = %path.display(), "Skipping mapped file that is not a 64-bit ELF image");
                report.files_skipped = 1;
            }
        }
        report
    }

    /// Address of the symbol with exactly this linkage name and kind.
    pub fn lookup(&self, name: &str, kind: SymbolKind) -> Option<Address>
    {
        self.get(name, kind).map(|symbol| symbol.address)
    }

    /// Record of the symbol with exactly this linkage name and kind.
    pub fn get(&self, name: &str, kind: SymbolKind) -> Option<&ReflectSymbol>
    {
        self.symbols.get(&(kind, name.to_string()))
    }

    /// Like [`SymbolRegistry::get`], failing with [`ReflectError::SymbolNotFound`].
    ///
    /// ## Errors
    ///
    /// Returns `SymbolNotFound` when no such symbol is registered.
    pub fn require(&self, name: &str, kind: SymbolKind) -> ReflectResult<&ReflectSymbol>
    {
        self.get(name, kind).ok_or_else(|| ReflectError::SymbolNotFound {
            name: name.to_string(),
            kind,
        })
    }

    /// Symbol whose demangled path is `path`.
    ///
    /// Callables demangle with a trailing ` (...)`; overloads share that path, in
    /// which case the most recently registered one wins.
    pub fn find_path(&self, path: &str, kind: SymbolKind) -> Option<&ReflectSymbol>
    {
        let name = self.by_path.get(&(kind, path.to_string()))?;
        self.get(name, kind)
    }

    /// Free function with the given path and mangled signature.
    ///
    /// ## Errors
    ///
    /// Returns `SymbolNotFound` with the derived linkage name.
    pub fn find_function(&self, path: &str, params: &[&str], ret: &str) -> ReflectResult<&ReflectSymbol>
    {
        self.require(&function_symbol(path, params, ret), SymbolKind::Function)
    }

    /// Method of `class_path` with the given name and mangled signature.
    ///
    /// ## Errors
    ///
    /// Returns `SymbolNotFound` with the derived linkage name.
    pub fn find_method(
        &self,
        class_path: &str,
        method: &str,
        params: &[&str],
        ret: &str,
        mutable: bool,
    ) -> ReflectResult<&ReflectSymbol>
    {
        self.require(&method_symbol(class_path, method, params, ret, mutable), SymbolKind::Function)
    }

    /// Symbol whose `[address, address + size)` range contains `address`.
    pub fn symbol_at(&self, address: Address) -> Option<&ReflectSymbol>
    {
        let (_, key) = self.by_address.range(..=address).next_back()?;
        self.symbols.get(key).filter(|symbol| symbol.contains(address))
    }

    /// `true` if `path` has been indexed (successfully or not).
    pub fn is_indexed(&self, path: impl AsRef<Path>) -> bool
    {
        self.indexed_files.contains(path.as_ref())
    }

    /// Files indexed so far.
    pub fn indexed_files(&self) -> impl Iterator<Item = &Path>
    {
        self.indexed_files.iter().map(PathBuf::as_path)
    }

    /// All registered symbols, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ReflectSymbol>
    {
        self.symbols.values()
    }

    /// Registered symbols of one kind, sorted by address.
    pub fn symbols_of_kind(&self, kind: SymbolKind) -> Vec<&ReflectSymbol>
    {
        let mut symbols: Vec<_> = self.symbols.values().filter(|symbol| symbol.kind == kind).collect();
        symbols.sort_by_key(|symbol| symbol.address);
        symbols
    }

    /// Number of registered symbols.
    pub fn len(&self) -> usize
    {
        self.symbols.len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool
    {
        self.symbols.is_empty()
    }
}
