//! # Process Maps
//!
//! Enumerates the files mapped into a process by reading its memory-map
//! description (`/proc/<pid>/maps` on Linux).
//!
//! Each line of the map has the form
//!
//! ```text
//! 55d0c0a00000-55d0c0a2c000 r--p 00000000 fd:01 1835 /usr/bin/app
//! ^start       ^end         ^perm ^offset ^dev  ^inode ^path (optional)
//! ```
//!
//! Anonymous mappings have no path, and kernel pseudo-mappings such as
//! `[heap]`, `[stack]` or `[vdso]` have a bracketed one; neither backs a file
//! that could be indexed.
//!
//! Every call re-reads the description: libraries can be mapped at any time.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_MAPS_PATH;
use crate::error::{ReflectError, ReflectResult};
use crate::types::Address;

/// Number of fixed fields before the path.
const FIXED_FIELDS: usize = 5;

/// One line of a memory-map description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry
{
    /// First address of the mapping
    pub start: Address,
    /// One past the last address of the mapping
    pub end: Address,
    /// Permission string (e.g. `r-xp`)
    pub permissions: String,
    /// Offset of the mapping inside the backing file
    pub offset: u64,
    /// Backing path, if the line has one
    pub path: Option<String>,
}

impl MapEntry
{
    /// `true` for kernel pseudo-mappings like `[heap]`.
    pub fn is_pseudo(&self) -> bool
    {
        self.path.as_deref().is_some_and(|path| path.starts_with('['))
    }

    /// Path of the backing file, if this mapping is backed by one.
    pub fn file(&self) -> Option<&Path>
    {
        match self.path.as_deref() {
            Some(path) if !path.starts_with('[') => Some(Path::new(path)),
            _ => None,
        }
    }
}

/// Parse one line of a memory-map description.
///
/// Returns `None` for lines that do not carry the five fixed fields.
/// Whitespace inside a path is collapsed to single spaces.
pub fn parse_line(line: &str) -> Option<MapEntry>
{
    let mut fields = line.split_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    let permissions = fields.next()?.to_string();
    let offset = u64::from_str_radix(fields.next()?, 16).ok()?;
    // device, inode
    fields.next()?;
    fields.next()?;

    let rest: Vec<&str> = fields.collect();
    let path = (!rest.is_empty()).then(|| rest.join(" "));

    Some(MapEntry {
        start: Address::new(start),
        end: Address::new(end),
        permissions,
        offset,
        path,
    })
}

/// Parse a whole memory-map description, skipping malformed lines.
///
/// ## Errors
///
/// Returns the first I/O error of the underlying reader.
pub fn parse<R: BufRead>(reader: R) -> io::Result<Vec<MapEntry>>
{
    let mut entries = Vec::new();
    for line in reader.lines() {
        if let Some(entry) = parse_line(&line?) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Reads the memory-map description of a process.
///
/// ## Example
///
/// ```rust,no_run
/// use yrt_reflect::symbols::maps::ProcessMapReader;
///
/// let files = ProcessMapReader::new().list_mapped_files()?;
/// for file in files {
///     println!("{}", file.display());
/// }
/// # Ok::<(), yrt_reflect::error::ReflectError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMapReader
{
    path: PathBuf,
}

impl Default for ProcessMapReader
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl ProcessMapReader
{
    /// Reader for the calling process.
    #[must_use]
    pub fn new() -> Self
    {
        Self::with_path(DEFAULT_MAPS_PATH)
    }

    /// Reader for another process, by pid.
    #[must_use]
    pub fn for_pid(pid: u32) -> Self
    {
        Self::with_path(format!("/proc/{pid}/maps"))
    }

    /// Reader over an arbitrary map description file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self
    {
        Self { path: path.into() }
    }

    /// Path of the map description.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Read and parse every line of the map description.
    ///
    /// On platforms without `/proc`, the calling process's own description
    /// reads as empty: discovery is inert there.
    ///
    /// ## Errors
    ///
    /// Returns [`ReflectError::MemoryMapUnavailable`] if the description cannot be
    /// opened or read.
    pub fn read_entries(&self) -> ReflectResult<Vec<MapEntry>>
    {
        if !cfg!(target_os = "linux") && self.path == Path::new(DEFAULT_MAPS_PATH) {
            return Ok(Vec::new());
        }

        let unavailable = |source| ReflectError::MemoryMapUnavailable {
            path: self.path.clone(),
            source,
        };
        let file = File::open(&self.path).map_err(unavailable)?;
        parse(BufReader::new(file)).map_err(unavailable)
    }

    /// Distinct files backing at least one mapping, pseudo-mappings excluded.
    ///
    /// ## Errors
    ///
    /// See [`ProcessMapReader::read_entries`].
    pub fn list_mapped_files(&self) -> ReflectResult<BTreeSet<PathBuf>>
    {
        Ok(mapped_files(&self.read_entries()?))
    }

    /// Load base of every mapped file: the lowest start of a mapping at file offset 0.
    ///
    /// ## Errors
    ///
    /// See [`ProcessMapReader::read_entries`].
    pub fn load_bases(&self) -> ReflectResult<BTreeMap<PathBuf, Address>>
    {
        Ok(load_bases(&self.read_entries()?))
    }
}

/// Distinct backing files of `entries`.
pub fn mapped_files(entries: &[MapEntry]) -> BTreeSet<PathBuf>
{
    entries
        .iter()
        .filter_map(MapEntry::file)
        .map(Path::to_path_buf)
        .collect()
}

/// Load bases of the backing files of `entries`.
pub fn load_bases(entries: &[MapEntry]) -> BTreeMap<PathBuf, Address>
{
    let mut bases: BTreeMap<PathBuf, Address> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| entry.offset == 0) {
        if let Some(file) = entry.file() {
            bases
                .entry(file.to_path_buf())
                .and_modify(|base| *base = (*base).min(entry.start))
                .or_insert(entry.start);
        }
    }
    bases
}
