//! # ELF Image
//!
//! Zero-copy views over the bytes of one 64-bit little-endian ELF file.
//!
//! Fields are read at their fixed byte offsets in the ELF64 layout instead of
//! casting the buffer to packed structs, so the parser works on any host and on
//! truncated or hostile input: every read is bounds checked and a short read
//! simply ends the iteration that needed it.
//!
//! ## Layout reference
//!
//! | structure      | field         | offset | width |
//! |----------------|---------------|--------|-------|
//! | `Elf64_Ehdr`   | `e_ident`     | 0      | 16    |
//! |                | `e_type`      | 16     | 2     |
//! |                | `e_entry`     | 24     | 8     |
//! |                | `e_shoff`     | 40     | 8     |
//! |                | `e_shentsize` | 58     | 2     |
//! |                | `e_shnum`     | 60     | 2     |
//! | `Elf64_Shdr`   | `sh_type`     | 4      | 4     |
//! |                | `sh_flags`    | 8      | 8     |
//! |                | `sh_offset`   | 24     | 8     |
//! |                | `sh_size`     | 32     | 8     |
//! |                | `sh_link`     | 40     | 4     |
//! |                | `sh_info`     | 44     | 4     |
//! | `Elf64_Sym`    | `st_name`     | 0      | 4     |
//! |                | `st_info`     | 4      | 1     |
//! |                | `st_value`    | 8      | 8     |
//! |                | `st_size`     | 16     | 8     |
//!
//! See: [System V ABI, ELF-64 Object File Format](https://uclibc.org/docs/elf-64-gen.pdf)

use object::elf::{ELFCLASS64, ELFMAG, ET_DYN, SHT_DYNSYM, SHT_SYMTAB, STT_FUNC, STT_OBJECT};

use super::demangle::{demangle, MANGLE_PREFIX, VTABLE_SUFFIX};
use crate::types::{Address, ReflectSymbol, SymbolKind};

/// Index of the class byte inside `e_ident`.
const EI_CLASS: usize = 4;

/// Size of the ELF64 file header.
pub const EHDR_SIZE: usize = 64;

/// Size of one `Elf64_Sym` entry.
pub const SYM_ENTRY_SIZE: u64 = 24;

/// Header fields needed to walk the section table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader
{
    /// `e_type` (`ET_EXEC`, `ET_DYN`, ...)
    pub file_type: u16,
    /// `e_entry`
    pub entry: u64,
    /// `e_shoff`: file offset of the section-header table
    pub section_offset: u64,
    /// `e_shentsize`: width of one section-header entry
    pub section_entry_size: u16,
    /// `e_shnum`: number of section-header entries
    pub section_count: u16,
}

impl ElfHeader
{
    /// `true` for position-independent images whose symbol values are relative to the load base.
    pub fn is_relocatable_image(&self) -> bool
    {
        self.file_type == ET_DYN
    }
}

/// One section-header entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader
{
    /// Position of this entry in the section-header table
    pub index: u16,
    /// File offset the entry was read from
    pub header_offset: u64,
    /// `sh_type`
    pub kind: u32,
    /// `sh_flags`
    pub flags: u64,
    /// `sh_offset`: file offset of the section contents
    pub offset: u64,
    /// `sh_size`: size of the section contents in bytes
    pub size: u64,
    /// `sh_link`: index of the associated section (the string table for symbol tables)
    pub link: u32,
    /// `sh_info`
    pub info: u32,
}

impl SectionHeader
{
    /// `true` for `SHT_SYMTAB` and `SHT_DYNSYM` sections.
    pub fn is_symbol_table(&self) -> bool
    {
        self.kind == SHT_SYMTAB || self.kind == SHT_DYNSYM
    }
}

/// One symbol-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry
{
    /// `st_name`: offset of the name in the linked string table
    pub name_offset: u32,
    /// `st_info`: binding (high nibble) and type (low nibble)
    pub info: u8,
    /// `st_value`
    pub value: u64,
    /// `st_size`
    pub size: u64,
}

impl SymbolEntry
{
    fn symbol_type(&self) -> u8
    {
        self.info & 0x0f
    }

    /// Symbol type is exactly `STT_FUNC`.
    ///
    /// `STT_SECTION` (3) and `STT_TLS` (6) share bits with `STT_FUNC` and must
    /// not match.
    pub fn is_function(&self) -> bool
    {
        self.symbol_type() == STT_FUNC
    }

    /// Symbol type is exactly `STT_OBJECT`.
    pub fn is_object(&self) -> bool
    {
        self.symbol_type() == STT_OBJECT
    }
}

/// Borrowed view over the bytes of one ELF file.
#[derive(Debug, Clone, Copy)]
pub struct ElfImage<'data>
{
    data: &'data [u8],
}

impl<'data> ElfImage<'data>
{
    /// Wrap a byte buffer. Nothing is parsed until a method asks for it.
    pub fn new(data: &'data [u8]) -> Self
    {
        Self { data }
    }

    /// Raw bytes of the image.
    pub fn data(&self) -> &'data [u8]
    {
        self.data
    }

    /// `true` if the buffer starts with the ELF magic and declares the 64-bit class.
    ///
    /// Callers must not walk sections of an image for which this is `false`.
    pub fn is_valid(&self) -> bool
    {
        self.data.len() >= EHDR_SIZE && self.data[..ELFMAG.len()] == ELFMAG && self.data[EI_CLASS] == ELFCLASS64
    }

    /// Parse the header fields, or `None` for an invalid image.
    pub fn header(&self) -> Option<ElfHeader>
    {
        if !self.is_valid() {
            return None;
        }
        Some(ElfHeader {
            file_type: self.read_u16(16)?,
            entry: self.read_u64(24)?,
            section_offset: self.read_u64(40)?,
            section_entry_size: self.read_u16(58)?,
            section_count: self.read_u16(60)?,
        })
    }

    /// Walk the section-header table.
    ///
    /// The iterator reads `e_shnum` entries of `e_shentsize` bytes starting at
    /// `e_shoff` and stops early at the first entry that does not fit in the
    /// buffer. Call again to restart.
    pub fn sections(&self) -> Sections<'data>
    {
        let header = self.header();
        Sections {
            image: *self,
            base: header.map_or(0, |h| h.section_offset),
            stride: header.map_or(0, |h| u64::from(h.section_entry_size)),
            count: header.map_or(0, |h| h.section_count),
            next: 0,
        }
    }

    /// Section-header entry at `index`.
    pub fn section(&self, index: u32) -> Option<SectionHeader>
    {
        let header = self.header()?;
        let index = u16::try_from(index).ok().filter(|index| *index < header.section_count)?;
        let offset = header
            .section_offset
            .checked_add(u64::from(index) * u64::from(header.section_entry_size))?;
        self.read_section(index, offset)
    }

    /// Walk the symbols of a symbol-table section.
    ///
    /// Each item pairs the entry with the file offset of the linked string table,
    /// against which [`ElfImage::symbol_name`] resolves `name_offset`. Sections that
    /// are not symbol tables, or whose string table is missing, yield nothing.
    pub fn symbols_of(&self, section: &SectionHeader) -> Symbols<'data>
    {
        let name_table_base = if section.is_symbol_table() {
            self.section(section.link).map(|strtab| strtab.offset)
        } else {
            None
        };
        Symbols {
            image: *self,
            base: section.offset,
            count: name_table_base.map_or(0, |_| section.size / SYM_ENTRY_SIZE),
            name_table_base: name_table_base.unwrap_or(0),
            next: 0,
        }
    }

    /// Null-terminated name of `entry` in the string table at `name_table_base`.
    pub fn symbol_name(&self, entry: &SymbolEntry, name_table_base: u64) -> Option<&'data str>
    {
        let start = usize::try_from(name_table_base.checked_add(u64::from(entry.name_offset))?).ok()?;
        let tail = self.data.get(start..)?;
        let len = tail.iter().position(|byte| *byte == 0)?;
        std::str::from_utf8(&tail[..len]).ok()
    }

    /// Classified reflection symbols of every symbol table in the image.
    ///
    /// `load_bias` is added to each symbol value; pass [`Address::ZERO`] for images
    /// mapped at their link-time addresses.
    pub fn reflect_symbols(&self, load_bias: Address) -> impl Iterator<Item = ReflectSymbol> + 'data
    {
        let image = *self;
        self.sections()
            .filter(SectionHeader::is_symbol_table)
            .flat_map(move |section| image.symbols_of(&section))
            .filter_map(move |(entry, name_table_base)| {
                let name = image.symbol_name(&entry, name_table_base)?;
                let kind = classify(name, &entry)?;
                Some(ReflectSymbol {
                    kind,
                    address: load_bias + entry.value,
                    name: name.to_string(),
                    demangled: demangle(name).into_owned(),
                    size: entry.size,
                })
            })
    }

    fn read_section(&self, index: u16, offset: u64) -> Option<SectionHeader>
    {
        let at = usize::try_from(offset).ok()?;
        Some(SectionHeader {
            index,
            header_offset: offset,
            kind: self.read_u32(at.checked_add(4)?)?,
            flags: self.read_u64(at.checked_add(8)?)?,
            offset: self.read_u64(at.checked_add(24)?)?,
            size: self.read_u64(at.checked_add(32)?)?,
            link: self.read_u32(at.checked_add(40)?)?,
            info: self.read_u32(at.checked_add(44)?)?,
        })
    }

    fn read_symbol(&self, offset: u64) -> Option<SymbolEntry>
    {
        let at = usize::try_from(offset).ok()?;
        Some(SymbolEntry {
            name_offset: self.read_u32(at)?,
            info: *self.data.get(at.checked_add(4)?)?,
            value: self.read_u64(at.checked_add(8)?)?,
            size: self.read_u64(at.checked_add(16)?)?,
        })
    }

    fn read_array<const N: usize>(&self, at: usize) -> Option<[u8; N]>
    {
        self.data.get(at..at.checked_add(N)?)?.try_into().ok()
    }

    fn read_u16(&self, at: usize) -> Option<u16>
    {
        self.read_array(at).map(u16::from_le_bytes)
    }

    fn read_u32(&self, at: usize) -> Option<u32>
    {
        self.read_array(at).map(u32::from_le_bytes)
    }

    fn read_u64(&self, at: usize) -> Option<u64>
    {
        self.read_array(at).map(u64::from_le_bytes)
    }
}

/// Iterator over section-header entries, see [`ElfImage::sections`].
#[derive(Debug, Clone)]
pub struct Sections<'data>
{
    image: ElfImage<'data>,
    base: u64,
    stride: u64,
    count: u16,
    next: u16,
}

impl Iterator for Sections<'_>
{
    type Item = SectionHeader;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        let offset = self.base.checked_add(u64::from(index) * self.stride);
        let section = offset.and_then(|offset| self.image.read_section(index, offset));
        // A truncated table ends the walk.
        self.next = if section.is_some() { index + 1 } else { self.count };
        section
    }
}

/// Iterator over `(entry, name_table_base)` pairs, see [`ElfImage::symbols_of`].
#[derive(Debug, Clone)]
pub struct Symbols<'data>
{
    image: ElfImage<'data>,
    base: u64,
    count: u64,
    name_table_base: u64,
    next: u64,
}

impl Iterator for Symbols<'_>
{
    type Item = (SymbolEntry, u64);

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.next >= self.count {
            return None;
        }
        let offset = self.base.checked_add(self.next * SYM_ENTRY_SIZE);
        let entry = offset.and_then(|offset| self.image.read_symbol(offset));
        self.next = if entry.is_some() { self.next + 1 } else { self.count };
        entry.map(|entry| (entry, self.name_table_base))
    }
}

/// Decide whether a resolved symbol is a reflection symbol.
///
/// - undefined symbols (value 0) and symbols whose type is neither `STT_FUNC`
///   nor `STT_OBJECT` are dropped;
/// - functions need the compiler prefix and a name longer than the prefix;
/// - objects are kept only as vtables: prefix, vtable suffix, and room for both.
pub fn classify(name: &str, entry: &SymbolEntry) -> Option<SymbolKind>
{
    if entry.value == 0 || !(entry.is_function() || entry.is_object()) {
        return None;
    }

    if entry.is_function() {
        (name.len() > MANGLE_PREFIX.len() && name.starts_with(MANGLE_PREFIX)).then_some(SymbolKind::Function)
    } else {
        (name.len() > MANGLE_PREFIX.len() + VTABLE_SUFFIX.len()
            && name.starts_with(MANGLE_PREFIX)
            && name.ends_with(VTABLE_SUFFIX))
        .then_some(SymbolKind::Vtable)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn entry(info: u8, value: u64) -> SymbolEntry
    {
        SymbolEntry {
            name_offset: 0,
            info,
            value,
            size: 8,
        }
    }

    #[test]
    fn rejects_non_elf_magic()
    {
        let mut bytes = vec![0u8; EHDR_SIZE];
        bytes[..4].copy_from_slice(b"MZ\x90\x00");
        let image = ElfImage::new(&bytes);
        assert!(!image.is_valid());
        assert!(image.header().is_none());
        assert_eq!(image.sections().count(), 0);
    }

    #[test]
    fn rejects_32_bit_class()
    {
        let mut bytes = vec![0u8; EHDR_SIZE];
        bytes[..4].copy_from_slice(&ELFMAG);
        bytes[EI_CLASS] = 1;
        assert!(!ElfImage::new(&bytes).is_valid());
    }

    #[test]
    fn rejects_short_buffer()
    {
        assert!(!ElfImage::new(&ELFMAG).is_valid());
        assert!(!ElfImage::new(&[]).is_valid());
    }

    #[test]
    fn classifies_functions()
    {
        let func = entry(STT_FUNC, 0x1000);
        assert_eq!(classify("_Y4main3fooFZv", &func), Some(SymbolKind::Function));
        assert_eq!(classify("_Y", &func), None);
        assert_eq!(classify("main", &func), None);
        assert_eq!(classify("_Y4main3fooFZv", &entry(STT_FUNC, 0)), None);
    }

    #[test]
    fn classifies_vtables()
    {
        let object = entry(STT_OBJECT, 0x2000);
        assert_eq!(classify("_Y4main4NodeVT", &object), Some(SymbolKind::Vtable));
        assert_eq!(classify("_Y4main4NodeTI", &object), None);
        assert_eq!(classify("_YVT", &object), None);
        assert_eq!(classify("_YxVT", &object), Some(SymbolKind::Vtable));
        assert_eq!(classify("stdout", &object), None);
    }

    #[test]
    fn binding_bits_are_ignored()
    {
        // STB_GLOBAL << 4 | STT_FUNC
        let global = entry(0x12, 0x1000);
        assert_eq!(classify("_Y4main3fooFZv", &global), Some(SymbolKind::Function));
        // STT_NOTYPE / STT_FILE
        assert_eq!(classify("_Y4main3fooFZv", &entry(0x10, 0x1000)), None);
        assert_eq!(classify("_Y4main3fooFZv", &entry(0x04, 0x1000)), None);
    }

    #[test]
    fn section_and_tls_symbols_are_not_functions()
    {
        // STT_SECTION and STT_TLS carry the STT_FUNC bit
        assert_eq!(classify("_Y4main3fooFZv", &entry(0x03, 0x1000)), None);
        assert_eq!(classify("_Y4main5cacheVT", &entry(0x06, 0x1000)), None);
        assert_eq!(classify("_Y4main5cacheVT", &entry(0x16, 0x1000)), None);
        assert!(!entry(0x06, 0x1000).is_function());
        assert!(!entry(0x03, 0x1000).is_object());
    }
}
