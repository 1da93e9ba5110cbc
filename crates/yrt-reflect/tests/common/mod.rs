//! Shared fixtures: minimal ELF64 images built byte by byte.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STB_GLOBAL: u8 = 1 << 4;

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;

struct TestSymbol
{
    name: String,
    info: u8,
    value: u64,
    size: u64,
}

/// Builder for an ELF64 little-endian image with one symbol table.
///
/// ```text
/// 0x00  Elf64_Ehdr
/// 0x40  .strtab
/// ....  .symtab (8-aligned, null symbol first)
/// ....  section headers: [null, .symtab (link = 2), .strtab]
/// ```
pub struct ElfBuilder
{
    file_type: u16,
    symbols: Vec<TestSymbol>,
}

impl ElfBuilder
{
    pub fn executable() -> Self
    {
        Self {
            file_type: ET_EXEC,
            symbols: Vec::new(),
        }
    }

    pub fn shared_object() -> Self
    {
        Self {
            file_type: ET_DYN,
            symbols: Vec::new(),
        }
    }

    pub fn symbol(mut self, name: &str, info: u8, value: u64, size: u64) -> Self
    {
        self.symbols.push(TestSymbol {
            name: name.to_string(),
            info,
            value,
            size,
        });
        self
    }

    pub fn function(self, name: &str, value: u64, size: u64) -> Self
    {
        self.symbol(name, STB_GLOBAL | STT_FUNC, value, size)
    }

    pub fn object(self, name: &str, value: u64, size: u64) -> Self
    {
        self.symbol(name, STB_GLOBAL | STT_OBJECT, value, size)
    }

    /// Offset of the section-header table in the built image.
    pub fn section_table_offset(&self) -> usize
    {
        let (_, symtab_offset, symtab_size) = self.layout();
        align8(symtab_offset + symtab_size)
    }

    fn layout(&self) -> (Vec<u8>, usize, usize)
    {
        let mut strtab = vec![0u8];
        for symbol in &self.symbols {
            strtab.extend_from_slice(symbol.name.as_bytes());
            strtab.push(0);
        }
        let symtab_offset = align8(64 + strtab.len());
        let symtab_size = (self.symbols.len() + 1) * SYM_SIZE;
        (strtab, symtab_offset, symtab_size)
    }

    pub fn build(&self) -> Vec<u8>
    {
        let (strtab, symtab_offset, symtab_size) = self.layout();
        let shoff = align8(symtab_offset + symtab_size);
        let mut image = vec![0u8; shoff + 3 * SHDR_SIZE];

        // Elf64_Ehdr
        image[..4].copy_from_slice(b"\x7fELF");
        image[4] = 2; // ELFCLASS64
        image[5] = 1; // ELFDATA2LSB
        image[6] = 1; // EV_CURRENT
        put_u16(&mut image, 16, self.file_type);
        put_u16(&mut image, 18, 62); // EM_X86_64
        put_u32(&mut image, 20, 1);
        put_u64(&mut image, 40, shoff as u64);
        put_u16(&mut image, 52, 64);
        put_u16(&mut image, 58, SHDR_SIZE as u16);
        put_u16(&mut image, 60, 3);

        image[64..64 + strtab.len()].copy_from_slice(&strtab);

        let mut name_offset = 1u32;
        for (index, symbol) in self.symbols.iter().enumerate() {
            let at = symtab_offset + (index + 1) * SYM_SIZE;
            put_u32(&mut image, at, name_offset);
            image[at + 4] = symbol.info;
            put_u16(&mut image, at + 6, 1);
            put_u64(&mut image, at + 8, symbol.value);
            put_u64(&mut image, at + 16, symbol.size);
            name_offset += symbol.name.len() as u32 + 1;
        }

        let symtab = shoff + SHDR_SIZE;
        put_u32(&mut image, symtab + 4, SHT_SYMTAB);
        put_u64(&mut image, symtab + 24, symtab_offset as u64);
        put_u64(&mut image, symtab + 32, symtab_size as u64);
        put_u32(&mut image, symtab + 40, 2);
        put_u32(&mut image, symtab + 44, 1);
        put_u64(&mut image, symtab + 56, SYM_SIZE as u64);

        let strtab_header = shoff + 2 * SHDR_SIZE;
        put_u32(&mut image, strtab_header + 4, SHT_STRTAB);
        put_u64(&mut image, strtab_header + 24, 64);
        put_u64(&mut image, strtab_header + 32, strtab.len() as u64);

        image
    }

    /// Write the image to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf
    {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("write ELF fixture");
        path
    }
}

/// One line of a `/proc/<pid>/maps` description backed by `path`.
pub fn maps_line(start: u64, offset: u64, path: &Path) -> String
{
    format!(
        "{start:012x}-{:012x} r--p {offset:08x} fd:01 4242 {}\n",
        start + 0x1000,
        path.display()
    )
}

fn align8(value: usize) -> usize
{
    (value + 7) & !7
}

fn put_u16(image: &mut [u8], at: usize, value: u16)
{
    image[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], at: usize, value: u32)
{
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(image: &mut [u8], at: usize, value: u64)
{
    image[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
