//! Tests for ELF image parsing and symbol classification

mod common;

use common::{ElfBuilder, STB_GLOBAL, STT_FUNC};
use yrt_reflect::symbols::elf::ElfImage;
use yrt_reflect::types::{Address, SymbolKind};

fn sample() -> ElfBuilder
{
    ElfBuilder::executable()
        .function("_Y4main3fooFZv", 0x40_1000, 32)
        .object("_Y4main4NodeVT", 0x60_2000, 16)
        .object("_Y4main4NodeTI", 0x60_2010, 16)
        .function("printf", 0x40_2000, 64)
        .function("_Y4main3barFZv", 0, 0)
        .symbol("_Y4main3bazFZv", STB_GLOBAL, 0x40_3000, 8)
        .object("counter", 0x60_3000, 8)
}

#[test]
fn test_sections_walk_header_table()
{
    let builder = sample();
    let bytes = builder.build();
    let image = ElfImage::new(&bytes);
    assert!(image.is_valid());

    let shoff = builder.section_table_offset() as u64;
    let header = image.header().unwrap();
    assert_eq!(header.section_offset, shoff);
    assert_eq!(header.section_count, 3);
    assert_eq!(header.section_entry_size, 64);

    let offsets: Vec<u64> = image.sections().map(|section| section.header_offset).collect();
    assert_eq!(offsets, [shoff, shoff + 64, shoff + 128]);
}

#[test]
fn test_sections_are_restartable()
{
    let bytes = sample().build();
    let image = ElfImage::new(&bytes);
    let first: Vec<_> = image.sections().collect();
    let second: Vec<_> = image.sections().collect();
    assert_eq!(first, second);
    assert_eq!(first.iter().filter(|section| section.is_symbol_table()).count(), 1);
}

#[test]
fn test_non_elf_buffer_is_invalid()
{
    let mut bytes = sample().build();
    bytes[0] = b'M';
    let image = ElfImage::new(&bytes);
    assert!(!image.is_valid());
    assert!(image.header().is_none());
    assert_eq!(image.reflect_symbols(Address::ZERO).count(), 0);
}

#[test]
fn test_truncated_section_table_stops_early()
{
    let builder = sample();
    let bytes = builder.build();
    let cut = builder.section_table_offset() + 64 + 10;
    let image = ElfImage::new(&bytes[..cut]);
    assert_eq!(image.sections().count(), 1);
}

#[test]
fn test_symbol_names_come_from_linked_string_table()
{
    let bytes = sample().build();
    let image = ElfImage::new(&bytes);
    let symtab = image.sections().find(|section| section.is_symbol_table()).unwrap();
    assert_eq!(symtab.link, 2);

    let names: Vec<&str> = image
        .symbols_of(&symtab)
        .filter_map(|(entry, base)| image.symbol_name(&entry, base))
        .filter(|name| !name.is_empty())
        .collect();
    assert_eq!(names.len(), 7);
    assert_eq!(names[0], "_Y4main3fooFZv");
    assert_eq!(names[6], "counter");
}

#[test]
fn test_reflect_symbols_are_classified()
{
    let bytes = sample().build();
    let image = ElfImage::new(&bytes);
    let symbols: Vec<_> = image.reflect_symbols(Address::ZERO).collect();

    assert_eq!(symbols.len(), 2);
    assert_eq!(symbols[0].kind, SymbolKind::Function);
    assert_eq!(symbols[0].name, "_Y4main3fooFZv");
    assert_eq!(symbols[0].demangled, "main::foo (...)");
    assert_eq!(symbols[0].address, Address::new(0x40_1000));
    assert_eq!(symbols[0].size, 32);

    assert_eq!(symbols[1].kind, SymbolKind::Vtable);
    assert_eq!(symbols[1].demangled, "main::Node");
}

#[test]
fn test_load_bias_is_applied()
{
    let bytes = ElfBuilder::shared_object()
        .function("_Y3lib4initFZv", 0x1100, 4)
        .build();
    let image = ElfImage::new(&bytes);
    assert!(image.header().unwrap().is_relocatable_image());

    let symbol = image.reflect_symbols(Address::new(0x7f00_0000_0000)).next().unwrap();
    assert_eq!(symbol.address, Address::new(0x7f00_0000_1100));
}

#[test]
fn test_function_bit_without_prefix_is_dropped()
{
    let bytes = ElfBuilder::executable()
        .symbol("_Y", STB_GLOBAL | STT_FUNC, 0x1000, 1)
        .build();
    assert_eq!(ElfImage::new(&bytes).reflect_symbols(Address::ZERO).count(), 0);
}
