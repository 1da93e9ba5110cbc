//! Tests for symbol discovery through a memory-map description

mod common;

use std::fs;

use common::{maps_line, ElfBuilder};
use yrt_reflect::error::ReflectError;
use yrt_reflect::symbols::{ProcessMapReader, SymbolRegistry};
use yrt_reflect::types::{Address, SymbolKind};

#[test]
fn test_refresh_indexes_mapped_images()
{
    let dir = tempfile::tempdir().unwrap();
    let app = ElfBuilder::executable()
        .function("_Y4main4mainFZv", 0x40_1000, 64)
        .object("_Y4main4NodeVT", 0x60_0000, 16)
        .write_to(dir.path(), "app");
    let text = dir.path().join("notes.txt");
    fs::write(&text, "not an ELF file").unwrap();
    let missing = dir.path().join("gone.so");

    let mut maps = String::new();
    maps.push_str(&maps_line(0x40_0000, 0, &app));
    maps.push_str(&maps_line(0x40_1000, 0x1000, &app));
    maps.push_str(&maps_line(0x7f00_0000_0000, 0, &text));
    maps.push_str(&maps_line(0x7f00_0001_0000, 0, &missing));
    maps.push_str("7ffc1b5e0000-7ffc1b601000 rw-p 00000000 00:00 0 [stack]\n");
    let maps_path = dir.path().join("maps");
    fs::write(&maps_path, maps).unwrap();

    let mut registry = SymbolRegistry::with_reader(ProcessMapReader::with_path(&maps_path));
    let report = registry.try_refresh().unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.symbols_registered, 2);

    assert_eq!(registry.lookup("_Y4main4NodeVT", SymbolKind::Vtable), Some(Address::new(0x60_0000)));
    assert_eq!(registry.lookup("_Y4main4mainFZv", SymbolKind::Function), Some(Address::new(0x40_1000)));
    assert!(registry.is_indexed(&app));
    assert!(registry.is_indexed(&text));
    assert!(registry.is_indexed(&missing));
    assert_eq!(registry.indexed_files().count(), 3);

    let again = registry.try_refresh().unwrap();
    assert_eq!(again.files_indexed + again.files_skipped, 0);
}

#[test]
fn test_shared_object_symbols_are_rebased()
{
    let dir = tempfile::tempdir().unwrap();
    let lib = ElfBuilder::shared_object()
        .object("_Y3lib5ShapeVT", 0x3000, 16)
        .write_to(dir.path(), "libshape.so");
    let maps_path = dir.path().join("maps");
    let maps = maps_line(0x7f12_0000_0000, 0, &lib) + &maps_line(0x7f12_0000_1000, 0x1000, &lib);
    fs::write(&maps_path, maps).unwrap();

    let mut registry = SymbolRegistry::with_reader(ProcessMapReader::with_path(&maps_path));
    registry.refresh();

    let symbol = registry.find_path("lib::Shape", SymbolKind::Vtable).unwrap();
    assert_eq!(symbol.address, Address::new(0x7f12_0000_3000));
    assert_eq!(registry.symbol_at(Address::new(0x7f12_0000_3008)).map(|s| s.name.as_str()), Some("_Y3lib5ShapeVT"));
}

#[test]
fn test_later_file_overwrites_same_symbol()
{
    let dir = tempfile::tempdir().unwrap();
    let first = ElfBuilder::executable()
        .object("_Y4main4NodeVT", 0x1000, 16)
        .write_to(dir.path(), "a.bin");
    let second = ElfBuilder::executable()
        .object("_Y4main4NodeVT", 0x2000, 16)
        .write_to(dir.path(), "b.bin");

    let mut registry = SymbolRegistry::isolated();
    registry.refresh_path(&first);
    registry.refresh_path(&second);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.lookup("_Y4main4NodeVT", SymbolKind::Vtable), Some(Address::new(0x2000)));
}

#[test]
fn test_refresh_path_indexes_once()
{
    let dir = tempfile::tempdir().unwrap();
    let lib = ElfBuilder::executable()
        .function("_Y3lib4loadFZv", 0x40_0100, 8)
        .write_to(dir.path(), "plugin.bin");

    let mut registry = SymbolRegistry::isolated();
    let report = registry.refresh_path(&lib);
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.symbols_registered, 1);
    assert!(registry.find_function("lib::load", &[], "v").is_ok());

    let again = registry.refresh_path(&lib);
    assert_eq!(again.files_indexed, 0);
}

#[test]
fn test_unreadable_memory_map_is_an_error()
{
    let mut registry = SymbolRegistry::with_reader(ProcessMapReader::with_path("/nonexistent/yrt/maps"));
    let err = registry.try_refresh().unwrap_err();
    assert!(matches!(err, ReflectError::MemoryMapUnavailable { .. }));
    assert!(err.to_string().contains("/nonexistent/yrt/maps"));
}

#[test]
#[should_panic(expected = "symbol discovery cannot continue")]
fn test_refresh_panics_without_memory_map()
{
    let mut registry = SymbolRegistry::with_reader(ProcessMapReader::with_path("/nonexistent/yrt/maps"));
    registry.refresh();
}

#[cfg(target_os = "linux")]
#[test]
fn test_own_process_maps()
{
    let files = ProcessMapReader::new().list_mapped_files().unwrap();
    assert!(!files.is_empty());
    assert!(files.iter().all(|file| !file.to_string_lossy().starts_with('[')));

    let mut registry = SymbolRegistry::new();
    let report = registry.try_refresh().unwrap();
    assert!(report.files_indexed >= 1);
    assert!(files.iter().all(|file| registry.is_indexed(file)));
}

#[cfg(target_os = "linux")]
#[test]
fn test_global_registry_is_shared()
{
    let first = SymbolRegistry::global() as *const _;
    let second = SymbolRegistry::global() as *const _;
    assert_eq!(first, second);
    assert!(SymbolRegistry::global().lock().is_ok());
}
