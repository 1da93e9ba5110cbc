//! Tests for plain data types

use yrt_reflect::symbols::make_symbol_name;
use yrt_reflect::symbols::maps::parse_line;
use yrt_reflect::types::{Address, ReflectSymbol, SymbolKind, SymbolLanguage};

#[test]
fn test_address_from_u64()
{
    let address = Address::from(0x1000_u64);
    assert_eq!(address.value(), 0x1000);
    let raw: u64 = address.into();
    assert_eq!(raw, 0x1000);
}

#[test]
fn test_address_arithmetic()
{
    let base = Address::new(0x1000);
    assert_eq!(base + 0x10, Address::new(0x1010));
    assert_eq!(base - 0x10, Address::new(0x0ff0));
    assert_eq!(base.checked_sub(0x2000), None);
    assert_eq!(Address::new(u64::MAX).saturating_add(1), Address::new(u64::MAX));
    assert_eq!(Address::new(0x1010).offset_from(base), Some(0x10));
    assert_eq!(base.offset_from(Address::new(0x1010)), None);
}

#[test]
fn test_address_null()
{
    assert!(Address::ZERO.is_null());
    assert!(Address::default().is_null());
    assert!(!Address::new(1).is_null());
}

#[test]
fn test_address_display()
{
    assert_eq!(Address::new(0xdead_beef).to_string(), "0x00000000deadbeef");
}

#[test]
fn test_symbol_kind_display()
{
    assert_eq!(SymbolKind::Function.to_string(), "function");
    assert_eq!(SymbolKind::Vtable.to_string(), "vtable");
}

#[test]
fn test_reflect_symbol_contains()
{
    let symbol = ReflectSymbol {
        kind: SymbolKind::Function,
        address: Address::new(0x40_1000),
        name: "_Y4main3fooFZv".to_string(),
        demangled: "main::foo (...)".to_string(),
        size: 0x20,
    };
    assert!(symbol.contains(Address::new(0x40_1000)));
    assert!(symbol.contains(Address::new(0x40_101f)));
    assert!(!symbol.contains(Address::new(0x40_1020)));
    assert!(!symbol.contains(Address::new(0x40_0fff)));
    assert!(symbol.to_string().contains("main::foo (...)"));
}

#[test]
fn test_symbol_name_languages()
{
    let name = make_symbol_name("_Y4core5array10OutOfArrayVT".to_string());
    assert_eq!(name.language(), SymbolLanguage::Ymir);
    assert_eq!(name.demangled(), Some("core::array::OutOfArray"));
    assert_eq!(name.raw(), "_Y4core5array10OutOfArrayVT");

    let plain = make_symbol_name("main".to_string());
    assert_eq!(plain.language(), SymbolLanguage::C);
    assert_eq!(plain.demangled(), None);
    assert_eq!(plain.to_string(), "main");
}

#[test]
fn test_map_entry_pseudo_paths()
{
    let heap = parse_line("55d0c1e4f000-55d0c1e70000 rw-p 00000000 00:00 0 [heap]").unwrap();
    assert!(heap.is_pseudo());
    assert_eq!(heap.file(), None);

    let lib = parse_line("7f3a5d200000-7f3a5d228000 r--p 00000000 fd:01 2211 /usr/lib/libc.so.6").unwrap();
    assert!(!lib.is_pseudo());
    assert!(lib.file().is_some());
}
