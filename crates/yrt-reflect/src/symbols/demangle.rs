//! Symbol name codec.
//!
//! The companion compiler encodes a namespaced path such as `core::array::OutOfArray`
//! into a flat linkage name:
//!
//! ```text
//! _Y 4core 5array 10OutOfArray VT
//! ^^ ------------------------- ^^
//! |  <length><identifier>...   suffix (VT = vtable, TI = type info, F... = callable)
//! prefix
//! ```
//!
//! [`demangle`] turns such a name back into `core::array::OutOfArray`, appending
//! ` (...)` when the segments are followed by the callable marker `F`. Names that
//! do not start with `_Y` pass through untouched, so foreign symbols never cause
//! an error.
//!
//! [`mangle`] is the inverse for plain paths, and the `*_symbol` helpers build the
//! complete linkage names the compiler emits for vtables, type infos, default
//! constructors, functions and methods.

use std::borrow::Cow;

use rustc_demangle::try_demangle;
use smallvec::SmallVec;

use crate::types::{SymbolLanguage, SymbolName};

/// Two-byte prefix of every compiler-emitted linkage name.
pub const MANGLE_PREFIX: &str = "_Y";

/// Suffix closing a vtable object name.
pub const VTABLE_SUFFIX: &str = "VT";

/// Suffix closing a type-info object name.
pub const TYPEINFO_SUFFIX: &str = "TI";

/// Marker following the path segments of a callable.
pub const CALLABLE_MARKER: u8 = b'F';

/// Appended to the demangled path of a callable.
pub const PARAMS_MARKER: &str = " (...)";

const PATH_SEPARATOR: &str = "::";

/// Decode a linkage name into a `::`-joined path.
///
/// Returns the input unchanged when it does not carry the compiler prefix, when no
/// segment can be decoded, or when a segment length runs past the end of the name.
///
/// A segment that starts with a digit is indistinguishable from its own length
/// prefix; see [`mangle`].
///
/// ```rust
/// use yrt_reflect::symbols::demangle::demangle;
///
/// assert_eq!(demangle("_Y4core5array10OutOfArrayVT"), "core::array::OutOfArray");
/// assert_eq!(demangle("_Y4main3fooFZv"), "main::foo (...)");
/// assert_eq!(demangle("malloc"), "malloc");
/// ```
pub fn demangle(name: &str) -> Cow<'_, str>
{
    let Some(body) = name.strip_prefix(MANGLE_PREFIX) else {
        return Cow::Borrowed(name);
    };
    if body.is_empty() {
        return Cow::Borrowed(name);
    }

    let bytes = body.as_bytes();
    let mut segments: SmallVec<[&str; 8]> = SmallVec::new();
    let mut cursor = 0;
    loop {
        let digits = bytes[cursor..].iter().take_while(|b| b.is_ascii_digit()).count();
        let Some(len) = body[cursor..cursor + digits].parse::<usize>().ok().filter(|len| *len != 0) else {
            break;
        };
        let start = cursor + digits;
        let Some(segment) = start.checked_add(len).and_then(|end| body.get(start..end)) else {
            return Cow::Borrowed(name);
        };
        segments.push(segment);
        cursor = start + len;
    }

    if segments.is_empty() {
        return Cow::Borrowed(name);
    }

    let mut path = segments.join(PATH_SEPARATOR);
    if bytes.get(cursor) == Some(&CALLABLE_MARKER) {
        path.push_str(PARAMS_MARKER);
    }
    Cow::Owned(path)
}

/// Encode a `::`-joined path as concatenated `<length><segment>` pairs.
///
/// Empty segments (a leading, trailing or doubled separator) are dropped.
///
/// Segments must not start with an ASCII digit: the length prefix is read
/// greedily, so `9lives` encodes as `69lives` and decodes as a 69-byte
/// segment. Compiler-emitted identifiers never start with a digit.
///
/// ```rust
/// use yrt_reflect::symbols::demangle::{demangle, mangle};
///
/// let mangled = mangle("core::array::OutOfArray");
/// assert_eq!(mangled, "4core5array10OutOfArray");
/// assert_eq!(demangle(&format!("_Y{mangled}")), "core::array::OutOfArray");
/// ```
pub fn mangle(path: &str) -> String
{
    let mut out = String::with_capacity(path.len() + 8);
    for segment in path.split(PATH_SEPARATOR).filter(|segment| !segment.is_empty()) {
        out.push_str(&segment.len().to_string());
        out.push_str(segment);
    }
    out
}

/// Linkage name of the vtable of the class at `class_path`.
pub fn vtable_symbol(class_path: &str) -> String
{
    format!("{MANGLE_PREFIX}{}{VTABLE_SUFFIX}", mangle(class_path))
}

/// Linkage name of the type-info object of the class at `class_path`.
pub fn typeinfo_symbol(class_path: &str) -> String
{
    format!("{MANGLE_PREFIX}{}{TYPEINFO_SUFFIX}", mangle(class_path))
}

/// Linkage name of the parameterless constructor `self` of the class at `class_path`.
///
/// The constructor takes a mutable reference to the class and returns it, which the
/// compiler spells `xP<len + 1>x<class>` on both sides of the `Z` separator.
///
/// ```rust
/// use yrt_reflect::symbols::demangle::constructor_symbol;
///
/// assert_eq!(
///     constructor_symbol("core::array::OutOfArray"),
///     "_Y4core5array10OutOfArray4selfFxP24x4core5array10OutOfArrayZxP24x4core5array10OutOfArray"
/// );
/// ```
pub fn constructor_symbol(class_path: &str) -> String
{
    let class = mangle(class_path);
    let reference = format!("xP{}x{class}", class.len() + 1);
    format!("{MANGLE_PREFIX}{class}4selfF{reference}Z{reference}")
}

/// Linkage name of a free function.
///
/// `params` and `ret` are already-mangled type names.
pub fn function_symbol(path: &str, params: &[&str], ret: &str) -> String
{
    format!("{MANGLE_PREFIX}{}F{}Z{ret}", mangle(path), params.concat())
}

/// Linkage name of a method of `class_path`.
///
/// Immutable methods receive the class as `P<len><class>`, mutable ones as
/// `xP<len + 1>x<class>`. `params` and `ret` are already-mangled type names.
pub fn method_symbol(class_path: &str, method: &str, params: &[&str], ret: &str, mutable: bool) -> String
{
    let class = mangle(class_path);
    let receiver = if mutable {
        format!("xP{}x{class}", class.len() + 1)
    } else {
        format!("P{}{class}", class.len())
    };
    format!(
        "{MANGLE_PREFIX}{class}{}F{receiver}{}Z{ret}",
        mangle(method),
        params.concat()
    )
}

/// Create a `SymbolName` from a raw linkage name.
///
/// Compiler-emitted names are decoded with [`demangle`], Rust names with
/// `rustc_demangle`. C++ names are recognised but left mangled.
pub fn make_symbol_name(raw: String) -> SymbolName
{
    if raw.len() > MANGLE_PREFIX.len() && raw.starts_with(MANGLE_PREFIX) {
        let demangled = match demangle(&raw) {
            Cow::Owned(path) => Some(path),
            Cow::Borrowed(_) => None,
        };
        return SymbolName::new(raw, demangled, SymbolLanguage::Ymir);
    }

    let demangled = try_demangle(&raw).ok().map(|d| format!("{d:#}"));
    let language = if raw.starts_with("_R") || (raw.starts_with("_ZN") && demangled.is_some()) {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else {
        SymbolLanguage::C
    };

    SymbolName::new(raw, demangled, language)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn demangles_nested_path()
    {
        assert_eq!(demangle("_Y4core5array10OutOfArray"), "core::array::OutOfArray");
    }

    #[test]
    fn callable_gets_parameter_marker()
    {
        let ctor = constructor_symbol("core::array::OutOfArray");
        assert_eq!(demangle(&ctor), "core::array::OutOfArray::self (...)");
    }

    #[test]
    fn foreign_names_pass_through()
    {
        assert!(matches!(demangle("printf"), Cow::Borrowed("printf")));
        assert!(matches!(demangle("_Y"), Cow::Borrowed("_Y")));
        assert!(matches!(demangle("_Yabc"), Cow::Borrowed("_Yabc")));
    }

    #[test]
    fn overlong_segment_passes_through()
    {
        assert_eq!(demangle("_Y40main"), "_Y40main");
    }

    #[test]
    fn mangle_skips_empty_segments()
    {
        assert_eq!(mangle("::main::::Node::"), "4main4Node");
        assert_eq!(mangle(""), "");
    }

    #[test]
    fn round_trip_paths()
    {
        for path in ["a", "main::Node", "core::array::OutOfArray", "x::yy::zzz::wwww::ab0123456789"] {
            let mangled = format!("{MANGLE_PREFIX}{}", mangle(path));
            assert_eq!(demangle(&mangled), path, "round trip of {path}");
        }
    }

    #[test]
    fn digit_leading_segment_is_ambiguous()
    {
        let mangled = format!("{MANGLE_PREFIX}{}", mangle("main::0123456789ab"));
        assert_eq!(mangled, "_Y4main120123456789ab");
        // the greedy length prefix overruns the name, which then passes through
        assert_eq!(demangle(&mangled), mangled);
    }

    #[test]
    fn derived_names()
    {
        assert_eq!(vtable_symbol("main::Node"), "_Y4main4NodeVT");
        assert_eq!(typeinfo_symbol("main::Node"), "_Y4main4NodeTI");
        assert_eq!(function_symbol("main::add", &["i32", "i32"], "i32"), "_Y4main3addFi32i32Zi32");
        assert_eq!(
            method_symbol("main::Node", "len", &[], "u64", false),
            "_Y4main4Node3lenFP104main4NodeZu64"
        );
        assert_eq!(
            method_symbol("main::Node", "push", &["i32"], "v", true),
            "_Y4main4Node4pushFxP11x4main4Nodei32Zv"
        );
    }

    #[test]
    fn symbol_language_detection()
    {
        let ymir = make_symbol_name("_Y4main4NodeVT".to_string());
        assert_eq!(ymir.language(), SymbolLanguage::Ymir);
        assert_eq!(ymir.display_name(), "main::Node");

        let rust = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE".to_string());
        assert_eq!(rust.language(), SymbolLanguage::Rust);
        assert_eq!(rust.display_name(), "core::fmt::write");

        let cpp = make_symbol_name("_Z3fooi".to_string());
        assert_eq!(cpp.language(), SymbolLanguage::Cpp);

        let c = make_symbol_name("malloc".to_string());
        assert_eq!(c.language(), SymbolLanguage::C);
        assert_eq!(c.display_name(), "malloc");
    }
}
