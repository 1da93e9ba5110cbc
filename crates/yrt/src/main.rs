use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use yrt_reflect::prelude::*;
use yrt_reflect::symbols::demangle::make_symbol_name;
use yrt_reflect::symbols::elf::SectionHeader;
use yrt_reflect::symbols::maps::load_bases;
use yrt_reflect::symbols::RefreshReport;
use yrt_utils::{info, init_logging_to_dir, init_logging_with, LogFormat, LogLevel, LoggingConfig};

type CliResult = Result<(), Box<dyn Error>>;

/// Runtime reflection toolkit for `_Y` compiled programs.
#[derive(Parser, Debug)]
#[command(name = "yrt")]
#[command(version)]
#[command(about = "Inspect reflection symbols and exercise reflective allocation", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json (overrides YRT_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Log only to a dated file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Decode linkage names into class/function paths
    Demangle
    {
        /// Linkage names (e.g. _Y4main4NodeVT)
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Encode a `::`-separated path
    Mangle
    {
        /// Path to encode (e.g. main::Node)
        path: String,
    },
    /// Print the memory map of this process or another one
    Maps
    {
        /// Process ID whose map to read (default: this process)
        #[arg(long)]
        pid: Option<u32>,
    },
    /// List the symbols of an ELF file
    Inspect
    {
        /// ELF executable or shared object
        file: PathBuf,
        /// List every symbol with its language, not only reflection symbols
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Refresh the process-wide registry and list it
    Symbols
    {
        /// Only list symbols of this kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Only list symbols whose path contains this text
        #[arg(long)]
        filter: Option<String>,
        /// Index these files instead of the mapped ones
        #[arg(long)]
        file: Vec<PathBuf>,
    },
    /// Resolve one symbol through the process-wide registry
    Lookup
    {
        /// Linkage name, or demangled path with --path
        name: String,
        /// Kind of symbol to look up
        #[arg(long, value_enum, default_value_t = KindArg::Vtable)]
        kind: KindArg,
        /// Treat NAME as a demangled path
        #[arg(long, default_value_t = false)]
        path: bool,
    },
    /// Declare sample classes, create one by name and deep-copy a cyclic graph
    Demo,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum KindArg
{
    Function,
    Vtable,
}

impl From<KindArg> for SymbolKind
{
    fn from(kind: KindArg) -> Self
    {
        match kind {
            KindArg::Function => SymbolKind::Function,
            KindArg::Vtable => SymbolKind::Vtable,
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    // Flags win over YRT_LOG_FORMAT / RUST_LOG
    let config = match LoggingConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };
    let config = match (cli.log_level, cli.log_format) {
        (Some(level), Some(format)) => config.with_level(level).with_format(format),
        (Some(level), None) => config.with_level(level),
        (None, Some(format)) => config.with_format(format),
        (None, None) => config,
    };
    let initialized = match &cli.log_dir {
        Some(dir) => init_logging_to_dir(dir, cli.log_level.unwrap_or(LogLevel::Info)),
        None => init_logging_with(&config),
    };
    let _guard = match initialized {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(command: Commands) -> CliResult
{
    match command {
        Commands::Demangle { symbols } => {
            for symbol in symbols {
                println!("{}", demangle(&symbol));
            }
            Ok(())
        }
        Commands::Mangle { path } => {
            println!("{}", mangle(&path));
            Ok(())
        }
        Commands::Maps { pid } => print_maps(pid),
        Commands::Inspect { file, all } => inspect(&file, all),
        Commands::Symbols { kind, filter, file } => list_symbols(kind.map(SymbolKind::from), filter.as_deref(), &file),
        Commands::Lookup { name, kind, path } => lookup(&name, kind.into(), path),
        Commands::Demo => run_demo(),
    }
}

fn print_maps(pid: Option<u32>) -> CliResult
{
    let reader = pid.map_or_else(ProcessMapReader::new, ProcessMapReader::for_pid);
    info!("Reading {}", reader.path().display());
    let entries = reader.read_entries()?;

    for entry in &entries {
        println!(
            "{}-{} {} {:08x} {}",
            entry.start,
            entry.end,
            entry.permissions,
            entry.offset,
            entry.path.as_deref().unwrap_or("")
        );
    }

    let bases = load_bases(&entries);
    if !bases.is_empty() {
        println!("\nLoad bases:");
        for (path, base) in bases {
            println!("  {} {}", base, path.display());
        }
    }
    Ok(())
}

fn inspect(file: &Path, all: bool) -> CliResult
{
    let bytes = std::fs::read(file)?;
    let image = ElfImage::new(&bytes);
    let header = image
        .header()
        .ok_or_else(|| format!("{} is not a 64-bit ELF image", file.display()))?;

    println!("File: {}", file.display());
    println!(
        "  Type: {}",
        if header.is_relocatable_image() {
            "shared object / PIE"
        } else {
            "executable"
        }
    );
    println!("  Entry: {:#x}", header.entry);
    println!("  Sections: {}", header.section_count);
    println!();

    if all {
        let mut count = 0usize;
        for section in image.sections().filter(SectionHeader::is_symbol_table) {
            for (entry, name_table_base) in image.symbols_of(&section) {
                let Some(raw) = image.symbol_name(&entry, name_table_base).filter(|name| !name.is_empty()) else {
                    continue;
                };
                let name = make_symbol_name(raw.to_string());
                println!("{:#018x} {:>6} {:<5} {}", entry.value, entry.size, name.language(), name);
                count += 1;
            }
        }
        println!("\n{} symbols", count);
    } else {
        let symbols: Vec<ReflectSymbol> = image.reflect_symbols(Address::ZERO).collect();
        for symbol in &symbols {
            println!("{}", symbol);
        }
        println!("\n{} reflection symbols", symbols.len());
    }
    Ok(())
}

fn list_symbols(kind: Option<SymbolKind>, filter: Option<&str>, files: &[PathBuf]) -> CliResult
{
    let mut registry = SymbolRegistry::global()
        .lock()
        .map_err(|_| "symbol registry lock poisoned")?;

    let report = if files.is_empty() {
        registry.try_refresh()?
    } else {
        files.iter().fold(RefreshReport::default(), |total, file| {
            let report = registry.refresh_path(file);
            RefreshReport {
                files_indexed: total.files_indexed + report.files_indexed,
                files_skipped: total.files_skipped + report.files_skipped,
                symbols_registered: total.symbols_registered + report.symbols_registered,
            }
        })
    };

    let mut symbols: Vec<&ReflectSymbol> = registry
        .iter()
        .filter(|symbol| kind.map_or(true, |kind| symbol.kind == kind))
        .filter(|symbol| filter.map_or(true, |text| symbol.demangled.contains(text)))
        .collect();
    symbols.sort_by_key(|symbol| symbol.address);

    for symbol in &symbols {
        println!("{}", symbol);
    }
    println!(
        "\n{} symbols listed ({} files indexed, {} skipped)",
        symbols.len(),
        report.files_indexed,
        report.files_skipped
    );
    Ok(())
}

fn lookup(name: &str, kind: SymbolKind, by_path: bool) -> CliResult
{
    let mut registry = SymbolRegistry::global()
        .lock()
        .map_err(|_| "symbol registry lock poisoned")?;
    registry.try_refresh()?;

    let symbol = if by_path {
        registry.find_path(name, kind).ok_or_else(|| ReflectError::SymbolNotFound {
            name: name.to_string(),
            kind,
        })?
    } else {
        registry.require(name, kind)?
    };
    println!("{}", symbol);
    println!("  linkage name: {}", symbol.name);
    Ok(())
}

fn run_demo() -> CliResult
{
    let mut allocator = ReflectiveAllocator::isolated();

    let base = allocator.declare_class(
        ClassBuilder::new("demo::Shape")
            .field("id", Shape::i64())
            .constructor(|shape| shape.write_i64("id", 1))
            .build()?,
    )?;
    allocator.declare_class(
        ClassBuilder::new("demo::Node")
            .extends(&base)
            .field("next", Shape::Object)
            .field("values", Shape::slice_of(Shape::i64()))
            .constructor(|node| {
                let values = node.heap_mut().allocate_i64_slice(&[4, 65, 2, -31])?;
                node.write_i64("id", 2)?;
                node.write_slice("values", values)
            })
            .build()?,
    )?;

    for class in allocator.catalog().classes() {
        println!("{:<12} vtable {}", class.path(), class.vtable_symbol());
    }

    let first = allocator.create_from_name("demo::Node")?;
    let second = allocator.create_from_name("demo::Node")?;
    allocator.object_mut(first)?.write_object("next", Some(second))?;
    allocator.object_mut(second)?.write_object("next", Some(first))?;
    println!("\nsource: {} -> {} -> {}", first, second, first);

    let copy = allocator
        .deep_copy(&Value::Object(Some(first)))?
        .as_object()
        .ok_or("deep copy returned a null reference")?;
    let copy_next = allocator
        .object(copy)?
        .read_object("next")?
        .ok_or("copied node lost its successor")?;
    let back = allocator.object(copy_next)?.read_object("next")?;
    println!("copy:   {} -> {} -> {}", copy, copy_next, back.unwrap_or(Address::ZERO));
    println!("cycle preserved: {}", back == Some(copy));

    let view = allocator.object(copy)?;
    let values = allocator.heap().read_i64_slice(view.read_slice("values")?)?;
    println!("copied values: {:?} (id {})", values, view.read_i64("id")?);

    // SAFETY: every field of the instance is written before it is read.
    let raw = unsafe { allocator.create_from_name_unconstructed("demo::Node")? };
    allocator.object_mut(raw)?.write_i64("id", 3)?;
    println!("\nunconstructed: {} (id {})", raw, allocator.object(raw)?.read_i64("id")?);

    let missing = allocator.create_from_name("demo::Missing");
    if let Err(e) = missing {
        println!("demo::Missing: {}", e);
    }

    info!(
        blocks = allocator.heap().block_count(),
        bytes = allocator.heap().bytes_allocated(),
        "Demo finished"
    );
    Ok(())
}
