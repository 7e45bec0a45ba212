//! Compile `data/*_CODES.json` into `$OUT_DIR/builtins.rs`.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct CodeTable {
    name: String,
    marker_size: usize,
    #[serde(default)]
    max_correction_bits: u8,
    codes: Vec<u64>,
}

fn load(path: &Path) -> CodeTable {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    let table: CodeTable = serde_json::from_str(&raw)
        .unwrap_or_else(|e| panic!("parsing {}: {e}", path.display()));

    let bits = table.marker_size * table.marker_size;
    assert!(
        (1..=64).contains(&bits),
        "{}: marker_size {} is out of range",
        table.name,
        table.marker_size
    );
    assert!(!table.codes.is_empty(), "{}: no codes", table.name);
    if bits < 64 {
        let mask = (1u64 << bits) - 1;
        if let Some(id) = table.codes.iter().position(|&c| c & !mask != 0) {
            panic!("{}: code of id {id} has bits beyond {bits}", table.name);
        }
    }
    table
}

fn main() {
    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
    println!("cargo:rerun-if-changed={}", data.display());

    let mut files: Vec<PathBuf> = std::fs::read_dir(&data)
        .expect("data directory")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_CODES.json"))
        })
        .collect();
    files.sort();

    let mut out = String::new();
    let mut names = Vec::new();
    for path in &files {
        println!("cargo:rerun-if-changed={}", path.display());
        let table = load(path);
        let codes = table
            .codes
            .iter()
            .map(|c| format!("0x{c:x}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            out,
            "pub const {name}: BuiltinDictionary = BuiltinDictionary {{ name: \"{name}\", \
             marker_size: {size}, max_correction_bits: {bits}, codes: &[{codes}] }};",
            name = table.name,
            size = table.marker_size,
            bits = table.max_correction_bits,
        )
        .expect("format");
        names.push(table.name);
    }
    writeln!(
        out,
        "pub const BUILTINS: &[BuiltinDictionary] = &[{}];",
        names.join(", ")
    )
    .expect("format");

    let dest = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR")).join("builtins.rs");
    std::fs::write(&dest, out).expect("writing builtins.rs");
}
