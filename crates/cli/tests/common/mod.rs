#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

fn op(address: u64) -> Value {
    json!({
        "address": format!("0x{address:x}"),
        "size": 4,
        "bytes": "0100a0e1",
        "mnemonic": "MOV",
        "operands": ["R0", "R1"],
        "successors": [format!("0x{:x}", address + 4)]
    })
}

fn ret(address: u64) -> Value {
    json!({
        "address": format!("0x{address:x}"),
        "size": 4,
        "bytes": "04f09de4",
        "mnemonic": "POP",
        "operands": ["{PC}"],
        "flags": { "defines_pc": true }
    })
}

fn call(address: u64, target: u64) -> Value {
    json!({
        "address": format!("0x{address:x}"),
        "size": 4,
        "bytes": "3e0100eb",
        "mnemonic": "BL",
        "operands": [format!("sub_{target:x}")],
        "flags": { "call": true },
        "successors": [format!("0x{:x}", address + 4), format!("0x{target:x}")]
    })
}

/// `.text` holds `f` with a two-instruction hanging tail and `g`; `.init`
/// holds `init`, whose call to `g` returns into a hanging `POP {PC}`.
pub fn firmware_snapshot() -> Value {
    json!({
        "name": "fw.bin",
        "arch": "arm",
        "sections": [
            { "name": ".init", "start": "0x800", "end": "0x900" },
            { "name": ".text", "start": "0x1000", "end": "0x2000" },
            { "name": ".rodata", "start": "0x3000", "end": "0x3100" }
        ],
        "functions": [
            { "name": "f", "entry": "0x1000", "blocks": [{ "start": "0x1000", "end": "0x1008" }] },
            { "name": "g", "entry": "0x1100", "blocks": [{ "start": "0x1100", "end": "0x1104" }] },
            { "name": "init", "entry": "0x800", "blocks": [{ "start": "0x800", "end": "0x808" }] }
        ],
        "instructions": [
            op(0x1000), op(0x1004), op(0x1008), ret(0x100c),
            ret(0x1100),
            op(0x800), call(0x804, 0x1100), ret(0x808)
        ],
        "strings": [
            { "address": "0x3000", "value": "boot", "xrefs": ["0x1004"] }
        ]
    })
}

/// Write the firmware snapshot as `<dir>/fw.json`.
pub fn write_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("fw.json");
    let body = serde_json::to_string_pretty(&firmware_snapshot()).expect("serialize snapshot");
    fs::write(&path, body).expect("write snapshot");
    path
}
