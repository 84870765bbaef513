//! Serialised disassembler export.
//!
//! A snapshot is what an external disassembler script dumps after its own
//! auto-analysis: sections, functions with their blocks, every decoded head
//! with its flow classification and code references, switch tables and
//! strings. It is read from JSON or YAML.
//!
//! Addresses may be written as integers or as `"0x..."` strings; raw bytes
//! are a hex string.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::model::{AddrRange, FlowFlags, FunctionInfo, InstructionRecord, Section, StringItem};
use crate::services::sources::{InstructionSource, SourceFormat};

/// An address that deserialises from `4096` or `"0x1000"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "AddressRepr", into = "u64")]
pub struct Address(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Int(u64),
    Text(String),
}

impl TryFrom<AddressRepr> for Address {
    type Error = String;

    fn try_from(value: AddressRepr) -> Result<Self, Self::Error> {
        match value {
            AddressRepr::Int(v) => Ok(Address(v)),
            AddressRepr::Text(s) => {
                let t = s.trim();
                let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => t.parse::<u64>(),
                };
                parsed.map(Address).map_err(|e| format!("invalid address '{s}': {e}"))
            }
        }
    }
}

impl From<Address> for u64 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSection {
    pub name: String,
    pub start: Address,
    pub end: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub start: Address,
    pub end: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFunction {
    pub name: String,
    pub entry: Address,
    #[serde(default)]
    pub blocks: Vec<SnapshotBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInstruction {
    pub address: Address,
    pub size: u32,
    #[serde(default)]
    pub bytes: String,
    #[serde(default)]
    pub mnemonic: String,
    #[serde(default)]
    pub operands: Vec<String>,
    #[serde(default)]
    pub flags: FlowFlags,
    #[serde(default)]
    pub successors: Vec<Address>,
    #[serde(default)]
    pub predecessors: Vec<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_targets: Option<Vec<Address>>,
    /// The head exists but the disassembler could not decode it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub undecodable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotString {
    pub address: Address,
    pub value: String,
    /// Defaults to the UTF-8 length of `value`.
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub kind: u32,
    #[serde(default)]
    pub xrefs: Vec<Address>,
}

/// Top-level export document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default)]
    pub sections: Vec<SnapshotSection>,
    #[serde(default)]
    pub functions: Vec<SnapshotFunction>,
    #[serde(default)]
    pub instructions: Vec<SnapshotInstruction>,
    #[serde(default)]
    pub strings: Vec<SnapshotString>,
}

impl Snapshot {
    pub fn from_json_str(body: &str) -> Result<Self, SourceError> {
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))
    }

    pub fn from_yaml_str(body: &str) -> Result<Self, SourceError> {
        serde_yaml::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let format = SourceFormat::from_path(path)?;
        let body = fs::read_to_string(path)
            .map_err(|source| SourceError::Io { path: path.to_path_buf(), source })?;
        match format {
            SourceFormat::Json => Self::from_json_str(&body),
            SourceFormat::Yaml => Self::from_yaml_str(&body),
        }
    }
}

/// [`InstructionSource`] over a validated [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    name: String,
    sections: Vec<Section>,
    functions: Vec<FunctionInfo>,
    blocks: BTreeMap<u64, Vec<AddrRange>>,
    heads: BTreeMap<u64, Option<InstructionRecord>>,
    outgoing: BTreeMap<u64, Vec<u64>>,
    incoming: BTreeMap<u64, Vec<u64>>,
    switches: BTreeMap<u64, Vec<u64>>,
    strings: Vec<StringItem>,
}

impl SnapshotSource {
    /// Validate `snapshot` and index it.
    ///
    /// Rejects zero-sized or overlapping heads, malformed byte strings and
    /// inverted section or block bounds.
    pub fn new(snapshot: Snapshot) -> Result<Self, SourceError> {
        let mut sections = Vec::with_capacity(snapshot.sections.len());
        for s in &snapshot.sections {
            if s.start > s.end {
                return Err(SourceError::Invalid(format!(
                    "section {} starts at {} after its end {}",
                    s.name, s.start, s.end
                )));
            }
            sections.push(Section::new(s.name.clone(), s.start.0, s.end.0));
        }

        let mut functions = Vec::with_capacity(snapshot.functions.len());
        let mut blocks = BTreeMap::new();
        for f in &snapshot.functions {
            let mut ranges = Vec::with_capacity(f.blocks.len());
            for b in &f.blocks {
                if b.start > b.end {
                    return Err(SourceError::Invalid(format!(
                        "block {}..{} of function {} is inverted",
                        b.start, b.end, f.name
                    )));
                }
                ranges.push(AddrRange::new(b.start.0, b.end.0));
            }
            functions.push(FunctionInfo { name: f.name.clone(), entry: f.entry.0 });
            blocks.insert(f.entry.0, ranges);
        }

        let mut heads = BTreeMap::new();
        let mut outgoing = BTreeMap::new();
        let mut incoming = BTreeMap::new();
        let mut switches = BTreeMap::new();
        for insn in &snapshot.instructions {
            let address = insn.address.0;
            if insn.size == 0 {
                return Err(SourceError::Invalid(format!("instruction at {} has zero size", insn.address)));
            }
            let record = if insn.undecodable {
                None
            } else {
                let bytes = hex::decode(insn.bytes.trim()).map_err(|e| {
                    SourceError::Invalid(format!("instruction at {} has bad bytes: {e}", insn.address))
                })?;
                Some(InstructionRecord {
                    address,
                    size: insn.size,
                    bytes,
                    mnemonic: insn.mnemonic.clone(),
                    operands: insn.operands.clone(),
                    flags: insn.flags,
                })
            };
            if heads.insert(address, record).is_some() {
                return Err(SourceError::Invalid(format!("duplicate instruction at {}", insn.address)));
            }
            outgoing.insert(address, insn.successors.iter().map(|a| a.0).collect());
            incoming.insert(address, insn.predecessors.iter().map(|a| a.0).collect());
            if let Some(targets) = &insn.switch_targets {
                switches.insert(address, targets.iter().map(|a| a.0).collect());
            }
        }

        let sizes: BTreeMap<u64, u64> =
            snapshot.instructions.iter().map(|i| (i.address.0, u64::from(i.size))).collect();
        let mut previous: Option<(u64, u64)> = None;
        for (&address, &size) in &sizes {
            if let Some((prev, prev_size)) = previous {
                if prev + prev_size > address {
                    return Err(SourceError::Invalid(format!(
                        "instruction at 0x{prev:x} (size {prev_size}) overlaps 0x{address:x}"
                    )));
                }
            }
            previous = Some((address, size));
        }

        let strings = snapshot
            .strings
            .iter()
            .map(|s| StringItem {
                address: s.address.0,
                length: s.length.unwrap_or(s.value.len() as u64),
                kind: s.kind,
                value: s.value.clone(),
                xrefs: s.xrefs.iter().map(|a| a.0).collect(),
            })
            .collect();

        Ok(Self {
            name: snapshot.name,
            sections,
            functions,
            blocks,
            heads,
            outgoing,
            incoming,
            switches,
            strings,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        Self::new(Snapshot::from_path(path)?)
    }

    pub fn from_json_str(body: &str) -> Result<Self, SourceError> {
        Self::new(Snapshot::from_json_str(body)?)
    }

    pub fn from_yaml_str(body: &str) -> Result<Self, SourceError> {
        Self::new(Snapshot::from_yaml_str(body)?)
    }

    pub fn head_count(&self) -> usize {
        self.heads.len()
    }
}

impl InstructionSource for SnapshotSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sections(&self) -> Vec<Section> {
        self.sections.clone()
    }

    fn functions(&self) -> Vec<FunctionInfo> {
        self.functions.clone()
    }

    fn function_blocks(&self, entry: u64) -> Vec<AddrRange> {
        self.blocks.get(&entry).cloned().unwrap_or_default()
    }

    fn heads(&self, range: AddrRange) -> Vec<u64> {
        if range.is_empty() {
            return Vec::new();
        }
        self.heads.range(range.start..range.end).map(|(&a, _)| a).collect()
    }

    fn instruction(&self, address: u64) -> Option<InstructionRecord> {
        self.heads.get(&address).cloned().flatten()
    }

    fn outgoing(&self, address: u64) -> Vec<u64> {
        self.outgoing.get(&address).cloned().unwrap_or_default()
    }

    fn incoming(&self, address: u64) -> Vec<u64> {
        self.incoming.get(&address).cloned().unwrap_or_default()
    }

    fn switch_targets(&self, address: u64) -> Option<Vec<u64>> {
        self.switches.get(&address).cloned()
    }

    fn strings(&self) -> Vec<StringItem> {
        self.strings.clone()
    }
}
