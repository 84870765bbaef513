#![allow(dead_code)]

use std::collections::BTreeMap;

use chunkwise_core::model::{AddrRange, FlowFlags, FunctionId, Image};
use chunkwise_core::services::sources::snapshot::{
    Address, Snapshot, SnapshotBlock, SnapshotFunction, SnapshotInstruction, SnapshotSection,
    SnapshotString,
};
use chunkwise_core::services::sources::SnapshotSource;

/// Instruction builder; defaults to a 4-byte `MOV R0, R1` falling through.
#[derive(Debug, Clone)]
pub struct I(pub SnapshotInstruction);

impl I {
    pub fn op(address: u64) -> Self {
        I(SnapshotInstruction {
            address: Address(address),
            size: 4,
            bytes: "0100a0e1".into(),
            mnemonic: "MOV".into(),
            operands: vec!["R0".into(), "R1".into()],
            flags: FlowFlags::default(),
            successors: vec![Address(address + 4)],
            ..SnapshotInstruction::default()
        })
    }

    /// Unconditional branch.
    pub fn branch(address: u64, target: u64) -> Self {
        let mut i = I::op(address).mnem("B").succ(&[target]);
        i.0.flags.branch = true;
        i.0.operands = vec![format!("loc_{target:x}")];
        i
    }

    /// Conditional branch: fallthrough first, then the taken target.
    pub fn cond(address: u64, target: u64) -> Self {
        let mut i = I::branch(address, target).mnem("BEQ").succ(&[address + 4, target]);
        i.0.flags.conditional = true;
        i
    }

    pub fn call(address: u64, target: u64) -> Self {
        let mut i = I::op(address).mnem("BL").succ(&[address + 4, target]);
        i.0.flags.call = true;
        i.0.operands = vec![format!("sub_{target:x}")];
        i
    }

    /// `POP {PC}`: defines PC, no successors.
    pub fn ret(address: u64) -> Self {
        let mut i = I::op(address).mnem("POP").succ(&[]);
        i.0.flags.defines_pc = true;
        i.0.operands = vec!["{PC}".into()];
        i
    }

    pub fn data(address: u64) -> Self {
        let mut i = I::op(address).mnem("DCD").succ(&[]);
        i.0.flags.data = true;
        i
    }

    pub fn succ(mut self, targets: &[u64]) -> Self {
        self.0.successors = targets.iter().map(|&t| Address(t)).collect();
        self
    }

    pub fn preds(mut self, sources: &[u64]) -> Self {
        self.0.predecessors = sources.iter().map(|&s| Address(s)).collect();
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.0.size = size;
        self.0.bytes = "00".repeat(size as usize);
        self
    }

    pub fn bytes(mut self, hex: &str) -> Self {
        self.0.bytes = hex.into();
        self
    }

    pub fn mnem(mut self, mnemonic: &str) -> Self {
        self.0.mnemonic = mnemonic.into();
        self
    }

    pub fn fused(mut self) -> Self {
        self.0.flags.macro_insn = true;
        self
    }

    pub fn defines_pc(mut self) -> Self {
        self.0.flags.defines_pc = true;
        self
    }

    pub fn switch(mut self, targets: &[u64]) -> Self {
        self.0.switch_targets = Some(targets.iter().map(|&t| Address(t)).collect());
        self
    }

    pub fn undecodable(mut self) -> Self {
        self.0.undecodable = true;
        self
    }
}

/// In-memory snapshot builder.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    snapshot: Snapshot,
}

impl Fixture {
    pub fn new() -> Self {
        Self { snapshot: Snapshot { name: "fixture".into(), ..Snapshot::default() } }
    }

    pub fn section(mut self, name: &str, start: u64, end: u64) -> Self {
        self.snapshot.sections.push(SnapshotSection {
            name: name.into(),
            start: Address(start),
            end: Address(end),
        });
        self
    }

    /// `.text` at `[start, end)`.
    pub fn text(self, start: u64, end: u64) -> Self {
        self.section(".text", start, end)
    }

    pub fn function(mut self, name: &str, entry: u64, blocks: &[(u64, u64)]) -> Self {
        self.snapshot.functions.push(SnapshotFunction {
            name: name.into(),
            entry: Address(entry),
            blocks: blocks
                .iter()
                .map(|&(s, e)| SnapshotBlock { start: Address(s), end: Address(e) })
                .collect(),
        });
        self
    }

    pub fn insn(mut self, i: I) -> Self {
        self.snapshot.instructions.push(i.0);
        self
    }

    pub fn insns(mut self, list: impl IntoIterator<Item = I>) -> Self {
        self.snapshot.instructions.extend(list.into_iter().map(|i| i.0));
        self
    }

    /// Straight-line ops at `start, start+4, ..` up to (excluding) `end`.
    pub fn ops(self, start: u64, end: u64) -> Self {
        self.insns((start..end).step_by(4).map(I::op))
    }

    pub fn string(mut self, address: u64, value: &str, xrefs: &[u64]) -> Self {
        self.snapshot.strings.push(SnapshotString {
            address: Address(address),
            value: value.into(),
            length: None,
            kind: 0,
            xrefs: xrefs.iter().map(|&x| Address(x)).collect(),
        });
        self
    }

    /// The snapshot with predecessor lists derived from successors.
    pub fn snapshot(&self) -> Snapshot {
        let mut snap = self.snapshot.clone();
        let mut preds: BTreeMap<u64, Vec<Address>> = BTreeMap::new();
        for insn in &snap.instructions {
            for s in &insn.successors {
                let list = preds.entry(s.0).or_default();
                if !list.contains(&insn.address) {
                    list.push(insn.address);
                }
            }
        }
        for insn in &mut snap.instructions {
            if let Some(list) = preds.get(&insn.address.0) {
                for p in list {
                    if !insn.predecessors.contains(p) {
                        insn.predecessors.push(*p);
                    }
                }
            }
        }
        snap
    }

    pub fn source(&self) -> SnapshotSource {
        SnapshotSource::new(self.snapshot()).expect("valid fixture snapshot")
    }

    pub fn image(&self) -> Image {
        Image::from_source(&self.source()).expect("fixture image")
    }
}

pub fn range(start: u64, end: u64) -> AddrRange {
    AddrRange::new(start, end)
}

pub fn fid(image: &Image, name: &str) -> FunctionId {
    image.functions().by_name(name).map(|f| f.id).expect("function in fixture")
}

/// Chunks of `name` in address order.
pub fn chunks_of(image: &Image, name: &str) -> Vec<AddrRange> {
    let id = fid(image, name);
    image.functions().function(id).map(|f| f.chunks().collect()).unwrap_or_default()
}

/// Every chunk in the image with its owner.
pub fn chunk_map(image: &Image) -> Vec<(AddrRange, FunctionId)> {
    image.functions().chunks().collect()
}

/// No address may belong to two chunks.
pub fn assert_partition(image: &Image) {
    let chunks = chunk_map(image);
    for pair in chunks.windows(2) {
        assert!(
            pair[0].0.end <= pair[1].0.start,
            "chunks overlap: {} and {}",
            pair[0].0,
            pair[1].0
        );
    }
}
