//! Basic block construction from function chunks.
//!
//! Blocks are derived on demand from the current chunk table, so a chunk
//! append or removal implicitly replaces the blocks of the affected
//! function the next time they are asked for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AddrRange, Function, FunctionId, Image, Insn};

/// Maximal straight-line run `[start, end)` inside one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub start: u64,
    /// Exclusive end: the address right after `last`.
    pub end: u64,
    /// Address of the final instruction.
    pub last: u64,
    pub function: FunctionId,
    pub instruction_count: usize,
}

impl BasicBlock {
    pub fn range(&self) -> AddrRange {
        AddrRange::new(self.start, self.end)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.range().contains(address)
    }

    pub fn is_last(&self, address: u64) -> bool {
        self.last == address
    }
}

/// Blocks of one function in address order. Empty chunks are skipped.
pub fn blocks_in_function(image: &Image, id: FunctionId) -> Vec<BasicBlock> {
    let Some(function) = image.functions().function(id) else {
        return Vec::new();
    };
    let mut blocks = Vec::new();
    for chunk in function.chunks() {
        if chunk.is_empty() {
            continue;
        }
        build_chunk_blocks(image, function, chunk, &mut blocks);
    }
    blocks
}

/// Blocks of every function whose entry lies in `range`.
pub fn iter_blocks(image: &Image, range: AddrRange) -> Vec<BasicBlock> {
    image
        .functions()
        .functions_in(range)
        .flat_map(|f| blocks_in_function(image, f.id))
        .collect()
}

/// `start -> block` lookup for a block list.
pub fn index_by_start(blocks: &[BasicBlock]) -> BTreeMap<u64, BasicBlock> {
    blocks.iter().map(|b| (b.start, *b)).collect()
}

/// The block containing `address` within its owning function.
pub fn block_containing(image: &Image, address: u64) -> Option<BasicBlock> {
    let owner = image.owner_of(address)?;
    blocks_in_function(image, owner).into_iter().find(|b| b.contains(address))
}

struct OpenBlock {
    start: u64,
    last: u64,
    next: u64,
    count: usize,
}

fn build_chunk_blocks(
    image: &Image,
    function: &Function,
    chunk: AddrRange,
    out: &mut Vec<BasicBlock>,
) {
    let mut open: Option<OpenBlock> = None;
    let close = |open: &mut Option<OpenBlock>, out: &mut Vec<BasicBlock>| {
        if let Some(b) = open.take() {
            out.push(BasicBlock {
                start: b.start,
                end: b.next,
                last: b.last,
                function: function.id,
                instruction_count: b.count,
            });
        }
    };

    for address in image.heads(chunk) {
        let Some(insn) = image.insn(address) else { continue };
        if !insn.is_code() {
            close(&mut open, out);
            continue;
        }

        let split = match &open {
            Some(b) => b.next != address || is_leader(image, function, address),
            None => false,
        };
        if split {
            close(&mut open, out);
        }

        match open.as_mut() {
            Some(b) => {
                b.last = address;
                b.next = insn.next_address();
                b.count += 1;
            }
            None => {
                open = Some(OpenBlock {
                    start: address,
                    last: address,
                    next: insn.next_address(),
                    count: 1,
                });
            }
        }

        if ends_block(&insn) {
            close(&mut open, out);
        }
    }
    close(&mut open, out);
}

/// Entry points and targets of non-sequential references start a block.
fn is_leader(image: &Image, function: &Function, address: u64) -> bool {
    if address == function.entry {
        return true;
    }
    image.incoming(address).iter().any(|&from| match image.insn(from) {
        Some(pred) => pred.next_address() != address,
        None => true,
    })
}

fn ends_block(insn: &Insn<'_>) -> bool {
    if insn.is_flow() {
        return true;
    }
    let outgoing = insn.outgoing();
    if outgoing.is_empty() {
        return true;
    }
    !insn.is_macro() && !outgoing.contains(&insn.next_address())
}
