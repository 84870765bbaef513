//! Record emission for the final function/block structure.
//!
//! Walks every function whose entry lies in the processed range, block by
//! block, and writes instruction, call, edge, block and function records
//! to a [`RecordSink`]. Record ids come from an [`EmitContext`] that lives
//! for the whole run, so ids stay unique across sections.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::blocks::{blocks_in_function, BasicBlock};
use crate::error::AnalysisResult;
use crate::model::{AddrRange, Image, Insn};
use crate::output::{
    BlockRow, CallRow, EdgeRow, FunctionRow, InstructionRow, RecordSink, StringRow, StringXrefRow,
};

pub use crate::output::EdgeKind;

/// The only section edge destinations may lie in.
pub const TEXT_SECTION: &str = ".text";

/// Id counters and the PLT range of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitContext {
    pub function_id: usize,
    pub block_id: usize,
    pub edge_id: usize,
    pub plt: AddrRange,
}

impl EmitContext {
    pub fn new(plt: AddrRange) -> Self {
        Self { plt, ..Self::default() }
    }

    pub fn in_plt(&self, address: u64) -> bool {
        self.plt.contains(address)
    }
}

/// Record counts for one emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitStats {
    pub functions: usize,
    pub blocks: usize,
    pub instructions: usize,
    pub calls: usize,
    pub edges: usize,
    /// Edges to PLT stubs; they still consume an edge id.
    pub plt_edges_suppressed: usize,
    pub foreign_section_edges: usize,
    pub strings: usize,
    pub string_xrefs: usize,
}

impl EmitStats {
    /// Field-wise sum, for run totals.
    pub fn add(&mut self, other: &EmitStats) {
        self.functions += other.functions;
        self.blocks += other.blocks;
        self.instructions += other.instructions;
        self.calls += other.calls;
        self.edges += other.edges;
        self.plt_edges_suppressed += other.plt_edges_suppressed;
        self.foreign_section_edges += other.foreign_section_edges;
        self.strings += other.strings;
        self.string_xrefs += other.string_xrefs;
    }
}

/// `[plt_start, plt_end)`, extended by `.plt.got` when it directly follows
/// `.plt`. Empty for statically linked images.
pub fn compute_plt_range(image: &Image) -> AddrRange {
    let Some(plt) = image.section(".plt") else {
        return AddrRange::default();
    };
    let mut range = plt.range;
    if let Some(got) = image.section(".plt.got") {
        if !got.range.is_empty() && range.end == got.range.start {
            range.end = got.range.end;
        }
    }
    debug!("plt range {}", range);
    range
}

/// Emit records for every function with its entry in `range`.
pub fn emit_range(
    image: &Image,
    range: AddrRange,
    ctx: &mut EmitContext,
    sink: &mut dyn RecordSink,
) -> AnalysisResult<EmitStats> {
    info!("processing instructions in {}...", range);
    let mut stats = EmitStats::default();

    for function in image.functions().functions_in(range) {
        for block in blocks_in_function(image, function.id) {
            emit_block(image, range, &block, ctx, sink, &mut stats)?;
            sink.block(&BlockRow {
                id: ctx.block_id,
                start: block.start,
                end: block.end,
                function_id: ctx.function_id,
            })?;
            ctx.block_id += 1;
            stats.blocks += 1;
        }

        sink.function(&FunctionRow { id: ctx.function_id, name: function.name.clone() })?;
        ctx.function_id += 1;
        stats.functions += 1;
    }
    Ok(stats)
}

fn emit_block(
    image: &Image,
    range: AddrRange,
    block: &BasicBlock,
    ctx: &mut EmitContext,
    sink: &mut dyn RecordSink,
    stats: &mut EmitStats,
) -> AnalysisResult<()> {
    for address in image.heads(block.range()) {
        if ctx.in_plt(address) || !range.contains(address) {
            continue;
        }
        let Some(insn) = image.insn(address) else {
            warn!("error, no decoded instruction 0x{address:x} in block {}", block.range());
            continue;
        };

        let last = block.is_last(address);
        sink.instruction(&InstructionRow {
            address,
            block_id: ctx.block_id,
            last,
            assembly: insn.assembled_hex(),
            mnemonic: insn.mnemonic().to_string(),
            operands: insn.operands().to_vec(),
        })?;
        stats.instructions += 1;

        if insn.is_flow() {
            emit_flow_edges(image, range, &insn, ctx, sink, stats)?;
        } else if last {
            for &dst in insn.outgoing() {
                emit_edge(image, &insn, dst, EdgeKind::Fallthrough, ctx, sink, stats)?;
            }
        }
    }
    Ok(())
}

fn emit_flow_edges(
    image: &Image,
    range: AddrRange,
    insn: &Insn<'_>,
    ctx: &mut EmitContext,
    sink: &mut dyn RecordSink,
    stats: &mut EmitStats,
) -> AnalysisResult<()> {
    let fallthrough = insn.next_address();
    // A conditional branch whose target is its own fallthrough lists the
    // address twice: one FALLTHROUGH and one JUMP.
    let mut drew_fallthrough = false;

    for &dst in insn.outgoing() {
        let gone = dst != fallthrough;
        let kind = if insn.is_call() {
            // Calls leaving the range go to the calls record, not the CFG.
            if gone && !range.contains(dst) {
                let functions = image.functions();
                sink.call(&CallRow {
                    address: insn.address(),
                    function_name: functions.name_at(insn.address()).to_string(),
                    destination: dst,
                    destination_name: functions.name_at(dst).to_string(),
                    plt: ctx.in_plt(dst),
                })?;
                stats.calls += 1;
                continue;
            }
            EdgeKind::Fallthrough
        } else if insn.is_branch() {
            if insn.is_conditional() && !gone && !drew_fallthrough {
                EdgeKind::Fallthrough
            } else {
                EdgeKind::Jump
            }
        } else {
            EdgeKind::Fallthrough
        };

        emit_edge(image, insn, dst, kind, ctx, sink, stats)?;
        if kind == EdgeKind::Fallthrough {
            drew_fallthrough = true;
        }
    }
    Ok(())
}

fn emit_edge(
    image: &Image,
    insn: &Insn<'_>,
    dst: u64,
    kind: EdgeKind,
    ctx: &mut EmitContext,
    sink: &mut dyn RecordSink,
    stats: &mut EmitStats,
) -> AnalysisResult<()> {
    if ctx.in_plt(dst) {
        ctx.edge_id += 1;
        stats.plt_edges_suppressed += 1;
        return Ok(());
    }

    let in_text = image.section_of(dst).is_some_and(|s| s.name == TEXT_SECTION);
    if !in_text {
        let section = image.section_of(dst).map_or("<none>", |s| s.name.as_str());
        warn!("0x{:x} -> 0x{dst:x} goes to section {section}", insn.address());
        stats.foreign_section_edges += 1;
        return Ok(());
    }

    let mut source = insn.address();
    if kind == EdgeKind::Fallthrough && dst > source && dst - source > 4 {
        // Fused pair such as MOVW/MOVT: attribute the edge to the trailing
        // real instruction.
        source += insn.size().saturating_sub(4);
    }

    sink.edge(&EdgeRow {
        id: ctx.edge_id,
        block_id: ctx.block_id,
        address: source,
        destination: dst,
        plt: false,
        kind,
    })?;
    ctx.edge_id += 1;
    stats.edges += 1;
    Ok(())
}

/// Emit string records and their cross references.
pub fn emit_strings(image: &Image, sink: &mut dyn RecordSink) -> AnalysisResult<EmitStats> {
    let mut stats = EmitStats::default();
    for item in image.strings() {
        sink.string(&StringRow {
            address: item.address,
            length: item.length,
            kind: item.kind,
            value: item.value.clone(),
        })?;
        stats.strings += 1;
        for &xref in &item.xrefs {
            sink.string_xref(&StringXrefRow { string_address: item.address, xref })?;
            stats.string_xrefs += 1;
        }
    }
    Ok(stats)
}
