//! Flyweight instruction view.

use crate::model::{FlowFlags, FunctionId, Image, InstructionRecord};

/// Mask/pattern of an `LDM<cond> SP!, {..., PC}` encoding that disassemblers
/// flag as flow-terminating while analysis should keep growing past it.
pub const DANGEROUS_FLOW_MASK: u32 = 0xffff_8000;
pub const DANGEROUS_FLOW_PATTERN: u32 = 0x08bd_8000;

/// A decoded head seen through the image it lives in.
///
/// Cheap to copy; ownership questions are answered against the image's
/// current chunk table.
#[derive(Debug, Clone, Copy)]
pub struct Insn<'a> {
    image: &'a Image,
    record: &'a InstructionRecord,
}

impl<'a> Insn<'a> {
    pub(crate) fn new(image: &'a Image, record: &'a InstructionRecord) -> Self {
        Self { image, record }
    }

    pub fn record(&self) -> &'a InstructionRecord {
        self.record
    }

    pub fn address(&self) -> u64 {
        self.record.address
    }

    pub fn size(&self) -> u64 {
        u64::from(self.record.size)
    }

    pub fn next_address(&self) -> u64 {
        self.record.next_address()
    }

    pub fn flags(&self) -> FlowFlags {
        self.record.flags
    }

    pub fn is_call(&self) -> bool {
        self.record.flags.call
    }

    pub fn is_branch(&self) -> bool {
        self.record.flags.branch
    }

    pub fn is_conditional(&self) -> bool {
        self.record.flags.conditional
    }

    pub fn defines_pc(&self) -> bool {
        self.record.flags.defines_pc
    }

    pub fn is_flow(&self) -> bool {
        self.record.flags.is_flow()
    }

    pub fn is_macro(&self) -> bool {
        self.record.flags.macro_insn
    }

    pub fn is_data(&self) -> bool {
        self.record.flags.data
    }

    pub fn is_unknown(&self) -> bool {
        self.record.flags.unknown
    }

    pub fn is_code(&self) -> bool {
        self.record.flags.is_code()
    }

    pub fn owner(&self) -> Option<FunctionId> {
        self.image.owner_of(self.address())
    }

    pub fn is_hanging(&self) -> bool {
        self.owner().is_none()
    }

    pub fn put_in_bbl(&self) -> bool {
        self.is_code() && self.is_hanging()
    }

    pub fn outgoing(&self) -> &'a [u64] {
        self.image.outgoing(self.address())
    }

    pub fn incoming(&self) -> &'a [u64] {
        self.image.incoming(self.address())
    }

    /// True for the encoding that must not stop head propagation even
    /// though it is classified as a flow instruction.
    pub fn is_dangerous_flow(&self) -> bool {
        self.record
            .raw_word()
            .is_some_and(|word| word & DANGEROUS_FLOW_MASK == DANGEROUS_FLOW_PATTERN)
    }

    pub fn mnemonic(&self) -> &'a str {
        &self.record.mnemonic
    }

    pub fn operands(&self) -> &'a [String] {
        &self.record.operands
    }

    pub fn assembled_hex(&self) -> String {
        self.record.assembled_hex()
    }

    /// Human-readable rendering for diagnostics.
    pub fn text(&self) -> String {
        if self.record.operands.is_empty() {
            self.record.mnemonic.clone()
        } else {
            format!("{} {}", self.record.mnemonic, self.record.operands.join(", "))
        }
    }
}
