//! Line-oriented CSV writer for the record files.
//!
//! The formats are fixed by the graph importer: addresses are decimal,
//! booleans are `TRUE`/`FALSE`, operands are `;`-joined and no field is
//! quoted except string contents, which are JSON-encoded.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::output::layout::{OutputLayout, RecordKind};
use crate::output::{
    BlockRow, CallRow, EdgeRow, FunctionRow, InstructionRow, RecordSink, StringRow, StringXrefRow,
};

/// A row type with a fixed header.
pub trait CsvRecord {
    const HEADER: &'static str;

    fn line(&self) -> String;
}

fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

impl CsvRecord for FunctionRow {
    const HEADER: &'static str = "id,name";

    fn line(&self) -> String {
        format!("{},{}", self.id, self.name.replace(':', "_"))
    }
}

impl CsvRecord for BlockRow {
    const HEADER: &'static str = "id,startEA,endEA,function_id";

    fn line(&self) -> String {
        format!("{},{},{},{}", self.id, self.start, self.end, self.function_id)
    }
}

impl CsvRecord for InstructionRow {
    const HEADER: &'static str = "address,block_id,last,assembly,mnem,operands";

    fn line(&self) -> String {
        format!(
            "{},{},{},0x{},{},{}",
            self.address,
            self.block_id,
            flag(self.last),
            self.assembly,
            self.mnemonic,
            self.operands.join(";")
        )
    }
}

impl CsvRecord for CallRow {
    const HEADER: &'static str = "ins_address,ins_function_name,dest_address,dest_name,plt";

    fn line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.address,
            self.function_name,
            self.destination,
            self.destination_name,
            flag(self.plt)
        )
    }
}

impl CsvRecord for EdgeRow {
    const HEADER: &'static str = "id,block_id,ins_address,dest_address,plt,edge_type";

    fn line(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.id,
            self.block_id,
            self.address,
            self.destination,
            u8::from(self.plt),
            self.kind
        )
    }
}

impl CsvRecord for StringRow {
    const HEADER: &'static str = "address,length,strtype,string";

    fn line(&self) -> String {
        let quoted = serde_json::to_string(&self.value).unwrap_or_else(|_| "\"\"".to_string());
        format!("{},{},{},{}", self.address, self.length, self.kind, quoted)
    }
}

impl CsvRecord for StringXrefRow {
    const HEADER: &'static str = "string_address,xref_addr";

    fn line(&self) -> String {
        format!("{},{}", self.string_address, self.xref)
    }
}

/// Writes each record kind to its own writer, headers first.
pub struct CsvSink<W: Write> {
    functions: W,
    blocks: W,
    instructions: W,
    calls: W,
    edges: W,
    strings: W,
    string_xrefs: W,
}

impl<W: Write> CsvSink<W> {
    /// Open one writer per record kind and write the header rows.
    pub fn new(mut open: impl FnMut(RecordKind) -> io::Result<W>) -> io::Result<Self> {
        let mut sink = Self {
            functions: open(RecordKind::Functions)?,
            blocks: open(RecordKind::Blocks)?,
            instructions: open(RecordKind::Instructions)?,
            calls: open(RecordKind::Calls)?,
            edges: open(RecordKind::Edges)?,
            strings: open(RecordKind::Strings)?,
            string_xrefs: open(RecordKind::StringXrefs)?,
        };
        writeln!(sink.functions, "{}", FunctionRow::HEADER)?;
        writeln!(sink.blocks, "{}", BlockRow::HEADER)?;
        writeln!(sink.instructions, "{}", InstructionRow::HEADER)?;
        writeln!(sink.calls, "{}", CallRow::HEADER)?;
        writeln!(sink.edges, "{}", EdgeRow::HEADER)?;
        writeln!(sink.strings, "{}", StringRow::HEADER)?;
        writeln!(sink.string_xrefs, "{}", StringXrefRow::HEADER)?;
        Ok(sink)
    }

    pub fn writer(&self, kind: RecordKind) -> &W {
        match kind {
            RecordKind::Functions => &self.functions,
            RecordKind::Blocks => &self.blocks,
            RecordKind::Instructions => &self.instructions,
            RecordKind::Calls => &self.calls,
            RecordKind::Edges => &self.edges,
            RecordKind::Strings => &self.strings,
            RecordKind::StringXrefs => &self.string_xrefs,
        }
    }
}

impl CsvSink<BufWriter<File>> {
    /// Create (truncating) the record files described by `layout`.
    pub fn create(layout: &OutputLayout) -> io::Result<Self> {
        std::fs::create_dir_all(layout.dir())?;
        Self::new(|kind| File::create(layout.path(kind)).map(BufWriter::new))
    }
}

fn write_row<W: Write, R: CsvRecord>(w: &mut W, row: &R) -> io::Result<()> {
    writeln!(w, "{}", row.line())
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn function(&mut self, row: &FunctionRow) -> io::Result<()> {
        write_row(&mut self.functions, row)
    }

    fn block(&mut self, row: &BlockRow) -> io::Result<()> {
        write_row(&mut self.blocks, row)
    }

    fn instruction(&mut self, row: &InstructionRow) -> io::Result<()> {
        write_row(&mut self.instructions, row)
    }

    fn call(&mut self, row: &CallRow) -> io::Result<()> {
        write_row(&mut self.calls, row)
    }

    fn edge(&mut self, row: &EdgeRow) -> io::Result<()> {
        write_row(&mut self.edges, row)
    }

    fn string(&mut self, row: &StringRow) -> io::Result<()> {
        write_row(&mut self.strings, row)
    }

    fn string_xref(&mut self, row: &StringXrefRow) -> io::Result<()> {
        write_row(&mut self.string_xrefs, row)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.functions.flush()?;
        self.blocks.flush()?;
        self.instructions.flush()?;
        self.calls.flush()?;
        self.edges.flush()?;
        self.strings.flush()?;
        self.string_xrefs.flush()
    }
}
