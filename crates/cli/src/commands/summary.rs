use std::path::Path;

use anyhow::{Context, Result};
use chunkwise_core::analysis::blocks_in_function;
use chunkwise_core::Image;
use serde::Serialize;

use crate::commands::load_image;

#[derive(Debug, Serialize)]
pub struct FunctionSummary {
    pub name: String,
    pub entry: u64,
    pub chunks: usize,
    pub blocks: usize,
    pub instructions: usize,
}

/// Per-function chunk, block and instruction counts, by entry address.
pub fn function_summaries(image: &Image) -> Vec<FunctionSummary> {
    image
        .functions()
        .iter()
        .map(|f| {
            let blocks = blocks_in_function(image, f.id);
            FunctionSummary {
                name: f.name.clone(),
                entry: f.entry,
                chunks: f.chunk_count(),
                blocks: blocks.len(),
                instructions: blocks.iter().map(|b| b.instruction_count).sum(),
            }
        })
        .collect()
}

/// Show how the disassembler split the image into functions.
pub fn summary_command(input: &Path, json: bool) -> Result<()> {
    let image = load_image(input)?;
    let summaries = function_summaries(&image);

    if json {
        let serialized = serde_json::to_string_pretty(&summaries)
            .context("Failed to serialize function summary to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Image: {}", image.name());
    println!("Sections:");
    for section in image.sections() {
        println!(
            "  - {} {} ({} hanging)",
            section.name,
            section.range,
            image.hanging_count(section.range)
        );
    }
    println!("Functions ({}):", summaries.len());
    if summaries.is_empty() {
        println!("  (none)");
    }
    for s in &summaries {
        println!(
            "  - {} @0x{:x}: {} chunks, {} blocks, {} instructions",
            s.name, s.entry, s.chunks, s.blocks, s.instructions
        );
    }

    Ok(())
}
