use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chunkwise_core::Image;
use serde::Serialize;

use crate::commands::load_image;

/// One instruction no function owns.
#[derive(Debug, Serialize)]
pub struct HangingEntry {
    pub address: u64,
    pub size: u32,
    pub text: String,
}

/// Hanging code heads of `section`, in address order.
pub fn hanging_entries(image: &Image, section: &str) -> Result<Vec<HangingEntry>> {
    let range = image
        .section(section)
        .map(|s| s.range)
        .ok_or_else(|| anyhow!("Section '{}' not found in {}", section, image.name()))?;

    Ok(image
        .hanging(range)
        .filter_map(|address| image.insn(address))
        .map(|insn| HangingEntry {
            address: insn.address(),
            size: insn.record().size,
            text: insn.text(),
        })
        .collect())
}

/// List the hanging instructions of the image as loaded, before any repair.
pub fn hanging_command(input: &Path, section: &str, json: bool) -> Result<()> {
    let image = load_image(input)?;
    let entries = hanging_entries(&image, section)?;

    if json {
        let serialized = serde_json::to_string_pretty(&entries)
            .context("Failed to serialize hanging instructions to JSON")?;
        println!("{}", serialized);
    } else {
        println!("Hanging instructions in {} ({}):", section, entries.len());
        if entries.is_empty() {
            println!("  (none)");
            return Ok(());
        }
        for entry in entries {
            println!("  0x{:x}  {}", entry.address, entry.text);
        }
    }

    Ok(())
}
