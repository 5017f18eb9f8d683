use std::fs::read_to_string;
use std::path::Path;

use anyhow::Context;

use crate::demux::BarcodeSet;

/// Load validated cell barcodes from a line-separated text file.
/// Blank lines are skipped; duplicates are a fatal error since the barcode
/// set is the canonical row index for all per-cell matrices.
pub fn read_barcode_list_file(path: &Path) -> anyhow::Result<BarcodeSet> {
    let content = read_to_string(path)
        .with_context(|| format!("failed to read barcode list {}", path.display()))?;
    let names = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from);
    let set = BarcodeSet::from_names(names)
        .with_context(|| format!("invalid barcode list {}", path.display()))?;
    Ok(set)
}
