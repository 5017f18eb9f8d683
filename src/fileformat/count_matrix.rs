use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use csv::ReaderBuilder;

use crate::demux::{BarcodeSet, CountMatrix, DemuxError, VariantRegistry};

/// Read one allele count matrix from CSV. Layout as produced by the
/// upstream pileup step: header = key column name followed by barcode
/// names, each data row = "chrom:pos" key followed by one count per column.
///
/// Every variant key is registered into the shared registry in file order,
/// so the first matrix read defines the canonical variant indexing.
/// Columns are aligned to the run's barcode set; a listed barcode missing
/// from the header is a lookup error (never silently zero-filled), while
/// extra columns are ignored with a warning.
pub fn read_count_matrix_file(
    path: &Path,
    registry: &mut VariantRegistry,
    barcodes: &BarcodeSet,
) -> anyhow::Result<CountMatrix> {
    let file = File::open(path)
        .with_context(|| format!("failed to open count matrix {}", path.display()))?;
    read_count_matrix(file, registry, barcodes)
        .with_context(|| format!("while reading count matrix {}", path.display()))
}

pub fn read_count_matrix<R: Read>(
    reader: R,
    registry: &mut VariantRegistry,
    barcodes: &BarcodeSet,
) -> anyhow::Result<CountMatrix> {
    let mut csv = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = csv.headers()?.clone();
    if headers.len() < 2 {
        bail!("count matrix needs a key column and at least one barcode column");
    }

    // map each data column onto the barcode set
    let mut col_map: Vec<Option<usize>> = Vec::with_capacity(headers.len() - 1);
    let mut seen = vec![false; barcodes.len()];
    for name in headers.iter().skip(1) {
        match barcodes.index_of(name) {
            Ok(i) => {
                seen[i] = true;
                col_map.push(Some(i));
            }
            Err(_) => {
                log::warn!("ignoring count matrix column '{}', not in barcode list", name);
                col_map.push(None);
            }
        }
    }
    for (i, covered) in seen.iter().enumerate() {
        if !covered {
            let name = barcodes.get(i).unwrap_or("").to_string();
            return Err(DemuxError::UnknownBarcode(name).into());
        }
    }

    let mut entries: Vec<(usize, usize, u32)> = Vec::new();
    for record in csv.records() {
        let record = record?;
        let key = record.get(0).unwrap_or("");
        if record.len() != headers.len() {
            bail!(
                "row '{}' has {} fields, expected {}",
                key,
                record.len(),
                headers.len()
            );
        }
        let variant = registry.register(key)?;
        for (field, col) in record.iter().skip(1).zip(col_map.iter()) {
            let Some(barcode) = *col else { continue };
            let count: u32 = field
                .trim()
                .parse()
                .map_err(|_| DemuxError::InvalidCount {
                    variant: key.to_string(),
                    value: field.to_string(),
                })?;
            if count > 0 {
                entries.push((variant, barcode, count));
            }
        }
    }

    Ok(CountMatrix::from_triplets(
        registry.len(),
        barcodes.len(),
        &entries,
    ))
}
