use sprs::{CsMat, CsVecView, TriMat};

use crate::demux::error::{DemuxError, Result};

/// Sparse read-count matrix, rows = variants, columns = barcodes. Stored as
/// CSC so one barcode's covered variants can be walked without touching the
/// rest of the matrix. Built once from input and never mutated.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: CsMat<u32>,
}

impl CountMatrix {
    /// Build from (variant index, barcode index, count) triplets.
    /// Zero counts are dropped so "stored entry" always means coverage.
    pub fn from_triplets(
        n_variants: usize,
        n_barcodes: usize,
        entries: &[(usize, usize, u32)],
    ) -> Self {
        let mut tri = TriMat::new((n_variants, n_barcodes));
        for &(variant, barcode, count) in entries {
            if count > 0 {
                tri.add_triplet(variant, barcode, count);
            }
        }
        Self {
            counts: tri.to_csc(),
        }
    }

    pub fn n_variants(&self) -> usize {
        self.counts.rows()
    }

    pub fn n_barcodes(&self) -> usize {
        self.counts.cols()
    }

    /// Count at one (variant, barcode) cell. Indexes outside the matrix are
    /// lookup errors; in-range cells without a stored entry are genuine
    /// zeros under the sparse-coverage assumption.
    pub fn get(&self, variant: usize, barcode: usize) -> Result<u32> {
        if variant >= self.counts.rows() {
            return Err(DemuxError::VariantIndexOutOfRange {
                index: variant,
                count: self.counts.rows(),
            });
        }
        if barcode >= self.counts.cols() {
            return Err(DemuxError::BarcodeIndexOutOfRange {
                index: barcode,
                count: self.counts.cols(),
            });
        }
        Ok(self.counts.get(variant, barcode).copied().unwrap_or(0))
    }

    /// Nonzero counts for one barcode, ordered by variant index
    pub fn barcode_col(&self, barcode: usize) -> Result<CsVecView<'_, u32>> {
        self.counts
            .outer_view(barcode)
            .ok_or(DemuxError::BarcodeIndexOutOfRange {
                index: barcode,
                count: self.counts.cols(),
            })
    }

    /// All stored entries as (count, (variant, barcode))
    pub fn iter(&self) -> impl Iterator<Item = (&u32, (usize, usize))> {
        self.counts.iter()
    }

    /// Sum of all counts in the matrix
    pub fn total(&self) -> u64 {
        self.counts.data().iter().map(|&c| c as u64).sum()
    }
}
