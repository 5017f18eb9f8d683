use thiserror::Error;

/// Result alias for the demultiplexing core
pub type Result<T> = std::result::Result<T, DemuxError>;

/// Errors raised by the demultiplexing core. Any of these aborts the whole
/// run; partial EM state cannot be resumed from a half-completed round.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DemuxError {
    /// Variant key is not a well-formed "chrom:pos" pair
    #[error("malformed variant key '{key}': {reason}")]
    VariantKeyParse { key: String, reason: String },

    /// Barcode is not part of the run's barcode set
    #[error("unknown barcode '{0}'")]
    UnknownBarcode(String),

    /// Barcode appears more than once in the barcode list
    #[error("duplicate barcode '{0}' in barcode list")]
    DuplicateBarcode(String),

    /// Variant index outside the registry
    #[error("variant index {index} out of range ({count} variants registered)")]
    VariantIndexOutOfRange { index: usize, count: usize },

    /// Barcode index outside the barcode set
    #[error("barcode index {index} out of range ({count} barcodes)")]
    BarcodeIndexOutOfRange { index: usize, count: usize },

    /// Count matrix does not line up with the registry and barcode set
    #[error("count matrix shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    /// A count cell could not be parsed as a non-negative integer
    #[error("invalid count value '{value}' for variant '{variant}'")]
    InvalidCount { variant: String, value: String },

    /// Fewer than one cluster requested
    #[error("invalid cluster count {0}, need at least 1")]
    InvalidClusterCount(usize),

    /// Likelihood or re-estimation requested before genotype initialization
    #[error("genotype vectors have not been initialized")]
    GenotypesNotInitialized,

    /// Beta prior could not be constructed from the global count totals
    #[error("invalid beta prior parameters alpha={alpha}, beta={beta}")]
    BetaParams { alpha: f64, beta: f64 },
}
