pub mod barcodes;
pub mod counts;
pub mod em;
pub mod error;
pub mod genotype;
pub mod variants;

pub use barcodes::BarcodeSet;
pub use counts::CountMatrix;
pub use em::DEFAULT_ASSIGN_THRESHOLD;
pub use em::DEFAULT_ROUNDS;
pub use em::EmDriver;
pub use em::EmParams;
pub use error::DemuxError;
pub use genotype::GenotypeModel;
pub use genotype::GENOTYPE_EPS;
pub use variants::Variant;
pub use variants::VariantRegistry;
