pub mod command;
pub mod demux;
pub mod fileformat;

pub use demux::DemuxError;
pub use demux::EmDriver;
pub use demux::EmParams;
pub use demux::GenotypeModel;
pub use demux::VariantRegistry;
