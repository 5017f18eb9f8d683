pub mod barcode_list;
pub mod count_matrix;
pub mod results;

pub use barcode_list::read_barcode_list_file;
pub use count_matrix::read_count_matrix_file;
pub use results::write_demux_results;
