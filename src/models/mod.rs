pub mod dataset;
pub mod summary;
pub mod table;
