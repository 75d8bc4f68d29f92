pub mod summary;
pub mod train;
