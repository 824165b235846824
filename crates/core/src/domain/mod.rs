pub mod analysis;
pub mod metric;
