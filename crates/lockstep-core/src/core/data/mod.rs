//! Result containers produced by procedures and modules and kept in the item store.

pub mod data1d;
pub mod histogram;

pub use data1d::Data1D;
pub use histogram::Histogram1D;
