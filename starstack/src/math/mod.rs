pub mod dmat3;
pub mod statistics;

pub use dmat3::DMat3;
