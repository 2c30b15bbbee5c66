//! Hash algorithm implementations.

mod dct;
mod mean;

pub use dct::DctHasher;
pub(crate) use dct::fingerprint_from_luma;
pub use mean::MeanHasher;
