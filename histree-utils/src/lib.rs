pub mod dump;
pub mod error;
pub mod queue;
pub mod sha256;

pub use sha256::{Sha256Agg, Sha256Digest};
