//! Post-processing: bloom blur and the final composite

mod blur;
mod composite;

pub use blur::*;
pub use composite::*;
