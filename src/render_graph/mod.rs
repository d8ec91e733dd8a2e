//! Render Graph System
//!
//! Passes are added in execution order and declare the resources they read and
//! write. Compiling validates that order, the executor allocates the textures and
//! drives every pass through prepare, execute and release.

pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
