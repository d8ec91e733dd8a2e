//! Backend abstraction layer
//!
//! Provides the handle-based [`GraphicsBackend`] trait plus two implementations:
//! [`WgpuBackend`] for the real GPU and [`RecordingBackend`] for tests.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use recording::{Command, RecordingBackend};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
