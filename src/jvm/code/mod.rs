//! Method bodies as mutable instruction buffers
//!
//! Code is kept at the level of individual instructions and labels (no basic blocks), which is
//! the granularity at which advice gets spliced into a method.

mod buffer;
mod instructions;
mod label;
mod remap;

pub use buffer::*;
pub use instructions::*;
pub use label::*;
pub use remap::*;
