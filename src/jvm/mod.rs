//! JVM-side model used by the weaver
//!
//! There is no class file reading or writing here: methods come in and go out as instruction
//! buffers over symbolic names and descriptors.

mod access_flags;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
mod names;
pub mod verifier;
mod version;

pub use access_flags::*;
pub use code::{CompareMode, EqComparison, InvokeType, OrdComparison, ShiftType};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use version::*;
