//! Semantic representation of the members weaving reads and rewrites

mod member;
mod method;

pub use member::*;
pub use method::*;
