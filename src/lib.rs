//! Weave entry and exit advice into JVM method bodies
//!
//! The [`jvm`] module models method bodies as instruction buffers with symbolic labels and can
//! recompute their frames. The [`advice`] module binds advice methods to a target method and
//! splices them around its body (see [`advice::Weaver`]).

pub mod advice;
pub mod jvm;
pub mod util;
