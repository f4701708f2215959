//! Bytecode verification utilities
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! Knowing the frame at a point in the code makes it possible to check that the next instruction
//! makes sense (eg. `dadd` only makes sense if the top two elements on the stack are of type
//! `double`). The "types" used in verification (represented using [`VerificationType`]) are
//! slightly augmented to take into account initialization, null, and unusable local slots.
//!
//! Splicing advice into a method invalidates whatever frames the method had, so they are always
//! recomputed from scratch with [`FrameComputer`]: a forward data-flow fix-point over the whole
//! instruction buffer, seeded from the method descriptor. The result carries the maximum stack
//! and locals, and can be compressed into a stack map table (see
//! [`ComputedFrames::stack_map_table`]).
//!
//! See [the JVM specification][0] for the rules being followed.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod recompute;
mod stack_map;
mod types;

pub use frame::*;
pub use recompute::*;
pub use stack_map::*;
pub use types::*;
