//! Advice weaving
//!
//! Advice is code from static methods which gets run when a target method is entered or exited.
//! Every parameter of an advice method is bound to a value of the target (an argument, the return
//! value, a field, etc., see [`BindingRequest`]) and can write back to that value. Entry advice
//! can skip the target body and exit advice can run it again, based on the value the advice
//! returns (see [`ControlPredicate`]).
//!
//! Weaving happens in two phases. Bindings are first resolved against the target into code for
//! reading and writing the bound values. Only then is any code spliced, so that a bad binding
//! never produces a partially woven method. The spliced method always has its frames recomputed.

mod assigner;
mod binding;
mod declaration;
mod errors;
mod layout;
mod settings;
mod splicer;

pub use assigner::*;
pub use binding::*;
pub use declaration::*;
pub use errors::*;
pub use layout::*;
pub use settings::*;
pub use splicer::*;
