use super::code::Label;
use super::verifier::{Frame, VerificationType};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Two label entries claim the same label
    DuplicateLabel(Label),

    /// A label is referred to (by a jump or an exception table entry) but never placed
    UnplacedLabel(Label),

    /// Exception table entry whose end is placed before its start
    InvalidTryCatchRange(Label, Label),

    /// Local variable slots would no longer fit in a `u16`
    LocalsOverflow(usize),

    /// Operand stack would no longer fit in a `u16`
    MaxStackOverflow(usize),

    /// Error trying to verify
    VerifierError {
        /// Position in the instruction buffer
        index: usize,
        instruction: String,
        kind: VerifierErrorKind,
    },

    /// Two control-flow paths reach the same instruction with frames that cannot be merged
    IncompatibleFrames(usize, Frame, Frame),

    /// The frame fixpoint did not converge
    FixpointLimit(usize),
}

#[derive(Debug)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    NotArrayType,
    InvalidIndex,
    InvalidType,
    IncompatibleTypes(VerificationType, VerificationType),

    /// Control runs past the last instruction
    FallsOffEnd,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateLabel(label) => write!(f, "label {} is placed twice", label),
            Error::UnplacedLabel(label) => write!(f, "label {} is never placed", label),
            Error::InvalidTryCatchRange(start, end) => {
                write!(f, "protected range {}..{} ends before it starts", start, end)
            }
            Error::LocalsOverflow(locals) => write!(f, "{} local slots do not fit", locals),
            Error::MaxStackOverflow(stack) => write!(f, "stack of {} slots does not fit", stack),
            Error::VerifierError {
                index,
                instruction,
                kind,
            } => write!(f, "{:?} at #{} ({})", kind, index, instruction),
            Error::IncompatibleFrames(index, existing, incoming) => write!(
                f,
                "incompatible frames at #{}: {:?} and {:?}",
                index, existing, incoming
            ),
            Error::FixpointLimit(iterations) => {
                write!(f, "frames did not converge after {} iterations", iterations)
            }
        }
    }
}

impl std::error::Error for Error {}
