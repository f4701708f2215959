use crate::jvm;
use std::fmt;

/// Distinguishable reasons for which weaving can fail
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Advice parameter with no binding, or with more than one
    DuplicateOrMissingBindingAnnotation,

    /// Advice parameter type doesn't match the type of the value it is bound to (in either
    /// direction, for a writable binding)
    IllegalTypeAssignment,

    /// Skip or repeat predicate which can't be checked against the advice's return type
    IllegalPrimitiveControlValue,

    /// Binding or control flow which is unsafe while the receiver is uninitialized
    IllegalOnConstructor,

    /// Woven code failed frame computation
    InternalStackInconsistency,

    /// Binding whose value doesn't exist for this target or advice
    UnresolvedBinding,

    /// Inline advice code writes to a parameter bound read-only
    IllegalWriteToReadOnly,

    /// Writable binding on advice which is called instead of inlined
    WritableInDelegation,

    /// Target method (or inline advice method) without a body
    AbstractOrNative,

    /// Target method (or inline advice method) whose own body fails frame computation
    InvalidTargetCode,

    /// Advice method which isn't `static`
    NonStaticAdvice,
}

/// Failure to weave advice into a method
///
/// Nothing is produced when weaving fails: the target method is only ever replaced whole.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,

    /// Offending target, advice method and parameter
    pub context: String,

    /// Underlying bytecode-level error, if there is one
    pub cause: Option<jvm::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Error {
        Error {
            kind,
            context: context.into(),
            cause: None,
        }
    }

    pub fn caused_by(kind: ErrorKind, context: impl Into<String>, cause: jvm::Error) -> Error {
        Error {
            kind,
            context: context.into(),
            cause: Some(cause),
        }
    }
}

/// Bytecode-level errors arising outside of the target's own code are defects in woven code
impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::caused_by(
            ErrorKind::InternalStackInconsistency,
            "malformed woven code",
            err,
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            ErrorKind::DuplicateOrMissingBindingAnnotation => {
                "advice parameter needs exactly one binding"
            }
            ErrorKind::IllegalTypeAssignment => "illegal assignment",
            ErrorKind::IllegalPrimitiveControlValue => "illegal control value",
            ErrorKind::IllegalOnConstructor => "not allowed on a constructor",
            ErrorKind::InternalStackInconsistency => "inconsistent stack in woven code",
            ErrorKind::UnresolvedBinding => "unresolved binding",
            ErrorKind::IllegalWriteToReadOnly => "write to a read-only binding",
            ErrorKind::WritableInDelegation => "writable binding on delegated advice",
            ErrorKind::AbstractOrNative => "method has no code",
            ErrorKind::InvalidTargetCode => "method code fails verification",
            ErrorKind::NonStaticAdvice => "advice method must be static",
        };
        f.write_str(description)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.context)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
