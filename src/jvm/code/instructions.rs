//! This module contains the AST of JVM bytecode as it is stored in an instruction buffer. The
//! representation is slightly different from the usual presentation to make it more convenient to
//! rewrite bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches and also simplifies tasks like inverting a
//!     branch condition.
//!
//!   - `goto_w` is folded into `goto`, and `ldc_w` into `ldc`
//!

use super::Label;
use crate::jvm::model::{FieldRef, MethodRef};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use std::ops::Not;

/// Loadable constants (for `ldc` and `ldc2_w`)
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType),
}

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(Constant), // covers both `ldc` and `ldc_w`
    Ldc2(Constant),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType),
    ArrayLength,
    CheckCast(RefType),
    InstanceOf(RefType),
    MonitorEnter,
    MonitorExit,
}

impl Instruction {
    /// Load a local variable of the given type
    pub fn load(field_type: &FieldType, index: u16) -> Instruction {
        match field_type {
            FieldType::Base(BaseType::Long) => Instruction::LLoad(index),
            FieldType::Base(BaseType::Float) => Instruction::FLoad(index),
            FieldType::Base(BaseType::Double) => Instruction::DLoad(index),
            FieldType::Base(_) => Instruction::ILoad(index),
            FieldType::Ref(_) => Instruction::ALoad(index),
        }
    }

    /// Store into a local variable of the given type
    pub fn store(field_type: &FieldType, index: u16) -> Instruction {
        match field_type {
            FieldType::Base(BaseType::Long) => Instruction::LStore(index),
            FieldType::Base(BaseType::Float) => Instruction::FStore(index),
            FieldType::Base(BaseType::Double) => Instruction::DStore(index),
            FieldType::Base(_) => Instruction::IStore(index),
            FieldType::Ref(_) => Instruction::AStore(index),
        }
    }

    /// Load an element from an array whose elements have the given type
    pub fn array_load(element_type: &FieldType) -> Instruction {
        match element_type {
            FieldType::Base(BaseType::Int) => Instruction::IALoad,
            FieldType::Base(BaseType::Long) => Instruction::LALoad,
            FieldType::Base(BaseType::Float) => Instruction::FALoad,
            FieldType::Base(BaseType::Double) => Instruction::DALoad,
            FieldType::Base(BaseType::Byte | BaseType::Boolean) => Instruction::BALoad,
            FieldType::Base(BaseType::Char) => Instruction::CALoad,
            FieldType::Base(BaseType::Short) => Instruction::SALoad,
            FieldType::Ref(_) => Instruction::AALoad,
        }
    }

    /// Push the default value of a type (what a field of that type is initialized to)
    pub fn push_default(field_type: &FieldType) -> Instruction {
        match field_type {
            FieldType::Base(BaseType::Long) => Instruction::LConst0,
            FieldType::Base(BaseType::Float) => Instruction::FConst0,
            FieldType::Base(BaseType::Double) => Instruction::DConst0,
            FieldType::Base(_) => Instruction::IConst0,
            FieldType::Ref(_) => Instruction::AConstNull,
        }
    }

    /// Push an integer constant using the shortest encoding
    pub fn push_int(value: i32) -> Instruction {
        match value {
            -1 => Instruction::IConstM1,
            0 => Instruction::IConst0,
            1 => Instruction::IConst1,
            2 => Instruction::IConst2,
            3 => Instruction::IConst3,
            4 => Instruction::IConst4,
            5 => Instruction::IConst5,
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    Instruction::BiPush(byte)
                } else if let Ok(short) = i16::try_from(value) {
                    Instruction::SiPush(short)
                } else {
                    Instruction::Ldc(Constant::Integer(value))
                }
            }
        }
    }

    /// Discard a value of the given width from the top of the stack
    pub fn pop_width(width: usize) -> Instruction {
        if width == 2 {
            Instruction::Pop2
        } else {
            Instruction::Pop
        }
    }

    /// Local variable read or written by this instruction
    pub fn local_variable(&self) -> Option<u16> {
        match self {
            Instruction::ILoad(idx)
            | Instruction::LLoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::LStore(idx)
            | Instruction::FStore(idx)
            | Instruction::DStore(idx)
            | Instruction::AStore(idx)
            | Instruction::IInc(idx, _) => Some(*idx),
            _ => None,
        }
    }

    /// Mutable access to the local variable read or written by this instruction
    pub fn local_variable_mut(&mut self) -> Option<&mut u16> {
        match self {
            Instruction::ILoad(idx)
            | Instruction::LLoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::LStore(idx)
            | Instruction::FStore(idx)
            | Instruction::DStore(idx)
            | Instruction::AStore(idx)
            | Instruction::IInc(idx, _) => Some(idx),
            _ => None,
        }
    }

    /// Local variable written to by this instruction, along with the width written
    pub fn local_variable_write(&self) -> Option<(u16, usize)> {
        match self {
            Instruction::IStore(idx)
            | Instruction::FStore(idx)
            | Instruction::AStore(idx)
            | Instruction::IInc(idx, _) => Some((*idx, 1)),
            Instruction::LStore(idx) | Instruction::DStore(idx) => Some((*idx, 2)),
            _ => None,
        }
    }

    /// Number of local variable slots touched by this instruction, starting from the
    /// `local_variable` index
    pub fn local_variable_width(&self) -> usize {
        match self {
            Instruction::LLoad(_)
            | Instruction::DLoad(_)
            | Instruction::LStore(_)
            | Instruction::DStore(_) => 2,
            _ => 1,
        }
    }
}

/// Size in bytes of the instruction in a class file
impl Width for Instruction {
    fn width(&self) -> usize {
        match self {
            Instruction::ILoad(0..=3)
            | Instruction::LLoad(0..=3)
            | Instruction::FLoad(0..=3)
            | Instruction::DLoad(0..=3)
            | Instruction::ALoad(0..=3)
            | Instruction::IStore(0..=3)
            | Instruction::LStore(0..=3)
            | Instruction::FStore(0..=3)
            | Instruction::DStore(0..=3)
            | Instruction::AStore(0..=3) => 1,

            Instruction::BiPush(_)
            | Instruction::ILoad(4..=255)
            | Instruction::LLoad(4..=255)
            | Instruction::FLoad(4..=255)
            | Instruction::DLoad(4..=255)
            | Instruction::ALoad(4..=255)
            | Instruction::IStore(4..=255)
            | Instruction::LStore(4..=255)
            | Instruction::FStore(4..=255)
            | Instruction::DStore(4..=255)
            | Instruction::AStore(4..=255)
            | Instruction::NewArray(_) => 2,

            // There is no constant pool, so `ldc` is always assumed to need `ldc_w`
            Instruction::SiPush(_)
            | Instruction::Ldc(_)
            | Instruction::Ldc2(_)
            | Instruction::IInc(0..=255, -128..=127)
            | Instruction::GetStatic(_)
            | Instruction::PutStatic(_)
            | Instruction::GetField(_)
            | Instruction::PutField(_)
            | Instruction::Invoke(InvokeType::Special, _)
            | Instruction::Invoke(InvokeType::Static, _)
            | Instruction::Invoke(InvokeType::Virtual, _)
            | Instruction::New(_)
            | Instruction::ANewArray(_)
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_) => 3,

            Instruction::ILoad(_)
            | Instruction::LLoad(_)
            | Instruction::FLoad(_)
            | Instruction::DLoad(_)
            | Instruction::ALoad(_)
            | Instruction::IStore(_)
            | Instruction::LStore(_)
            | Instruction::FStore(_)
            | Instruction::DStore(_)
            | Instruction::AStore(_) => 4,

            Instruction::Invoke(InvokeType::Interface(_), _) => 5,

            Instruction::IInc(_, _) => 6,

            _ => 1,
        }
    }
}

/// Branching JVM bytecode instruction
///
/// Every instruction which can transfer control somewhere other than the next instruction lives
/// here, including the legacy `jsr`/`ret` subroutine pair. Those two are kept opaque: their
/// labels and locals are relocated like any other, but subroutines are never inlined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction {
    If(OrdComparison, Label), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Label), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Label), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Label), // covers `ifnull`, `ifnonnull`
    Goto(Label),
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Label,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Label>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Label,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Label)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    Jsr(Label),
    Ret(u16),
}

impl BranchInstruction {
    /// Does control flow continue to the next instruction (at least some of the time)?
    ///
    /// For `jsr`, the next instruction is where the matching `ret` returns to.
    pub fn falls_through(&self) -> bool {
        match self {
            BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _)
            | BranchInstruction::Jsr(_) => true,

            BranchInstruction::Goto(_)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::Ret(_) => false,
        }
    }

    /// Labels this instruction can jump to (excluding the fallthrough)
    pub fn jump_targets(&self) -> Vec<Label> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::Jsr(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::Ret(_) => vec![],
        }
    }

    pub fn map_labels(&self, map_label: impl Fn(Label) -> Label) -> BranchInstruction {
        use BranchInstruction::*;

        match self {
            If(op, lbl) => If(*op, map_label(*lbl)),
            IfICmp(op, lbl) => IfICmp(*op, map_label(*lbl)),
            IfACmp(op, lbl) => IfACmp(*op, map_label(*lbl)),
            IfNull(op, lbl) => IfNull(*op, map_label(*lbl)),
            Goto(lbl) => Goto(map_label(*lbl)),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(*default),
                low: *low,
                targets: targets.iter().map(|lbl| map_label(*lbl)).collect(),
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(*default),
                targets: targets
                    .iter()
                    .map(|(key, lbl)| (*key, map_label(*lbl)))
                    .collect(),
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            Jsr(lbl) => Jsr(map_label(*lbl)),
            Ret(idx) => Ret(*idx),
        }
    }

    /// Is this one of the `*return` instructions?
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            BranchInstruction::IReturn
                | BranchInstruction::LReturn
                | BranchInstruction::FReturn
                | BranchInstruction::DReturn
                | BranchInstruction::AReturn
                | BranchInstruction::Return
        )
    }

    /// Return instruction for a method with the given return type
    pub fn return_for(return_type: Option<&FieldType>) -> BranchInstruction {
        match return_type {
            None => BranchInstruction::Return,
            Some(FieldType::Base(BaseType::Long)) => BranchInstruction::LReturn,
            Some(FieldType::Base(BaseType::Float)) => BranchInstruction::FReturn,
            Some(FieldType::Base(BaseType::Double)) => BranchInstruction::DReturn,
            Some(FieldType::Base(_)) => BranchInstruction::IReturn,
            Some(FieldType::Ref(_)) => BranchInstruction::AReturn,
        }
    }

    /// Size in bytes of the instruction in a class file, if it starts at the given offset
    ///
    /// The offset only matters for the switch instructions, whose operands are 4-byte aligned.
    /// Jumps are assumed to fit in a signed 16-bit offset.
    pub fn encoded_width(&self, offset: usize) -> usize {
        let padding = (4 - (offset + 1) % 4) % 4;
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,

            BranchInstruction::Ret(0..=255) => 2,
            BranchInstruction::Ret(_) => 4,

            BranchInstruction::Goto(_)
            | BranchInstruction::Jsr(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::TableSwitch { targets, .. } => 1 + padding + 4 * (3 + targets.len()),

            BranchInstruction::LookupSwitch { targets, .. } => {
                1 + padding + 8 * (1 + targets.len())
            }
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}
