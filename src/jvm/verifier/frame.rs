use super::{StackMapFrame, StackMapType, UninitializedRefType, VerificationType};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{BranchInstruction, Constant, Instruction, InvokeType};
use crate::jvm::model::Method;
use crate::jvm::{ArrayType, BaseType, BinaryName, FieldType, RefType, RenderDescriptor};
use crate::jvm::{UnqualifiedName, VerifierErrorKind};
use crate::util::{Offset, OffsetVec, Width};

/// Snapshot of the stack and local variables at a point in the bytecode
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in scope
    pub locals: OffsetVec<VerificationType>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType>,
}

/// What the frame computation needs to know about the method being analyzed
pub struct VerifierContext<'a, 'g> {
    pub class_graph: &'a ClassGraph<'g>,

    /// Class declaring the method
    pub this_class: &'a BinaryName,

    /// Return type of the method
    pub return_type: Option<&'a FieldType>,
}

type VType = VerificationType;

impl Frame {
    /// Frame on entry to a method: receiver, then parameters, then nothing on the stack
    pub fn entry(method: &Method) -> Frame {
        let mut locals = OffsetVec::new();
        if !method.is_static() {
            if method.is_constructor() && method.class != BinaryName::OBJECT {
                locals.push(VType::UninitializedThis);
            } else {
                locals.push(VType::Object(method.receiver_type()));
            }
        }
        for parameter in &method.descriptor.parameters {
            locals.push(VType::from(parameter.clone()));
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Frame at the start of an exception handler covering code with these locals
    pub fn handler(&self, catch_type: RefType) -> Frame {
        let mut stack = OffsetVec::new();
        stack.push(VType::Object(catch_type));
        Frame {
            locals: self.locals.clone(),
            stack,
        }
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// `insn_index` is the position of the instruction in its buffer (it identifies the
    /// uninitialized object created by a `new`).
    pub fn verify_instruction(
        &mut self,
        insn: &Instruction,
        insn_index: usize,
        context: &VerifierContext,
    ) -> Result<(), VerifierErrorKind> {
        verify_instruction(self, context, insn, insn_index)
    }

    /// Update the frame to reflect the effects of the given branching instruction
    pub fn verify_branch_instruction(
        &mut self,
        insn: &BranchInstruction,
        context: &VerifierContext,
    ) -> Result<(), VerifierErrorKind> {
        verify_branch_instruction(self, context, insn)
    }

    /// Merge another frame reaching the same instruction into this one
    ///
    /// Locals which disagree become `Top`, references generalize to their common super type.
    /// Stacks must agree in shape. Returns whether this frame changed.
    pub fn merge(&mut self, other: &Frame, class_graph: &ClassGraph) -> Result<bool, ()> {
        if self.stack.len() != other.stack.len()
            || self.stack.offset_len() != other.stack.offset_len()
        {
            return Err(());
        }
        let mut stack = OffsetVec::new();
        for ((_, _, t1), (_, _, t2)) in self.stack.iter().zip(other.stack.iter()) {
            match VType::merge(class_graph, t1, t2) {
                Some(merged) if merged.width() == t1.width() => {
                    stack.push(merged);
                }
                _ => return Err(()),
            }
        }

        let mut locals = OffsetVec::new();
        for (offset, _, existing) in self.locals.iter() {
            let merged = other
                .locals
                .get_offset(offset)
                .ok()
                .and_then(|incoming| VType::merge(class_graph, existing, incoming));
            match merged {
                Some(merged) => {
                    locals.push(merged);
                }
                None => {
                    for _ in 0..existing.width() {
                        locals.push(VType::Top);
                    }
                }
            }
        }
        trim_top_locals(&mut locals);

        let changed = stack != self.stack || locals != self.locals;
        self.stack = stack;
        self.locals = locals;
        Ok(changed)
    }

    /// Update the maximum locals and stack
    ///
    /// Only has an effect if the size of the locals or the size of the stack is greater than the
    /// previous maximum values.
    pub fn update_maximums(&self, max_locals: &mut Offset, max_stack: &mut Offset) {
        max_locals.0 = max_locals.0.max(self.locals.offset_len().0);
        max_stack.0 = max_stack.0.max(self.stack.offset_len().0);
    }

    /// Resolve the frame into the form written in a stack map table
    pub fn into_serializable(&self, byte_offsets: &[usize]) -> SerializableFrame {
        let mut locals: OffsetVec<StackMapType> = self
            .locals
            .iter()
            .map(|(_, _, t)| t.into_serializable(byte_offsets))
            .collect();
        while locals.last() == Some(&StackMapType::Top) {
            locals.pop();
        }
        SerializableFrame {
            locals,
            stack: self
                .stack
                .iter()
                .map(|(_, _, t)| t.into_serializable(byte_offsets))
                .collect(),
        }
    }
}

/// Frame in the form written in a stack map table
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct SerializableFrame {
    pub locals: OffsetVec<StackMapType>,
    pub stack: OffsetVec<StackMapType>,
}

impl SerializableFrame {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        match self.stack.len() {
            0 => {
                let this_locals_len = self.locals.len();
                let prev_locals_len = previous_frame.locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    if len_difference < 4 {
                        let this_is_prefix_of_prev = self
                            .locals
                            .iter()
                            .zip(previous_frame.locals.iter())
                            .all(|((_, _, t1), (_, _, t2))| t1 == t2);

                        if this_is_prefix_of_prev {
                            if len_difference == 0 {
                                return StackMapFrame::SameLocalsNoStack { offset_delta };
                            } else {
                                return StackMapFrame::ChopLocalsNoStack {
                                    offset_delta,
                                    chopped_k: len_difference as u8,
                                };
                            }
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4 {
                    let prev_is_prefix_of_this = previous_frame
                        .locals
                        .iter()
                        .zip(self.locals.iter())
                        .all(|((_, _, t1), (_, _, t2))| t1 == t2);

                    if prev_is_prefix_of_this {
                        return StackMapFrame::AppendLocalsNoStack {
                            offset_delta,
                            locals: self
                                .locals
                                .iter()
                                .skip(prev_locals_len)
                                .map(|(_, _, t)| t.clone())
                                .collect(),
                        };
                    }
                }
            }
            1 if self.locals == previous_frame.locals => {
                if let Some(stack) = self.stack.last() {
                    return StackMapFrame::SameLocalsOneStack {
                        offset_delta,
                        stack: stack.clone(),
                    };
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.iter().map(|(_, _, t)| t.clone()).collect(),
            locals: self.locals.iter().map(|(_, _, t)| t.clone()).collect(),
        }
    }
}

fn trim_top_locals(locals: &mut OffsetVec<VType>) {
    while locals.last() == Some(&VType::Top) {
        locals.pop();
    }
}

fn verify_instruction(
    frame: &mut Frame,
    context: &VerifierContext,
    insn: &Instruction,
    insn_index: usize,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    let class_graph = context.class_graph;
    let Frame {
        ref mut stack,
        ref mut locals,
    } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            stack.push(Integer);
        }
        Ldc(constant) => {
            stack.push(match constant {
                Constant::String(_) => Object(RefType::STRING),
                Constant::Class(_) => Object(RefType::CLASS),
                Constant::Integer(_) => Integer,
                Constant::Float(_) => Float,
                Constant::Long(_) | Constant::Double(_) => {
                    return Err(VerifierErrorKind::InvalidWidth(2))
                }
            });
        }
        Ldc2(constant) => {
            stack.push(match constant {
                Constant::String(_)
                | Constant::Class(_)
                | Constant::Integer(_)
                | Constant::Float(_) => return Err(VerifierErrorKind::InvalidWidth(1)),
                Constant::Long(_) => Long,
                Constant::Double(_) => Double,
            });
        }

        ILoad(offset) => {
            get_local_expecting_type(locals, *offset, Integer)?;
            stack.push(Integer);
        }
        LLoad(offset) => {
            get_local_expecting_type(locals, *offset, Long)?;
            stack.push(Long);
        }
        FLoad(offset) => {
            get_local_expecting_type(locals, *offset, Float)?;
            stack.push(Float);
        }
        DLoad(offset) => {
            get_local_expecting_type(locals, *offset, Double)?;
            stack.push(Double);
        }
        ALoad(offset) => {
            let typ = get_local(locals, *offset)?;
            if !typ.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            stack.push(typ);
        }

        IALoad => array_load(stack, FieldType::int(), Integer)?,
        LALoad => array_load(stack, FieldType::long(), Long)?,
        FALoad => array_load(stack, FieldType::float(), Float)?,
        DALoad => array_load(stack, FieldType::double(), Double)?,
        BALoad => array_load(stack, FieldType::byte(), Integer)?,
        CALoad => array_load(stack, FieldType::char(), Integer)?,
        SALoad => array_load(stack, FieldType::short(), Integer)?,
        AALoad => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            let array_type = pop_offset_vec(stack)?;
            match array_type {
                Null => stack.push(Null),
                Object(RefType::ObjectArray(arr)) => match arr.additional_dimensions {
                    0 => stack.push(Object(RefType::Object(arr.element_type))),
                    n => stack.push(Object(RefType::ObjectArray(ArrayType {
                        additional_dimensions: n - 1,
                        ..arr
                    }))),
                },
                Object(RefType::PrimitiveArray(arr)) if arr.additional_dimensions > 0 => {
                    stack.push(Object(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions: arr.additional_dimensions - 1,
                        ..arr
                    })))
                }
                _ => return Err(VerifierErrorKind::NotArrayType),
            };
        }

        IStore(offset) => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            update_local_type(locals, *offset, Integer);
        }
        FStore(offset) => {
            pop_offset_vec_expecting_type(stack, Float)?;
            update_local_type(locals, *offset, Float);
        }
        LStore(offset) => {
            pop_offset_vec_expecting_type(stack, Long)?;
            update_local_type(locals, *offset, Long);
        }
        DStore(offset) => {
            pop_offset_vec_expecting_type(stack, Double)?;
            update_local_type(locals, *offset, Double);
        }
        AStore(offset) => {
            let popped_type = pop_offset_vec(stack)?;
            if !popped_type.is_reference() && popped_type != ReturnAddress {
                return Err(VerifierErrorKind::InvalidType);
            }
            update_local_type(locals, *offset, popped_type);
        }

        IAStore => array_store(stack, FieldType::int(), Integer)?,
        LAStore => array_store(stack, FieldType::long(), Long)?,
        FAStore => array_store(stack, FieldType::float(), Float)?,
        DAStore => array_store(stack, FieldType::double(), Double)?,
        BAStore => array_store(stack, FieldType::byte(), Integer)?,
        CAStore => array_store(stack, FieldType::char(), Integer)?,
        SAStore => array_store(stack, FieldType::short(), Integer)?,
        AAStore => {
            let elem_type = pop_offset_vec(stack)?;
            pop_offset_vec_expecting_type(stack, Integer)?;
            let array_type = pop_offset_vec(stack)?;
            match array_type {
                Null => (),
                Object(array @ RefType::ObjectArray(_)) => {
                    let expected_elem_type = match array.element_type() {
                        Some(element_type) => VType::from(element_type),
                        None => return Err(VerifierErrorKind::NotArrayType),
                    };
                    if !VType::is_assignable(class_graph, &elem_type, &expected_elem_type) {
                        return Err(VerifierErrorKind::IncompatibleTypes(
                            elem_type,
                            expected_elem_type,
                        ));
                    }
                }
                _ => return Err(VerifierErrorKind::NotArrayType),
            }
        }

        Pop => {
            let _ = pop_offset_vec_expecting_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop_offset_vec(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let _ = pop_offset_vec_expecting_width(stack, 1)?;
                }

                // Form 2
                2 => (),

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup => {
            let arg1 = pop_offset_vec_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_offset_vec_expecting_width(stack, 1)?;
            let arg2 = pop_offset_vec_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_offset_vec_expecting_width(stack, 1)?;
            let arg2 = pop_offset_vec(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2 => {
            let arg1 = pop_offset_vec(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X1 => {
            let arg1 = pop_offset_vec(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_offset_vec_expecting_width(stack, 1)?;
                    let arg3 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    let arg2 = pop_offset_vec_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X2 => {
            let arg1 = pop_offset_vec(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_offset_vec_expecting_width(stack, 1)?;
                    let arg3 = pop_offset_vec(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_offset_vec_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        2 => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }
                2 => {
                    let arg2 = pop_offset_vec(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_offset_vec_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        2 => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }
                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Swap => {
            let arg1 = pop_offset_vec_expecting_width(stack, 1)?;
            let arg2 = pop_offset_vec_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            pop_offset_vec_expecting_type(stack, Integer)?;
            stack.push(Integer);
        }
        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => {
            pop_offset_vec_expecting_type(stack, Long)?;
            pop_offset_vec_expecting_type(stack, Long)?;
            stack.push(Long);
        }
        FAdd | FSub | FDiv | FMul | FRem => {
            pop_offset_vec_expecting_type(stack, Float)?;
            pop_offset_vec_expecting_type(stack, Float)?;
            stack.push(Float);
        }
        DAdd | DSub | DDiv | DMul | DRem => {
            pop_offset_vec_expecting_type(stack, Double)?;
            pop_offset_vec_expecting_type(stack, Double)?;
            stack.push(Double);
        }
        INeg | I2B | I2C | I2S => convert(stack, Integer, Integer)?,
        LNeg => convert(stack, Long, Long)?,
        FNeg => convert(stack, Float, Float)?,
        DNeg => convert(stack, Double, Double)?,
        LSh(_) => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            pop_offset_vec_expecting_type(stack, Long)?;
            stack.push(Long);
        }
        IInc(offset, _) => {
            get_local_expecting_type(locals, *offset, Integer)?;
        }
        I2L => convert(stack, Integer, Long)?,
        I2F => convert(stack, Integer, Float)?,
        I2D => convert(stack, Integer, Double)?,
        L2I => convert(stack, Long, Integer)?,
        L2F => convert(stack, Long, Float)?,
        L2D => convert(stack, Long, Double)?,
        F2I => convert(stack, Float, Integer)?,
        F2L => convert(stack, Float, Long)?,
        F2D => convert(stack, Float, Double)?,
        D2I => convert(stack, Double, Integer)?,
        D2L => convert(stack, Double, Long)?,
        D2F => convert(stack, Double, Float)?,
        LCmp => {
            pop_offset_vec_expecting_type(stack, Long)?;
            pop_offset_vec_expecting_type(stack, Long)?;
            stack.push(Integer);
        }
        FCmp(_) => {
            pop_offset_vec_expecting_type(stack, Float)?;
            pop_offset_vec_expecting_type(stack, Float)?;
            stack.push(Integer);
        }
        DCmp(_) => {
            pop_offset_vec_expecting_type(stack, Double)?;
            pop_offset_vec_expecting_type(stack, Double)?;
            stack.push(Integer);
        }
        GetStatic(field) => {
            stack.push(VType::from(field.descriptor.clone()));
        }
        PutStatic(field) => {
            let arg_type = pop_offset_vec(stack)?;
            expect_assignable(class_graph, arg_type, VType::from(field.descriptor.clone()))?;
        }
        GetField(field) => {
            let object_type_found = pop_offset_vec(stack)?;
            expect_assignable(
                class_graph,
                object_type_found,
                Object(RefType::Object(field.class.clone())),
            )?;
            stack.push(VType::from(field.descriptor.clone()));
        }
        PutField(field) => {
            let arg_type = pop_offset_vec(stack)?;
            expect_assignable(class_graph, arg_type, VType::from(field.descriptor.clone()))?;

            // Constructors may assign their own fields before calling the super constructor
            let object_type_found = pop_offset_vec(stack)?;
            if object_type_found != UninitializedThis || &field.class != context.this_class {
                expect_assignable(
                    class_graph,
                    object_type_found,
                    Object(RefType::Object(field.class.clone())),
                )?;
            }
        }
        Invoke(invoke_type, method) => {
            let is_init = method.name == UnqualifiedName::INIT;
            let desc = &method.descriptor;

            // Check that all the arguments match
            for expected_arg_type in desc.parameters.iter().rev() {
                let found_arg_type = pop_offset_vec(stack)?;
                let expected_arg_type = VType::from(expected_arg_type.clone());
                if !VType::is_assignable(class_graph, &found_arg_type, &expected_arg_type) {
                    log::error!(
                        "Incompatible argument types: found {:?} but expected {:?} (for {})",
                        found_arg_type,
                        expected_arg_type,
                        desc.render(),
                    );
                    return Err(VerifierErrorKind::IncompatibleTypes(
                        found_arg_type,
                        expected_arg_type,
                    ));
                }
            }

            if let (InvokeType::Special, true) = (invoke_type, is_init) {
                // Initialize
                let uninitialized = pop_offset_vec(stack)?;
                let initialized = match &uninitialized {
                    UninitializedThis => Object(RefType::Object(context.this_class.clone())),
                    Uninitialized(UninitializedRefType { class, .. }) => {
                        Object(RefType::Object(class.clone()))
                    }
                    _ => return Err(VerifierErrorKind::InvalidType),
                };
                replace_all(stack, &uninitialized, &initialized);
                replace_all(locals, &uninitialized, &initialized);
                if desc.return_type.is_some() {
                    return Err(VerifierErrorKind::InvalidType);
                }
            } else {
                let needs_receiver = !matches!(invoke_type, InvokeType::Static);

                // Pop off the receiver type
                if needs_receiver {
                    let found_receiver = pop_offset_vec(stack)?;
                    let expected = Object(RefType::Object(method.class.clone()));
                    if !VType::is_assignable(class_graph, &found_receiver, &expected) {
                        log::error!(
                            "Incompatible receiver: found {:?} but expected {:?} (for {})",
                            found_receiver,
                            expected,
                            desc.render(),
                        );
                        return Err(VerifierErrorKind::IncompatibleTypes(found_receiver, expected));
                    }
                }

                // Push the return type
                if let Some(return_type) = &desc.return_type {
                    stack.push(VType::from(return_type.clone()));
                }
            }
        }
        New(class) => {
            stack.push(Uninitialized(UninitializedRefType {
                class: class.clone(),
                new_index: insn_index,
            }));
        }
        NewArray(base_type) => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(ref_type) => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Ref(ref_type.clone()))));
        }
        ArrayLength => {
            match pop_offset_vec(stack)? {
                Null | Object(RefType::PrimitiveArray(_) | RefType::ObjectArray(_)) => (),
                _ => return Err(VerifierErrorKind::NotArrayType),
            }
            stack.push(Integer);
        }
        CheckCast(ref_type) => {
            match pop_offset_vec(stack)? {
                Null | Object(_) => (),
                _ => return Err(VerifierErrorKind::InvalidType),
            }
            stack.push(Object(ref_type.clone()));
        }
        InstanceOf(_) => {
            match pop_offset_vec(stack)? {
                Null | Object(_) => (),
                _ => return Err(VerifierErrorKind::InvalidType),
            }
            stack.push(Integer);
        }
        MonitorEnter | MonitorExit => match pop_offset_vec(stack)? {
            Null | Object(_) => (),
            _ => return Err(VerifierErrorKind::InvalidType),
        },
    }

    Ok(())
}

fn verify_branch_instruction(
    frame: &mut Frame,
    context: &VerifierContext,
    insn: &BranchInstruction,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;
    use VerificationType::*;

    let class_graph = context.class_graph;
    let return_type = context.return_type;
    let stack = &mut frame.stack;
    let locals = &frame.locals;

    match insn {
        If(_, _) => pop_offset_vec_expecting_type(stack, Integer)?,
        IfICmp(_, _) => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            pop_offset_vec_expecting_type(stack, Integer)?;
        }
        IfACmp(_, _) => {
            let atype_1 = pop_offset_vec(stack)?;
            let atype_2 = pop_offset_vec(stack)?;
            if !atype_1.is_reference() || !atype_2.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        IfNull(_, _) => {
            let atype = pop_offset_vec(stack)?;
            if !atype.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        Goto(_) => (),
        TableSwitch { .. } | LookupSwitch { .. } => {
            pop_offset_vec_expecting_type(stack, Integer)?
        }
        IReturn => {
            pop_offset_vec_expecting_type(stack, Integer)?;
            match return_type {
                Some(FieldType::Base(base_type)) if base_type.is_int_like() => (),
                _ => return Err(VerifierErrorKind::InvalidType),
            }
        }
        LReturn => {
            pop_offset_vec_expecting_type(stack, Long)?;
            if return_type != Some(&FieldType::Base(BaseType::Long)) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        FReturn => {
            pop_offset_vec_expecting_type(stack, Float)?;
            if return_type != Some(&FieldType::Base(BaseType::Float)) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        DReturn => {
            pop_offset_vec_expecting_type(stack, Double)?;
            if return_type != Some(&FieldType::Base(BaseType::Double)) {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        AReturn => {
            let atype = pop_offset_vec(stack)?;
            match return_type {
                Some(ret_type @ FieldType::Ref(_)) => {
                    expect_assignable(class_graph, atype, VType::from(ret_type.clone()))?
                }
                _ => return Err(VerifierErrorKind::InvalidType),
            }
        }
        Return => {
            if return_type.is_some() {
                return Err(VerifierErrorKind::InvalidType);
            }
        }
        AThrow => {
            let atype = pop_offset_vec(stack)?;
            match &atype {
                Null => (),
                Object(RefType::Object(exception_type))
                    if class_graph.is_throwable(exception_type) => {}
                _ => return Err(VerifierErrorKind::InvalidType),
            }
            stack.clear();
            stack.push(atype);
        }
        Jsr(_) => {
            stack.push(ReturnAddress);
        }
        Ret(offset) => {
            get_local_expecting_type(locals, *offset, ReturnAddress)?;
        }
    }

    Ok(())
}

fn replace_all(
    offset_vec: &mut OffsetVec<VType>,
    original: &VType,
    updated: &VType,
) {
    let mut replaced: OffsetVec<VType> = std::mem::take(offset_vec)
        .into_iter()
        .map(|(_, _, ty)| if ty == *original { updated.clone() } else { ty })
        .collect();

    std::mem::swap(offset_vec, &mut replaced);
}

fn array_load(
    stack: &mut OffsetVec<VType>,
    element_type: FieldType,
    loaded: VType,
) -> Result<(), VerifierErrorKind> {
    pop_offset_vec_expecting_type(stack, VType::Integer)?;
    match pop_offset_vec(stack)? {
        VType::Null => (),
        VType::Object(array) if array == RefType::array(element_type.clone()) => (),
        // `baload` is also used for `boolean[]`
        VType::Object(array)
            if element_type == FieldType::byte()
                && array == RefType::array(FieldType::boolean()) => {}
        _ => return Err(VerifierErrorKind::NotArrayType),
    }
    stack.push(loaded);
    Ok(())
}

fn array_store(
    stack: &mut OffsetVec<VType>,
    element_type: FieldType,
    stored: VType,
) -> Result<(), VerifierErrorKind> {
    pop_offset_vec_expecting_type(stack, stored)?;
    pop_offset_vec_expecting_type(stack, VType::Integer)?;
    match pop_offset_vec(stack)? {
        VType::Null => Ok(()),
        VType::Object(array) if array == RefType::array(element_type.clone()) => Ok(()),
        VType::Object(array)
            if element_type == FieldType::byte()
                && array == RefType::array(FieldType::boolean()) =>
        {
            Ok(())
        }
        _ => Err(VerifierErrorKind::NotArrayType),
    }
}

fn convert(
    stack: &mut OffsetVec<VType>,
    from: VType,
    to: VType,
) -> Result<(), VerifierErrorKind> {
    pop_offset_vec_expecting_type(stack, from)?;
    stack.push(to);
    Ok(())
}

fn expect_assignable(
    class_graph: &ClassGraph,
    found: VType,
    expected: VType,
) -> Result<(), VerifierErrorKind> {
    if VType::is_assignable(class_graph, &found, &expected) {
        Ok(())
    } else {
        Err(VerifierErrorKind::IncompatibleTypes(found, expected))
    }
}

fn get_local(locals: &OffsetVec<VType>, offset: u16) -> Result<VType, VerifierErrorKind> {
    locals
        .get_offset(Offset(offset as usize))
        .ok()
        .cloned()
        .ok_or(VerifierErrorKind::InvalidIndex)
}

fn get_local_expecting_type(
    locals: &OffsetVec<VType>,
    offset: u16,
    expected_type: VType,
) -> Result<(), VerifierErrorKind> {
    if get_local(locals, offset)? == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

fn update_local_type(locals: &mut OffsetVec<VType>, offset: u16, new_type: VType) {
    locals.set_offset_with_filler(Offset(offset as usize), new_type, || VType::Top);
}

fn pop_offset_vec(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack
        .pop()
        .map(|(_, _, typ)| typ)
        .ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_offset_vec_expecting_width(
    stack: &mut OffsetVec<VType>,
    expected_width: usize,
) -> Result<VType, VerifierErrorKind> {
    let typ = pop_offset_vec(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

fn pop_offset_vec_expecting_type(
    stack: &mut OffsetVec<VType>,
    expected_type: VType,
) -> Result<(), VerifierErrorKind> {
    let typ = pop_offset_vec(stack)?;
    if typ == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}
