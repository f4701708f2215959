use super::binding::{element_type, overlaps_parameter};
use super::{
    Advice, AdviceRole, AdviceSet, BindingResolver, ControlPredicate, Error, ErrorKind,
    ReservedSlot, ResolvedAssignment, ResolvedBinding, SlotLayout, WeaveSettings,
};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{
    relocate, BranchInstruction, CompareMode, EqComparison, Insn, Instruction, InstructionBuffer,
    InvokeType, Label, LabelGenerator, LocalShift, OrdComparison, TryCatchBlock,
};
use crate::jvm::model::Method;
use crate::jvm::verifier::{ComputedFrames, Frame, FrameComputer, StackMapFrame};
use crate::jvm::{BaseType, FieldType};
use crate::util::Width;

/// Method with advice woven in, along with its recomputed frames
#[derive(Debug)]
pub struct WovenMethod {
    /// Copy of the target, with its code replaced
    pub method: Method,

    pub frames: ComputedFrames,

    /// Stack map table, when the class file version needs one
    pub stack_map: Option<Vec<StackMapFrame>>,
}

impl WovenMethod {
    pub fn code(&self) -> Option<&InstructionBuffer> {
        self.method.code.as_ref()
    }

    /// Stack map table entries, or no entries when no table is needed
    pub fn stack_map_frames(&self) -> &[StackMapFrame] {
        self.stack_map.as_deref().unwrap_or(&[])
    }
}

/// Splices advice into method bodies
///
/// Given advice with both entry and exit parts, the woven code looks like this:
///
/// ```text
///       <reserved slots set to default values>
///       <entry advice>
///       <skip check>                           ──▶ normal_exit
/// body: <copy arguments>                       (unless `backup_arguments` is off)
///       <original body, on the copies, returns replaced by:
///          store return value, goto normal_exit>
///       <handler: store thrown, goto exit>     (only with `on_throwable`)
/// normal_exit:
///       <clear thrown>                         (only with `on_throwable`)
/// exit: <exit advice>
///       <repeat check>                         ──▶ body
///       <rethrow if thrown is not null>        (only with `on_throwable`)
///       <return stored return value>
/// ```
///
/// Each advice block is itself either the advice code (with its parameters copied into the
/// advice's own locals first and written back after) or a call to the advice method. It ends
/// with the assignments of the value the advice returned.
pub struct Weaver<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    settings: WeaveSettings,
}

/// Advice with bindings resolved and code checked
struct PreparedAdvice<'x> {
    advice: &'x Advice,
    bindings: Vec<ResolvedBinding>,
    assignments: Vec<ResolvedAssignment>,

    /// Frames of the advice code (only for inline advice)
    frames: Option<ComputedFrames>,
}

impl<'a, 'g> Weaver<'a, 'g> {
    pub fn new(class_graph: &'a ClassGraph<'g>, settings: WeaveSettings) -> Weaver<'a, 'g> {
        Weaver {
            class_graph,
            settings,
        }
    }

    pub fn settings(&self) -> &WeaveSettings {
        &self.settings
    }

    /// Weave one set of advice into a method
    pub fn weave(&self, target: &Method, advice: &AdviceSet) -> Result<WovenMethod, Error> {
        self.weave_all(target, std::slice::from_ref(advice))
    }

    /// Weave several sets of advice into a method
    ///
    /// The first set is innermost: its entry advice runs last and its exit advice first.
    pub fn weave_all(&self, target: &Method, advice: &[AdviceSet]) -> Result<WovenMethod, Error> {
        let mut method = target.clone();
        for advice_set in advice {
            let code = self.weave_code(&method, advice_set)?;
            method.code = Some(code);
        }
        self.finish(method)
    }

    fn frame_computer(&self) -> FrameComputer<'a, 'g> {
        FrameComputer::new(self.class_graph, self.settings.max_fixpoint_iterations)
    }

    fn finish(&self, method: Method) -> Result<WovenMethod, Error> {
        let code = method.code.as_ref().ok_or_else(|| no_code(&method))?;
        let frames = self.frame_computer().compute(&method, code).map_err(|err| {
            Error::caused_by(
                ErrorKind::InternalStackInconsistency,
                format!("woven {}.{}", method.class, method.signature()),
                err,
            )
        })?;
        let stack_map = if self.settings.emit_stack_map() {
            Some(frames.stack_map_table(code))
        } else {
            None
        };
        log::debug!(
            "Woven {}.{}: {} instructions, max stack {}, max locals {}",
            method.class,
            method.signature(),
            code.len(),
            frames.max_stack,
            frames.max_locals
        );

        Ok(WovenMethod {
            method,
            frames,
            stack_map,
        })
    }

    /// Produce the code of the target with one set of advice spliced in
    fn weave_code(&self, target: &Method, advice: &AdviceSet) -> Result<InstructionBuffer, Error> {
        let body = target.code.as_ref().ok_or_else(|| no_code(target))?;
        self.check_declarations(target, advice)?;

        let body_frames = self.frame_computer().compute(target, body).map_err(|err| {
            Error::caused_by(
                ErrorKind::InvalidTargetCode,
                format!("{}.{}", target.class, target.signature()),
                err,
            )
        })?;
        let layout = SlotLayout::new(target, body, advice)?;
        let resolver = BindingResolver::new(self.class_graph, target, &layout);

        let entry = match &advice.entry {
            Some(entry) => Some(self.prepare(&resolver, &entry.advice, AdviceRole::Entry)?),
            None => None,
        };
        let exit = match &advice.exit {
            Some(exit) => Some(self.prepare(&resolver, &exit.advice, AdviceRole::Exit)?),
            None => None,
        };

        let mut out = InstructionBuffer::new();
        let mut try_catch_blocks: Vec<TryCatchBlock> = vec![];
        let body_start = out.fresh_label();
        let body_end = out.fresh_label();
        let normal_exit = out.fresh_label();
        let exit_start = out.fresh_label();
        let return_label = out.fresh_label();
        let skip_label = out.fresh_label();

        for reserved in layout.reserved_slots() {
            out.push(Instruction::push_default(&reserved.value_type));
            out.push(Instruction::store(&reserved.value_type, reserved.slot));
        }

        // Entry
        if let Some(entry) = &entry {
            self.splice_advice(
                &mut out,
                &mut try_catch_blocks,
                entry,
                layout.enter.as_ref(),
                &layout,
            )?;
        }
        if let Some(entry_advice) = &advice.entry {
            if let (Some(predicate), Some(enter)) = (&entry_advice.skip_on, &layout.enter) {
                let target_label = if exit.is_some() { normal_exit } else { skip_label };
                match entry_advice.skip_on_index {
                    None => {
                        out.push(Instruction::load(&enter.value_type, enter.slot));
                        jump_if_matches(&mut out, predicate, &enter.value_type, target_label);
                    }
                    Some(index) => {
                        let element = element_type(&enter.value_type)
                            .ok_or_else(|| not_an_array(&entry_advice.advice, index))?;
                        let position = i32::try_from(index)
                            .map_err(|_| not_an_array(&entry_advice.advice, index))?;
                        let no_array = out.fresh_label();
                        out.push(Instruction::load(&enter.value_type, enter.slot));
                        out.push_branch(BranchInstruction::IfNull(EqComparison::EQ, no_array));
                        out.push(Instruction::load(&enter.value_type, enter.slot));
                        out.push(Instruction::push_int(position));
                        out.push(Instruction::array_load(&element));
                        jump_if_matches(&mut out, predicate, &element, target_label);
                        out.place_label(no_array);
                    }
                }
            }
        }

        // Body
        out.place_label(body_start);
        for (argument, copy) in &layout.argument_copies {
            out.push(Instruction::load(&copy.value_type, *argument));
            out.push(Instruction::store(&copy.value_type, copy.slot));
        }
        let relocated = relocate(body, layout.body_shift(), &mut out)?;
        for (index, insn) in relocated.insns.into_iter().enumerate() {
            match insn {
                Insn::Branch(branch) if branch.is_return() && exit.is_some() => {
                    self.leave_block(
                        &mut out,
                        body_frames.frame_at(index),
                        target.return_type(),
                        layout.returned.as_ref(),
                        normal_exit,
                        || format!("{}.{} at #{}", target.class, target.signature(), index),
                    )?;
                }
                insn => out.push_insn(insn),
            }
        }
        out.place_label(body_end);
        try_catch_blocks.extend(relocated.try_catch_blocks);

        // Exit
        match (&exit, &advice.exit) {
            (Some(exit), Some(exit_advice)) => {
                if let (Some(throwable), Some(thrown)) =
                    (&exit_advice.on_throwable, &layout.thrown)
                {
                    let handler = out.fresh_label();
                    try_catch_blocks.push(TryCatchBlock {
                        start: body_start,
                        end: body_end,
                        handler,
                        catch_type: Some(throwable.clone()),
                    });
                    out.place_label(handler);
                    out.push(Instruction::store(&thrown.value_type, thrown.slot));
                    if let Some(returned) = &layout.returned {
                        out.push(Instruction::push_default(&returned.value_type));
                        out.push(Instruction::store(&returned.value_type, returned.slot));
                    }
                    out.push_branch(BranchInstruction::Goto(exit_start));
                }

                out.place_label(normal_exit);
                if let Some(thrown) = &layout.thrown {
                    out.push(Instruction::AConstNull);
                    out.push(Instruction::store(&thrown.value_type, thrown.slot));
                }
                out.place_label(exit_start);
                self.splice_advice(
                    &mut out,
                    &mut try_catch_blocks,
                    exit,
                    layout.exit.as_ref(),
                    &layout,
                )?;

                if let (Some(predicate), Some(exit_value)) =
                    (&exit_advice.repeat_on, &layout.exit)
                {
                    out.push(Instruction::load(&exit_value.value_type, exit_value.slot));
                    jump_if_matches(&mut out, predicate, &exit_value.value_type, body_start);
                }
                if let Some(thrown) = &layout.thrown {
                    out.push(Instruction::load(&thrown.value_type, thrown.slot));
                    out.push_branch(BranchInstruction::IfNull(EqComparison::EQ, return_label));
                    out.push(Instruction::load(&thrown.value_type, thrown.slot));
                    out.push_branch(BranchInstruction::AThrow);
                }
                out.place_label(return_label);
                if let Some(returned) = &layout.returned {
                    out.push(Instruction::load(&returned.value_type, returned.slot));
                }
                out.push_branch(BranchInstruction::return_for(target.return_type()));
            }
            _ => {
                let skips = advice
                    .entry
                    .as_ref()
                    .map_or(false, |entry| entry.skip_on.is_some());
                if skips {
                    out.place_label(skip_label);
                    if let Some(return_type) = target.return_type() {
                        out.push(Instruction::push_default(return_type));
                    }
                    out.push_branch(BranchInstruction::return_for(target.return_type()));
                }
            }
        }

        for block in try_catch_blocks {
            out.push_try_catch(block);
        }
        Ok(out)
    }

    /// Checks which only need the declarations (not the code or bindings)
    fn check_declarations(&self, target: &Method, advice: &AdviceSet) -> Result<(), Error> {
        let target_name = || format!("{}.{}", target.class, target.signature());

        for declared in advice
            .entry
            .iter()
            .map(|entry| &entry.advice)
            .chain(advice.exit.iter().map(|exit| &exit.advice))
        {
            if !declared.method.is_static() {
                return Err(Error::new(ErrorKind::NonStaticAdvice, declared.name()));
            }
        }

        if let Some(entry) = &advice.entry {
            if let Some(predicate) = &entry.skip_on {
                if target.is_constructor() {
                    return Err(Error::new(
                        ErrorKind::IllegalOnConstructor,
                        format!("skipping the body of {}", target_name()),
                    ));
                }
                let returned = entry.advice.method.return_type();
                match entry.skip_on_index {
                    None => check_control_value(predicate, returned, &entry.advice)?,
                    Some(index) => {
                        let element = returned
                            .and_then(element_type)
                            .filter(|_| i32::try_from(index).is_ok())
                            .ok_or_else(|| not_an_array(&entry.advice, index))?;
                        check_control_value(predicate, Some(&element), &entry.advice)?;
                    }
                }
            }
        }

        if let Some(exit) = &advice.exit {
            if let Some(predicate) = &exit.repeat_on {
                if target.is_constructor() {
                    return Err(Error::new(
                        ErrorKind::IllegalOnConstructor,
                        format!("repeating the body of {}", target_name()),
                    ));
                }
                check_control_value(predicate, exit.advice.method.return_type(), &exit.advice)?;
            }
            if exit.on_throwable.is_some() && target.is_constructor() {
                return Err(Error::new(
                    ErrorKind::IllegalOnConstructor,
                    format!("catching exceptions from {}", target_name()),
                ));
            }
        }
        Ok(())
    }

    /// Resolve bindings and check the advice code against them
    fn prepare<'x>(
        &self,
        resolver: &BindingResolver,
        advice: &'x Advice,
        role: AdviceRole,
    ) -> Result<PreparedAdvice<'x>, Error> {
        let bindings = resolver.resolve_all(advice, role)?;
        let assignments = resolver.resolve_assignments(advice, role)?;

        if !advice.inline {
            if let Some(writable) = bindings.iter().find(|binding| binding.request.is_writable()) {
                return Err(Error::new(
                    ErrorKind::WritableInDelegation,
                    format!("parameter {} of {}", writable.parameter, advice.name()),
                ));
            }
            return Ok(PreparedAdvice {
                advice,
                bindings,
                assignments,
                frames: None,
            });
        }

        let code = advice.method.code.as_ref().ok_or_else(|| no_code(&advice.method))?;
        for insn in code.insns() {
            let (slot, width) = match insn {
                Insn::Instruction(insn) => match insn.local_variable_write() {
                    Some(write) => write,
                    None => continue,
                },
                _ => continue,
            };
            for binding in &bindings {
                let offset = advice
                    .method
                    .parameter_offset(binding.parameter)
                    .unwrap_or_default();
                if binding.writer.is_none()
                    && overlaps_parameter(slot, width, offset, &binding.parameter_type)
                {
                    return Err(Error::new(
                        ErrorKind::IllegalWriteToReadOnly,
                        format!(
                            "{:?} writes to parameter {} of {}",
                            insn,
                            binding.parameter,
                            advice.name()
                        ),
                    ));
                }
            }
        }

        let frames = self
            .frame_computer()
            .compute(&advice.method, code)
            .map_err(|err| Error::caused_by(ErrorKind::InvalidTargetCode, advice.name(), err))?;
        Ok(PreparedAdvice {
            advice,
            bindings,
            assignments,
            frames: Some(frames),
        })
    }

    /// Emit an advice block
    ///
    /// The value returned by the advice ends up in `result` and exceptions listed in the
    /// suppression are caught. Control always leaves the block by falling through.
    fn splice_advice(
        &self,
        out: &mut InstructionBuffer,
        try_catch_blocks: &mut Vec<TryCatchBlock>,
        prepared: &PreparedAdvice,
        result: Option<&ReservedSlot>,
        layout: &SlotLayout,
    ) -> Result<(), Error> {
        let advice = prepared.advice;
        let base = layout.private_base;
        let code_start = out.fresh_label();
        let code_end = out.fresh_label();
        let write_back = out.fresh_label();

        match (&advice.method.code, &prepared.frames) {
            (Some(code), Some(frames)) if advice.inline => {
                for binding in &prepared.bindings {
                    let slot = self.private_slot(advice, binding, base)?;
                    for insn in &binding.reader.0 {
                        out.push(insn.clone());
                    }
                    out.push(Instruction::store(&binding.parameter_type, slot));
                }

                out.place_label(code_start);
                let relocated = relocate(code, LocalShift::all(base), out)?;
                for (index, insn) in relocated.insns.into_iter().enumerate() {
                    match insn {
                        Insn::Branch(branch) if branch.is_return() => {
                            self.leave_block(
                                out,
                                frames.frame_at(index),
                                advice.method.return_type(),
                                result,
                                code_end,
                                || format!("{} at #{}", advice.name(), index),
                            )?;
                        }
                        insn => out.push_insn(insn),
                    }
                }
                try_catch_blocks.extend(relocated.try_catch_blocks);
            }
            _ => {
                out.place_label(code_start);
                for binding in &prepared.bindings {
                    for insn in &binding.reader.0 {
                        out.push(insn.clone());
                    }
                }
                out.push(Instruction::Invoke(
                    InvokeType::Static,
                    advice.method.method_ref(false),
                ));
                if let Some(result) = result {
                    out.push(Instruction::store(&result.value_type, result.slot));
                }
            }
        }
        out.place_label(code_end);

        if let Some(suppress) = &advice.suppress {
            let handler = out.fresh_label();
            out.push_branch(BranchInstruction::Goto(write_back));
            out.place_label(handler);
            match &suppress.backing_field {
                Some(field) => out.push(Instruction::PutStatic(field.clone())),
                None => out.push(Instruction::Pop),
            }
            if let Some(result) = result {
                out.push(Instruction::push_default(&result.value_type));
                out.push(Instruction::store(&result.value_type, result.slot));
            }
            try_catch_blocks.push(TryCatchBlock {
                start: code_start,
                end: code_end,
                handler,
                catch_type: Some(suppress.exception.clone()),
            });
        }
        out.place_label(write_back);

        if advice.inline {
            for binding in &prepared.bindings {
                if let Some(writer) = &binding.writer {
                    let slot = self.private_slot(advice, binding, base)?;
                    out.push(Instruction::load(&binding.parameter_type, slot));
                    for insn in &writer.0 {
                        out.push(insn.clone());
                    }
                }
            }
        }

        if let Some(result) = result {
            self.assign_returned(out, try_catch_blocks, prepared, result);
        }
        Ok(())
    }

    /// Emit the assignments of the value the advice returned
    fn assign_returned(
        &self,
        out: &mut InstructionBuffer,
        try_catch_blocks: &mut Vec<TryCatchBlock>,
        prepared: &PreparedAdvice,
        result: &ReservedSlot,
    ) {
        let assign_returned = match &prepared.advice.assign_returned {
            Some(assign_returned) if !prepared.assignments.is_empty() => assign_returned,
            _ => return,
        };
        let start = out.fresh_label();
        let end = out.fresh_label();
        let done = out.fresh_label();
        out.place_label(start);

        let (whole, elements): (Vec<&ResolvedAssignment>, Vec<&ResolvedAssignment>) = prepared
            .assignments
            .iter()
            .partition(|assignment| assignment.element.is_none());
        if !whole.is_empty() {
            let skip = out.fresh_label();
            if assign_returned.skip_on_default_value {
                out.push(Instruction::load(&result.value_type, result.slot));
                jump_if_matches(out, &ControlPredicate::DefaultValue, &result.value_type, skip);
            }
            for assignment in whole {
                out.push(Instruction::load(&result.value_type, result.slot));
                for insn in &assignment.writer.0 {
                    out.push(insn.clone());
                }
            }
            out.place_label(skip);
        }
        if !elements.is_empty() {
            let skip = out.fresh_label();
            out.push(Instruction::load(&result.value_type, result.slot));
            out.push_branch(BranchInstruction::IfNull(EqComparison::EQ, skip));
            for assignment in elements {
                let index = assignment.element.unwrap_or_default();
                out.push(Instruction::load(&result.value_type, result.slot));
                out.push(Instruction::push_int(index as i32));
                out.push(Instruction::array_load(&assignment.value_type));
                for insn in &assignment.writer.0 {
                    out.push(insn.clone());
                }
            }
            out.place_label(skip);
        }
        out.place_label(end);

        if let Some(exception) = &assign_returned.suppress {
            let handler = out.fresh_label();
            out.push_branch(BranchInstruction::Goto(done));
            out.place_label(handler);
            out.push(Instruction::Pop);
            try_catch_blocks.push(TryCatchBlock {
                start,
                end,
                handler,
                catch_type: Some(exception.clone()),
            });
        }
        out.place_label(done);
    }

    /// Replace a return with a jump to `end`, leaving the returned value in `result`
    ///
    /// Values under the returned one are popped so the stack is empty at `end`.
    fn leave_block(
        &self,
        out: &mut InstructionBuffer,
        frame: Option<&Frame>,
        return_type: Option<&FieldType>,
        result: Option<&ReservedSlot>,
        end: Label,
        site: impl Fn() -> String,
    ) -> Result<(), Error> {
        // Unreachable returns have no stack to clean up
        let frame = match frame {
            Some(frame) => frame,
            None => {
                out.push_branch(BranchInstruction::Goto(end));
                return Ok(());
            }
        };

        let mut remaining: Vec<usize> =
            frame.stack.iter().map(|(_, _, value)| value.width()).collect();
        if let Some(return_type) = return_type {
            remaining.pop();
            match result {
                Some(result) => out.push(Instruction::store(&result.value_type, result.slot)),
                None => out.push(Instruction::pop_width(return_type.width())),
            }
        }
        if !remaining.is_empty() {
            if !self.settings.drain_inconsistent_returns {
                log::error!("Return with {} extra stack values in {}", remaining.len(), site());
                return Err(Error::new(
                    ErrorKind::InternalStackInconsistency,
                    format!("{} values left under the return value in {}", remaining.len(), site()),
                ));
            }
            for width in remaining.into_iter().rev() {
                out.push(Instruction::pop_width(width));
            }
        }
        out.push_branch(BranchInstruction::Goto(end));
        Ok(())
    }

    /// Slot of the copy of an advice parameter
    fn private_slot(
        &self,
        advice: &Advice,
        binding: &ResolvedBinding,
        base: u16,
    ) -> Result<u16, Error> {
        let offset = advice
            .method
            .parameter_offset(binding.parameter)
            .unwrap_or_default();
        Ok(LocalShift::all(base).map(offset)?)
    }
}

/// Emit a jump to `target` taken when the value on top of the stack matches the predicate
///
/// The value is popped either way.
fn jump_if_matches(
    out: &mut InstructionBuffer,
    predicate: &ControlPredicate,
    value_type: &FieldType,
    target: Label,
) {
    let comparison = match predicate {
        ControlPredicate::InstanceOf(class) => {
            out.push(Instruction::InstanceOf(class.clone()));
            out.push_branch(BranchInstruction::If(OrdComparison::NE, target));
            return;
        }
        ControlPredicate::DefaultValue => EqComparison::EQ,
        ControlPredicate::NonDefaultValue => EqComparison::NE,
    };
    let int_comparison = match comparison {
        EqComparison::EQ => OrdComparison::EQ,
        EqComparison::NE => OrdComparison::NE,
    };
    match value_type {
        FieldType::Ref(_) => {
            out.push_branch(BranchInstruction::IfNull(comparison, target));
            return;
        }
        FieldType::Base(BaseType::Long) => {
            out.push(Instruction::LConst0);
            out.push(Instruction::LCmp);
        }
        FieldType::Base(BaseType::Float) => {
            out.push(Instruction::FConst0);
            out.push(Instruction::FCmp(CompareMode::L));
        }
        FieldType::Base(BaseType::Double) => {
            out.push(Instruction::DConst0);
            out.push(Instruction::DCmp(CompareMode::L));
        }
        FieldType::Base(_) => (),
    }
    out.push_branch(BranchInstruction::If(int_comparison, target));
}

/// Predicates need a value to test, and only references can be tested for their class
fn check_control_value(
    predicate: &ControlPredicate,
    tested: Option<&FieldType>,
    advice: &Advice,
) -> Result<(), Error> {
    match (predicate, tested) {
        (_, None) => Err(Error::new(
            ErrorKind::IllegalPrimitiveControlValue,
            format!("{} returns no value to test", advice.name()),
        )),
        (ControlPredicate::InstanceOf(class), Some(FieldType::Base(base_type))) => Err(Error::new(
            ErrorKind::IllegalPrimitiveControlValue,
            format!(
                "{} gives a {} which can't be an instance of {}",
                advice.name(),
                base_type.java_name(),
                class.java_name()
            ),
        )),
        _ => Ok(()),
    }
}

/// Skipping on an array element needs an array with that index
fn not_an_array(advice: &Advice, index: usize) -> Error {
    let returned = advice
        .method
        .return_type()
        .map(FieldType::java_name)
        .unwrap_or_else(|| String::from("void"));
    Error::new(
        ErrorKind::IllegalPrimitiveControlValue,
        format!("{} returns {}, which has no element {} to test", advice.name(), returned, index),
    )
}

fn no_code(method: &Method) -> Error {
    Error::new(
        ErrorKind::AbstractOrNative,
        format!("{}.{}", method.class, method.signature()),
    )
}
