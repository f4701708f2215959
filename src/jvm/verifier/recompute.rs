use super::{Frame, VerifierContext};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{BranchInstruction, Insn, InstructionBuffer, Label};
use crate::jvm::model::Method;
use crate::jvm::{Error, RefType, VerifierErrorKind};
use crate::util::Offset;
use std::collections::HashMap;

/// Result of frame computation over an instruction buffer
#[derive(Debug, Clone)]
pub struct ComputedFrames {
    /// Maximum depth of the operand stack (in slots)
    pub max_stack: u16,

    /// Number of local variable slots needed
    pub max_locals: u16,

    /// Frame before each entry of the buffer (`None` if the entry is unreachable)
    pub frames: Vec<Option<Frame>>,

    /// Frame implied by the method descriptor
    pub initial_frame: Frame,

    /// Positions which are jump targets or exception handlers
    pub frame_targets: Vec<usize>,
}

impl ComputedFrames {
    pub fn frame_at(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index).and_then(|frame| frame.as_ref())
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.frame_at(index).is_some()
    }
}

/// Forward data-flow analysis computing the frame at every instruction
///
/// Every reachable entry is visited until no frame changes anymore. Frames reaching the same
/// entry from different predecessors are merged (see [`Frame::merge`]).
pub struct FrameComputer<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    max_iterations: usize,
}

/// Exception table entry resolved to buffer positions
struct Handler {
    start: usize,
    end: usize,
    handler: usize,
    catch_type: RefType,
}

impl<'a, 'g> FrameComputer<'a, 'g> {
    pub fn new(class_graph: &'a ClassGraph<'g>, max_iterations: usize) -> FrameComputer<'a, 'g> {
        FrameComputer {
            class_graph,
            max_iterations,
        }
    }

    /// Compute frames for the given code, which is the body of `method`
    ///
    /// Only the class, descriptor, and flags of `method` are used.
    pub fn compute(
        &self,
        method: &Method,
        code: &InstructionBuffer,
    ) -> Result<ComputedFrames, Error> {
        let positions: HashMap<Label, usize> = code.validate()?;
        let insns = code.insns();
        let context = VerifierContext {
            class_graph: self.class_graph,
            this_class: &method.class,
            return_type: method.return_type(),
        };

        let handlers: Vec<Handler> = code
            .try_catch_blocks()
            .iter()
            .map(|block| Handler {
                start: positions[&block.start],
                end: positions[&block.end],
                handler: positions[&block.handler],
                catch_type: block
                    .catch_type
                    .clone()
                    .map(RefType::Object)
                    .unwrap_or(RefType::THROWABLE),
            })
            .collect();

        let mut frame_targets: Vec<usize> = vec![];
        for insn in insns {
            if let Insn::Branch(branch) = insn {
                frame_targets.extend(branch.jump_targets().iter().map(|lbl| positions[lbl]));
            }
        }
        frame_targets.extend(handlers.iter().map(|handler| handler.handler));
        frame_targets.sort_unstable();
        frame_targets.dedup();

        let initial_frame = Frame::entry(method);
        let mut max_locals = Offset(code.max_local_extent());
        let mut max_stack = Offset(0);
        initial_frame.update_maximums(&mut max_locals, &mut max_stack);

        let mut frames: Vec<Option<Frame>> = vec![None; insns.len()];
        let mut pending: Vec<bool> = vec![false; insns.len()];
        let mut worklist: Vec<usize> = vec![];
        if insns.is_empty() {
            return Err(Error::VerifierError {
                index: 0,
                instruction: String::from("<end of code>"),
                kind: VerifierErrorKind::FallsOffEnd,
            });
        }
        self.flow_into(
            &mut frames,
            &mut pending,
            &mut worklist,
            0,
            initial_frame.clone(),
        )?;

        let mut iterations = 0;
        while let Some(index) = worklist.pop() {
            iterations += 1;
            if iterations > self.max_iterations {
                log::error!("Frame computation did not converge for {}", method.signature());
                return Err(Error::FixpointLimit(iterations));
            }
            pending[index] = false;
            let frame = match &frames[index] {
                Some(frame) => frame.clone(),
                None => continue,
            };
            log::trace!("#{} {:?} with {:?}", index, insns[index], frame);

            let mut successors: Vec<(usize, Frame)> = vec![];
            match &insns[index] {
                Insn::Label(_) => successors.push((index + 1, frame.clone())),
                Insn::Instruction(insn) => {
                    let mut after = frame.clone();
                    after
                        .verify_instruction(insn, index, &context)
                        .map_err(|kind| verifier_error(index, &insns[index], kind))?;

                    // Handlers see the locals from both before and after the instruction
                    if insn.local_variable_write().is_some() {
                        for handler in handlers.iter().filter(|h| h.covers(index)) {
                            successors.push((
                                handler.handler,
                                after.handler(handler.catch_type.clone()),
                            ));
                        }
                    }
                    successors.push((index + 1, after));
                }
                Insn::Branch(jsr @ BranchInstruction::Jsr(target)) => {
                    let mut subroutine = frame.clone();
                    subroutine
                        .verify_branch_instruction(jsr, &context)
                        .map_err(|kind| verifier_error(index, &insns[index], kind))?;
                    successors.push((positions[target], subroutine));
                    successors.push((index + 1, frame.clone()));
                }
                Insn::Branch(branch) => {
                    let mut after = frame.clone();
                    after
                        .verify_branch_instruction(branch, &context)
                        .map_err(|kind| verifier_error(index, &insns[index], kind))?;
                    after.update_maximums(&mut max_locals, &mut max_stack);
                    for target in branch.jump_targets() {
                        successors.push((positions[&target], after.clone()));
                    }
                    if branch.falls_through() {
                        successors.push((index + 1, after));
                    }
                }
            }

            if !matches!(insns[index], Insn::Label(_)) {
                for handler in handlers.iter().filter(|h| h.covers(index)) {
                    successors.push((handler.handler, frame.handler(handler.catch_type.clone())));
                }
            }

            for (target, successor) in successors {
                successor.update_maximums(&mut max_locals, &mut max_stack);
                if target >= insns.len() {
                    log::error!("Control falls off the end of {}", method.signature());
                    return Err(verifier_error(
                        index,
                        &insns[index],
                        VerifierErrorKind::FallsOffEnd,
                    ));
                }
                self.flow_into(
                    &mut frames,
                    &mut pending,
                    &mut worklist,
                    target,
                    successor,
                )?;
            }
        }

        let max_stack =
            u16::try_from(max_stack.0).map_err(|_| Error::MaxStackOverflow(max_stack.0))?;
        let max_locals =
            u16::try_from(max_locals.0).map_err(|_| Error::LocalsOverflow(max_locals.0))?;
        log::trace!(
            "Frames for {}: max stack {}, max locals {}",
            method.signature(),
            max_stack,
            max_locals
        );

        Ok(ComputedFrames {
            max_stack,
            max_locals,
            frames,
            initial_frame,
            frame_targets,
        })
    }

    /// Propagate a frame into an entry, queueing the entry if its frame changed
    fn flow_into(
        &self,
        frames: &mut [Option<Frame>],
        pending: &mut [bool],
        worklist: &mut Vec<usize>,
        target: usize,
        incoming: Frame,
    ) -> Result<(), Error> {
        let changed = match frames[target].as_mut() {
            None => {
                frames[target] = Some(incoming);
                true
            }
            Some(existing) => match existing.merge(&incoming, self.class_graph) {
                Ok(changed) => changed,
                Err(()) => {
                    log::error!(
                        "Incompatible frames at #{}: {:?} and {:?}",
                        target,
                        existing,
                        incoming
                    );
                    return Err(Error::IncompatibleFrames(target, existing.clone(), incoming));
                }
            },
        };
        if changed && !pending[target] {
            pending[target] = true;
            worklist.push(target);
        }
        Ok(())
    }
}

impl Handler {
    fn covers(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }
}

fn verifier_error(index: usize, insn: &Insn, kind: VerifierErrorKind) -> Error {
    log::error!("Verifier error at #{} ({:?}): {:?}", index, insn, kind);
    Error::VerifierError {
        index,
        instruction: format!("{:?}", insn),
        kind,
    }
}
