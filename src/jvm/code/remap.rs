//! Relocation of instruction sequences
//!
//! When code from one buffer is copied into another (or when a body is moved to make room for new
//! local variables), every label it places or refers to must be replaced with a label unique in
//! the destination, and local variable slots at or above some threshold must be shifted. Neither
//! changes the shape of the control flow graph: relocation maps entries one to one.

use super::{BranchInstruction, Insn, InstructionBuffer, Label, LabelGenerator, TryCatchBlock};
use crate::jvm::Error;
use std::collections::HashMap;

/// Shift applied to local variable slots
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalShift {
    /// Slots below this are left alone
    pub threshold: u16,

    /// Amount added to slots at or above the threshold
    pub shift: u16,

    /// Slots from `.0` up to the threshold are moved to start at `.1` instead of staying put
    pub redirect: Option<(u16, u16)>,
}

impl LocalShift {
    pub const NONE: LocalShift = LocalShift {
        threshold: 0,
        shift: 0,
        redirect: None,
    };

    /// Shift every slot at or above `threshold` by `shift`
    pub fn above(threshold: u16, shift: u16) -> LocalShift {
        LocalShift {
            threshold,
            shift,
            redirect: None,
        }
    }

    /// Shift every slot by `shift`
    pub fn all(shift: u16) -> LocalShift {
        LocalShift {
            threshold: 0,
            shift,
            redirect: None,
        }
    }

    /// Also move the slots in `from..threshold` so that `from` becomes `to`
    pub fn redirecting(mut self, from: u16, to: u16) -> LocalShift {
        if from < self.threshold {
            self.redirect = Some((from, to));
        }
        self
    }

    pub fn map(&self, slot: u16) -> Result<u16, Error> {
        if slot < self.threshold {
            return match self.redirect {
                Some((from, to)) if slot >= from => (slot - from)
                    .checked_add(to)
                    .ok_or(Error::LocalsOverflow(slot as usize + to as usize)),
                _ => Ok(slot),
            };
        }
        slot.checked_add(self.shift)
            .ok_or(Error::LocalsOverflow(slot as usize + self.shift as usize))
    }
}

/// Result of relocating a buffer
///
/// `insns[i]` is always the relocated version of entry `i` of the source buffer.
#[derive(Clone, Debug)]
pub struct Relocated {
    pub insns: Vec<Insn>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    label_map: HashMap<Label, Label>,
}

impl Relocated {
    /// New label corresponding to a label from the source buffer
    pub fn label(&self, source_label: Label) -> Option<Label> {
        self.label_map.get(&source_label).copied()
    }
}

/// Replaces labels and shifts local slots while copying instructions
pub struct Remapper<'a, G: LabelGenerator> {
    label_generator: &'a mut G,
    label_map: HashMap<Label, Label>,
    locals: LocalShift,
}

impl<'a, G: LabelGenerator> Remapper<'a, G> {
    pub fn new(label_generator: &'a mut G, locals: LocalShift) -> Remapper<'a, G> {
        Remapper {
            label_generator,
            label_map: HashMap::new(),
            locals,
        }
    }

    /// Destination label for a source label (allocated on first use)
    pub fn label(&mut self, source_label: Label) -> Label {
        let label_generator = &mut self.label_generator;
        *self
            .label_map
            .entry(source_label)
            .or_insert_with(|| label_generator.fresh_label())
    }

    /// Relocate a single entry
    pub fn insn(&mut self, insn: &Insn) -> Result<Insn, Error> {
        Ok(match insn {
            Insn::Label(label) => Insn::Label(self.label(*label)),
            Insn::Instruction(insn) => {
                let mut insn = insn.clone();
                if let Some(slot) = insn.local_variable_mut() {
                    *slot = self.locals.map(*slot)?;
                }
                Insn::Instruction(insn)
            }
            Insn::Branch(branch) => {
                // Pre-allocate so that `map_labels` only needs shared access
                for target in branch.jump_targets() {
                    self.label(target);
                }
                let label_map = &self.label_map;
                let mut branch = branch.map_labels(|lbl| label_map[&lbl]);
                if let BranchInstruction::Ret(slot) = &mut branch {
                    *slot = self.locals.map(*slot)?;
                }
                Insn::Branch(branch)
            }
        })
    }

    pub fn try_catch_block(&mut self, block: &TryCatchBlock) -> TryCatchBlock {
        let start = self.label(block.start);
        let end = self.label(block.end);
        let handler = self.label(block.handler);
        TryCatchBlock {
            start,
            end,
            handler,
            catch_type: block.catch_type.clone(),
        }
    }

    /// Relocate a whole buffer
    pub fn relocate(mut self, source: &InstructionBuffer) -> Result<Relocated, Error> {
        let insns = source
            .insns()
            .iter()
            .map(|insn| self.insn(insn))
            .collect::<Result<Vec<Insn>, Error>>()?;
        let try_catch_blocks = source
            .try_catch_blocks()
            .iter()
            .map(|block| self.try_catch_block(block))
            .collect();
        Ok(Relocated {
            insns,
            try_catch_blocks,
            label_map: self.label_map,
        })
    }
}

/// Relocate a buffer, using `label_generator` for all new labels
pub fn relocate<G: LabelGenerator>(
    source: &InstructionBuffer,
    locals: LocalShift,
    label_generator: &mut G,
) -> Result<Relocated, Error> {
    Remapper::new(label_generator, locals).relocate(source)
}
