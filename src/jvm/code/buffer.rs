use super::{BranchInstruction, Instruction, Label, LabelGenerator, SynLabelGenerator};
use crate::jvm::{BinaryName, Error};
use crate::util::Width;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Entry in an instruction buffer
///
/// Labels are pseudo-instructions: they mark the position of the next real instruction and are
/// never encoded.
#[derive(Clone, Debug, PartialEq)]
pub enum Insn {
    Label(Label),
    Instruction(Instruction),
    Branch(BranchInstruction),
}

impl Insn {
    /// Size in bytes of this entry in a class file, if it starts at the given offset
    pub fn encoded_width(&self, offset: usize) -> usize {
        match self {
            Insn::Label(_) => 0,
            Insn::Instruction(insn) => insn.width(),
            Insn::Branch(insn) => insn.encoded_width(offset),
        }
    }

    /// Can control continue on to the next entry?
    pub fn falls_through(&self) -> bool {
        match self {
            Insn::Label(_) | Insn::Instruction(_) => true,
            Insn::Branch(branch) => branch.falls_through(),
        }
    }
}

impl From<Instruction> for Insn {
    fn from(insn: Instruction) -> Insn {
        Insn::Instruction(insn)
    }
}

impl From<BranchInstruction> for Insn {
    fn from(insn: BranchInstruction) -> Insn {
        Insn::Branch(insn)
    }
}

impl From<Label> for Insn {
    fn from(label: Label) -> Insn {
        Insn::Label(label)
    }
}

/// Exception table entry
///
/// The protected range is `[start, end)` in terms of buffer positions of the labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// Type of exception caught (`None` means any `java/lang/Throwable`)
    pub catch_type: Option<BinaryName>,
}

impl TryCatchBlock {
    pub fn map_labels(&self, map_label: impl Fn(Label) -> Label) -> TryCatchBlock {
        TryCatchBlock {
            start: map_label(self.start),
            end: map_label(self.end),
            handler: map_label(self.handler),
            catch_type: self.catch_type.clone(),
        }
    }
}

/// Mutable, ordered sequence of instructions making up one method body
///
/// Jumps and exception table entries refer to labels rather than positions, so entries can be
/// inserted or removed freely. The buffer is also a label generator: labels it hands out never
/// collide with labels already used in the buffer.
#[derive(Clone, Debug, Default)]
pub struct InstructionBuffer {
    insns: Vec<Insn>,
    try_catch_blocks: Vec<TryCatchBlock>,
    label_generator: SynLabelGenerator,
}

impl InstructionBuffer {
    pub fn new() -> InstructionBuffer {
        InstructionBuffer::default()
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn try_catch_blocks(&self) -> &[TryCatchBlock] {
        &self.try_catch_blocks
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Push a non-branching instruction
    pub fn push(&mut self, insn: Instruction) {
        self.insns.push(Insn::Instruction(insn));
    }

    /// Push a branching instruction
    pub fn push_branch(&mut self, insn: BranchInstruction) {
        self.observe_labels(&insn.jump_targets());
        self.insns.push(Insn::Branch(insn));
    }

    /// Mark the current position with a label
    pub fn place_label(&mut self, label: Label) {
        self.observe_labels(&[label]);
        self.insns.push(Insn::Label(label));
    }

    pub fn push_insn(&mut self, insn: Insn) {
        match insn {
            Insn::Label(label) => self.place_label(label),
            Insn::Instruction(insn) => self.push(insn),
            Insn::Branch(insn) => self.push_branch(insn),
        }
    }

    /// Add an exception table entry (after all existing ones, so it has lower priority)
    pub fn push_try_catch(&mut self, block: TryCatchBlock) {
        self.observe_labels(&[block.start, block.end, block.handler]);
        self.try_catch_blocks.push(block);
    }

    /// Replace a range of entries with new entries
    ///
    /// Removing a label is only allowed if nothing (neither a jump nor an exception table entry)
    /// still refers to it afterwards.
    pub fn splice(
        &mut self,
        range: Range<usize>,
        replacement: impl IntoIterator<Item = Insn>,
    ) -> Result<(), Error> {
        let replacement: Vec<Insn> = replacement.into_iter().collect();

        let removed_labels: HashSet<Label> = self.insns[range.clone()]
            .iter()
            .filter_map(|insn| match insn {
                Insn::Label(label) => Some(*label),
                _ => None,
            })
            .collect();
        if !removed_labels.is_empty() {
            let kept = self.insns[..range.start]
                .iter()
                .chain(replacement.iter())
                .chain(self.insns[range.end..].iter());
            let mut still_placed = HashSet::new();
            let mut referenced = HashSet::new();
            for insn in kept {
                match insn {
                    Insn::Label(label) => {
                        still_placed.insert(*label);
                    }
                    Insn::Branch(branch) => referenced.extend(branch.jump_targets()),
                    Insn::Instruction(_) => (),
                }
            }
            for block in &self.try_catch_blocks {
                referenced.extend([block.start, block.end, block.handler]);
            }
            for label in removed_labels {
                if referenced.contains(&label) && !still_placed.contains(&label) {
                    return Err(Error::UnplacedLabel(label));
                }
            }
        }

        for insn in &replacement {
            match insn {
                Insn::Label(label) => self.observe_labels(&[*label]),
                Insn::Branch(branch) => self.observe_labels(&branch.jump_targets()),
                Insn::Instruction(_) => (),
            }
        }
        self.insns.splice(range, replacement);
        Ok(())
    }

    /// Make sure the label generator never hands out one of these labels
    fn observe_labels(&mut self, labels: &[Label]) {
        let mut lookahead = self.label_generator.clone();
        let next = lookahead.fresh_label();
        if let Some(max) = labels.iter().copied().max() {
            if max >= next {
                self.label_generator = SynLabelGenerator::after(max);
            }
        }
    }

    /// Position of every placed label
    ///
    /// Label entries are positions too: the label refers to the position of its own entry, so
    /// jumping there falls through to the next real instruction.
    pub fn label_positions(&self) -> Result<HashMap<Label, usize>, Error> {
        let mut positions = HashMap::new();
        for (idx, insn) in self.insns.iter().enumerate() {
            if let Insn::Label(label) = insn {
                if positions.insert(*label, idx).is_some() {
                    return Err(Error::DuplicateLabel(*label));
                }
            }
        }
        Ok(positions)
    }

    /// Check that every label referred to is placed exactly once and that every protected range
    /// is well-formed
    pub fn validate(&self) -> Result<HashMap<Label, usize>, Error> {
        let positions = self.label_positions()?;
        let check = |label: &Label| -> Result<usize, Error> {
            positions
                .get(label)
                .copied()
                .ok_or(Error::UnplacedLabel(*label))
        };

        for insn in &self.insns {
            if let Insn::Branch(branch) = insn {
                for target in branch.jump_targets() {
                    check(&target)?;
                }
            }
        }
        for block in &self.try_catch_blocks {
            let start = check(&block.start)?;
            let end = check(&block.end)?;
            check(&block.handler)?;
            if start > end {
                return Err(Error::InvalidTryCatchRange(block.start, block.end));
            }
        }

        Ok(positions)
    }

    /// Byte offset of every entry in the encoded method body
    ///
    /// The returned vector has one more element than there are entries: the last element is the
    /// total code length.
    pub fn byte_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.insns.len() + 1);
        let mut offset = 0;
        for insn in &self.insns {
            offsets.push(offset);
            offset += insn.encoded_width(offset);
        }
        offsets.push(offset);
        offsets
    }

    /// Positions of all the `*return` instructions
    pub fn return_sites(&self) -> Vec<usize> {
        self.insns
            .iter()
            .enumerate()
            .filter_map(|(idx, insn)| match insn {
                Insn::Branch(branch) if branch.is_return() => Some(idx),
                _ => None,
            })
            .collect()
    }

    /// One more than the highest local variable slot mentioned in the code
    pub fn max_local_extent(&self) -> usize {
        self.insns
            .iter()
            .filter_map(|insn| match insn {
                Insn::Instruction(insn) => insn
                    .local_variable()
                    .map(|idx| idx as usize + insn.local_variable_width()),
                Insn::Branch(BranchInstruction::Ret(idx)) => Some(*idx as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Largest label used anywhere in the buffer
    pub fn max_label(&self) -> Option<Label> {
        let from_insns = self.insns.iter().flat_map(|insn| match insn {
            Insn::Label(label) => vec![*label],
            Insn::Branch(branch) => branch.jump_targets(),
            Insn::Instruction(_) => vec![],
        });
        let from_blocks = self
            .try_catch_blocks
            .iter()
            .flat_map(|block| [block.start, block.end, block.handler]);
        from_insns.chain(from_blocks).max()
    }
}

impl LabelGenerator for InstructionBuffer {
    fn fresh_label(&mut self) -> Label {
        self.label_generator.fresh_label()
    }
}

impl From<Vec<Insn>> for InstructionBuffer {
    fn from(insns: Vec<Insn>) -> InstructionBuffer {
        let mut buffer = InstructionBuffer {
            insns,
            try_catch_blocks: vec![],
            label_generator: SynLabelGenerator::new(),
        };
        if let Some(max) = buffer.max_label() {
            buffer.label_generator = SynLabelGenerator::after(max);
        }
        buffer
    }
}
