use super::{ComputedFrames, SerializableFrame, StackMapType};
use crate::jvm::code::{Insn, InstructionBuffer};

/// Entry of a `StackMapTable` attribute
///
/// Offsets are deltas: the first frame's offset is `offset_delta` and every later frame is at
/// `previous_offset + offset_delta + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: StackMapType,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<StackMapType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<StackMapType>,
        stack: Vec<StackMapType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl ComputedFrames {
    /// Compressed stack map table for the code these frames were computed from
    ///
    /// There is one frame per distinct byte offset that is a jump target or exception handler
    /// and is reachable.
    pub fn stack_map_table(&self, code: &InstructionBuffer) -> Vec<StackMapFrame> {
        let byte_offsets = code.byte_offsets();
        let insns = code.insns();

        // Positions of the real instructions which need frames
        let mut positions: Vec<usize> = vec![];
        for target in &self.frame_targets {
            let mut position = *target;
            while matches!(insns.get(position), Some(Insn::Label(_))) {
                position += 1;
            }
            if position < insns.len() && self.frames[position].is_some() {
                positions.push(position);
            }
        }
        positions.sort_unstable();
        positions.dedup();

        let mut previous_frame: SerializableFrame =
            self.initial_frame.into_serializable(&byte_offsets);
        let mut previous_offset: Option<usize> = None;
        let mut table = vec![];
        for position in positions {
            let frame = match &self.frames[position] {
                Some(frame) => frame.into_serializable(&byte_offsets),
                None => continue,
            };
            let offset = byte_offsets[position];
            let offset_delta = match previous_offset {
                None => offset,
                Some(previous) => offset - previous - 1,
            };
            table.push(frame.stack_map_frame(offset_delta as u16, &previous_frame));
            previous_offset = Some(offset);
            previous_frame = frame;
        }
        table
    }
}
