use crate::jvm::Version;

pub struct WeaveSettings {
    /// Version of the class file the woven method ends up in
    ///
    /// Stack map frames are only produced for versions which carry a `StackMapTable`.
    pub class_file_version: Version,

    /// Produce a stack map table for the woven method
    pub compute_frames: bool,

    /// Bound on the number of instructions visited while computing frames
    ///
    /// Reaching it means something is badly wrong with the woven code (the analysis always
    /// converges on well-formed input), so it is reported as an internal inconsistency.
    pub max_fixpoint_iterations: usize,

    /// Drain values left under the returned value at a return site
    ///
    /// A `return` is legal with extra values on the stack, but a jump to the exit advice isn't
    /// (the exit advice block expects an empty stack). When this is off, such a return is an
    /// error instead.
    pub drain_inconsistent_returns: bool,
}

impl WeaveSettings {
    /// Should a stack map table be produced?
    pub fn emit_stack_map(&self) -> bool {
        self.compute_frames && self.class_file_version.has_stack_map_frames()
    }
}

impl Default for WeaveSettings {
    fn default() -> WeaveSettings {
        WeaveSettings {
            class_file_version: Version::JAVA8,
            compute_frames: true,
            max_fixpoint_iterations: 100_000,
            drain_inconsistent_returns: true,
        }
    }
}
