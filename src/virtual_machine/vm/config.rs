/// Runtime options of a [`VM`](super::VM).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VmConfig {
    /// Log the register file and the output pair when `QUIT` runs.
    pub dump_on_quit: bool,
    /// Fault when an instruction is fetched from outside sub-buffer 0.
    pub fetch_bounds_check: bool,
    /// Maximum number of instructions dispatched per run.
    pub step_limit: Option<u64>,
}

impl VmConfig {
    pub fn with_dump_on_quit(mut self, dump: bool) -> Self {
        self.dump_on_quit = dump;
        self
    }

    pub fn with_fetch_bounds_check(mut self, check: bool) -> Self {
        self.fetch_bounds_check = check;
        self
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            dump_on_quit: false,
            fetch_bounds_check: true,
            step_limit: None,
        }
    }
}
