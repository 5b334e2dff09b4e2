//! Process memory sampling for batch back-pressure.

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Samples this process's resident memory.
pub(crate) struct MemorySampler {
    system: System,
    pid: Pid,
}

impl MemorySampler {
    /// Create a sampler for the current process, if the platform exposes it.
    pub(crate) fn new() -> Option<Self> {
        let pid = sysinfo::get_current_pid().ok()?;
        Some(Self {
            system: System::new(),
            pid,
        })
    }

    /// Current resident set size in MiB.
    pub(crate) fn sample_mb(&mut self) -> Option<u64> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system
            .process(self.pid)
            .map(|process| process.memory() / (1024 * 1024))
    }
}
