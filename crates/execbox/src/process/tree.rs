//! Process tree termination
//!
//! Children are spawned as leaders of their own process group on Unix, so
//! killing the group reaches every descendant that did not detach itself.
//! Other platforms walk the process table by parent id instead.

use std::fmt;

use crate::process::ProcessError;

/// Capability to kill a process and all of its descendants
pub trait ProcessTree: Send + Sync + fmt::Debug {
    /// Forcibly terminate `root_pid` and every process descended from it.
    ///
    /// A tree that is already gone is not an error.
    fn terminate_tree(&self, root_pid: u32) -> Result<(), ProcessError>;
}

/// The termination strategy for the current platform
pub fn platform_tree() -> Box<dyn ProcessTree> {
    #[cfg(unix)]
    {
        Box::new(ProcessGroupTree)
    }
    #[cfg(not(unix))]
    {
        Box::new(ParentScanTree)
    }
}

/// Sends SIGKILL to the process group led by the root
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessGroupTree;

#[cfg(unix)]
impl ProcessTree for ProcessGroupTree {
    fn terminate_tree(&self, root_pid: u32) -> Result<(), ProcessError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // pgid 0 would signal our own group
        let pgid = i32::try_from(root_pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or(ProcessError::InvalidPid(root_pid))?;
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ProcessError::Terminate {
                pid: root_pid,
                source: std::io::Error::from(errno),
            }),
        }
    }
}

/// Enumerates descendants by parent id and kills each one
#[cfg(not(unix))]
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentScanTree;

#[cfg(not(unix))]
impl ProcessTree for ParentScanTree {
    fn terminate_tree(&self, root_pid: u32) -> Result<(), ProcessError> {
        use std::collections::{HashMap, HashSet};

        use sysinfo::{Pid, ProcessesToUpdate, System};

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let root = Pid::from_u32(root_pid);
        let mut stack = vec![root];
        let mut seen: HashSet<Pid> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(kids) = children.get(&current) {
                stack.extend(kids.iter().copied().filter(|kid| !seen.contains(kid)));
            }
        }

        for pid in seen {
            if let Some(process) = system.process(pid) {
                process.kill();
            }
        }
        Ok(())
    }
}
