//! Point-in-time snapshot of the processes visible to this client.

#[cfg(unix)]
use sysinfo::{Pid, Process, ProcessesToUpdate, System};

/// A snapshot of host processes taken at capture time.
///
/// Capture failure is never fatal: an empty snapshot means no existing
/// server will be found and the caller moves on to spawning one.
pub struct ProcessSnapshot {
    #[cfg(unix)]
    system: System,
    #[cfg(windows)]
    pids: Vec<u32>,
}

impl ProcessSnapshot {
    pub fn capture() -> Self {
        #[cfg(unix)]
        {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::All, true);
            Self { system }
        }
        #[cfg(windows)]
        {
            Self {
                pids: enumerate_pids().unwrap_or_default(),
            }
        }
    }

    /// All pids in the snapshot, unordered.
    pub fn pids(&self) -> Vec<u32> {
        #[cfg(unix)]
        {
            self.system.processes().keys().map(|pid| pid.as_u32()).collect()
        }
        #[cfg(windows)]
        {
            self.pids.clone()
        }
    }

    #[cfg(unix)]
    pub(crate) fn process(&self, pid: u32) -> Option<&Process> {
        self.system.process(Pid::from_u32(pid))
    }
}

/// Enumerate pids with a doubling buffer: the snapshot is complete once the
/// system reports fewer pids than the buffer has room for.
#[cfg(windows)]
fn enumerate_pids() -> Option<Vec<u32>> {
    use windows_sys::Win32::System::ProcessStatus::K32EnumProcesses;

    const DWORD_SIZE: u32 = std::mem::size_of::<u32>() as u32;

    let mut pids: Vec<u32> = vec![0; 64];
    loop {
        let capacity_bytes = pids.len() as u32 * DWORD_SIZE;
        let mut written_bytes = 0u32;
        let ok = unsafe { K32EnumProcesses(pids.as_mut_ptr(), capacity_bytes, &mut written_bytes) };
        if ok == 0 {
            tracing::warn!("process enumeration failed");
            return None;
        }
        let written = (written_bytes / DWORD_SIZE) as usize;
        if written < pids.len() {
            pids.truncate(written);
            return Some(pids);
        }
        let doubled = pids.len() * 2;
        pids.resize(doubled, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_contains_this_process() {
        let snapshot = ProcessSnapshot::capture();
        let own_pid = std::process::id();
        assert!(snapshot.pids().contains(&own_pid));
    }

    #[test]
    fn snapshot_has_more_than_one_process() {
        let snapshot = ProcessSnapshot::capture();
        assert!(snapshot.pids().len() > 1);
    }
}
