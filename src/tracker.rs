//! Execution tracker (C5): a fixed-capacity table of in-flight
//! invocations guarded by a single lock.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, ServerError};

/// Maximum number of concurrently tracked executions.
pub const MAX_EXECUTIONS: usize = 32;

/// Status of a tracked execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// One tracked invocation.
#[derive(Debug, Clone)]
pub struct Execution {
    pub id: u64,
    pub tool_name: String,
    pub client_fd: String,
    pub child_pid: Option<u32>,
    pub start_time: u64,
    pub status: ExecutionStatus,
}

struct TrackerState {
    slots: Vec<Option<Execution>>,
    next_id: u64,
}

/// Fixed array of [`MAX_EXECUTIONS`] slots protected by a single lock;
/// coarse-grained locking is sufficient since every operation here is a
/// short linear scan over at most 32 entries.
pub struct ExecutionTracker {
    state: Mutex<TrackerState>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                slots: (0..MAX_EXECUTIONS).map(|_| None).collect(),
                next_id: 1,
            }),
        }
    }

    /// Find a free slot, assign it a fresh monotonic id, and record it as
    /// running. Returns `ServerError::TrackerFull` if no slot is free. This
    /// is called *before* the child is spawned, so `child_pid` may be
    /// `None` briefly, letting a concurrent client learn the execution id
    /// in time to cancel it.
    pub fn track(&self, tool_name: &str, client_fd: &str, child_pid: Option<u32>) -> Result<u64> {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        let slot_index = state
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(ServerError::TrackerFull)?;
        let id = state.next_id;
        state.next_id += 1;
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        state.slots[slot_index] = Some(Execution {
            id,
            tool_name: tool_name.to_string(),
            client_fd: client_fd.to_string(),
            child_pid,
            start_time,
            status: ExecutionStatus::Running,
        });
        Ok(id)
    }

    /// Fill in the child pid once `spawn()` has succeeded.
    pub fn set_child_pid(&self, id: u64, pid: u32) {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        if let Some(exec) = find_mut(&mut state.slots, id) {
            exec.child_pid = Some(pid);
        }
    }

    /// Update an execution's status. Transitions into `Completed`/`Failed`
    /// are terminal; this does not enforce that itself since
    /// callers only ever transition forward, but re-setting `Running` on a
    /// terminal record is a caller bug, not something this guards against.
    pub fn update(&self, id: u64, status: ExecutionStatus) {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        if let Some(exec) = find_mut(&mut state.slots, id) {
            exec.status = status;
        }
    }

    /// Look up an execution by id via linear scan.
    pub fn find(&self, id: u64) -> Option<Execution> {
        let state = self.state.lock().expect("tracker mutex poisoned");
        state.slots.iter().flatten().find(|e| e.id == id).cloned()
    }

    /// Free the slot held by `id`, once the child has been reaped.
    pub fn cleanup(&self, id: u64) {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        if let Some(slot) = state.slots.iter_mut().find(|s| matches!(s, Some(e) if e.id == id)) {
            *slot = None;
        }
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn find_mut(slots: &mut [Option<Execution>], id: u64) -> Option<&mut Execution> {
    slots.iter_mut().flatten().find(|e| e.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_assigns_monotonic_ids() {
        let tracker = ExecutionTracker::new();
        let a = tracker.track("ls", "fd1", None).unwrap();
        let b = tracker.track("pwd", "fd1", None).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_track_full_when_all_slots_used() {
        let tracker = ExecutionTracker::new();
        for _ in 0..MAX_EXECUTIONS {
            tracker.track("ls", "fd1", None).unwrap();
        }
        assert!(matches!(
            tracker.track("ls", "fd1", None),
            Err(ServerError::TrackerFull)
        ));
    }

    #[test]
    fn test_cleanup_frees_slot_for_reuse() {
        let tracker = ExecutionTracker::new();
        for _ in 0..MAX_EXECUTIONS {
            tracker.track("ls", "fd1", None).unwrap();
        }
        let all = (1..=MAX_EXECUTIONS as u64).collect::<Vec<_>>();
        tracker.cleanup(all[0]);
        // A slot is now free.
        assert!(tracker.track("ls", "fd1", None).is_ok());
    }

    #[test]
    fn test_update_and_find_round_trip() {
        let tracker = ExecutionTracker::new();
        let id = tracker.track("find", "fd1", Some(42)).unwrap();
        tracker.update(id, ExecutionStatus::Completed);
        let exec = tracker.find(id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.child_pid, Some(42));
    }

    #[test]
    fn test_find_missing_id_returns_none() {
        let tracker = ExecutionTracker::new();
        assert!(tracker.find(999).is_none());
    }

    #[test]
    fn test_set_child_pid_after_spawn() {
        let tracker = ExecutionTracker::new();
        let id = tracker.track("find", "fd1", None).unwrap();
        assert!(tracker.find(id).unwrap().child_pid.is_none());
        tracker.set_child_pid(id, 1234);
        assert_eq!(tracker.find(id).unwrap().child_pid, Some(1234));
    }
}
