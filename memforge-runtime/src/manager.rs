//! Named collection of thread groups with policy-driven CPU pinning.

use memforge_primitives::cpu_range::{total_cpus, CpuRange, SubRange};
use memforge_primitives::timing::TimeUnit;

use crate::group::{FanOut, GroupJoin, RuntimeError, ThreadGroup, Timing};

/// Who pins freshly created groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPolicy {
    /// No pinning unless [`ThreadManager::pin_group`] is called.
    Manual,
    /// Every new group is pinned to the manager's range, continuing where
    /// the previous group left off.
    Automatic,
}

/// Insertion-ordered collection of named thread groups.
pub struct ThreadManager {
    pin_policy: PinPolicy,
    pin_range: CpuRange,
    /// Index of the CPU the next automatically pinned group starts at.
    /// Advances by the worker count of every created group, independent of
    /// the range length (the range wraps).
    next_core_index: usize,
    groups: Vec<ThreadGroup>,
    pinnings: Vec<(String, Vec<usize>)>,
}

impl ThreadManager {
    pub fn new(pin_policy: PinPolicy, pin_range: CpuRange) -> Self {
        assert!(
            pin_policy == PinPolicy::Manual || total_cpus(&pin_range) > 0,
            "automatic pinning needs a non-empty CPU range"
        );
        Self {
            pin_policy,
            pin_range,
            next_core_index: 0,
            groups: Vec::new(),
            pinnings: Vec::new(),
        }
    }

    /// Create (and, under automatic pinning, pin) a named group. The workers
    /// are spawned immediately and park on the group's start signal.
    pub fn create_group<A, F>(
        &mut self,
        id: &str,
        workers: usize,
        timing: Timing,
        args: A,
        f: F,
    ) -> Result<(), RuntimeError>
    where
        A: FanOut,
        F: Fn(A::Per) + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(RuntimeError::ZeroWorkers);
        }
        if self.groups.iter().any(|g| g.id() == id) {
            return Err(RuntimeError::DuplicateGroup(id.to_string()));
        }

        let group = ThreadGroup::spawn(id, workers, timing, args, f);
        if self.pin_policy == PinPolicy::Automatic {
            let assigned = group.pin_workers(&self.pin_range, self.next_core_index)?;
            self.pinnings.push((id.to_string(), assigned));
            self.next_core_index += workers;
        }
        self.groups.push(group);
        Ok(())
    }

    /// Pin an existing group under manual policy. Returns the assigned ids.
    pub fn pin_group(&mut self, id: &str, range: &[SubRange]) -> Result<Vec<usize>, RuntimeError> {
        let group = self.find(id)?;
        let assigned = group.pin_workers(range, 0)?;
        self.pinnings.push((id.to_string(), assigned.clone()));
        Ok(assigned)
    }

    /// Start the listed groups concurrently and block until all of them have
    /// finished.
    pub fn run(&mut self, ids: &[&str]) -> Result<(), RuntimeError> {
        for join in self.run_async(ids)? {
            join.join();
        }
        Ok(())
    }

    /// Start the listed groups and return one join handle per group.
    pub fn run_async(&mut self, ids: &[&str]) -> Result<Vec<GroupJoin>, RuntimeError> {
        let mut joins = Vec::with_capacity(ids.len());
        for id in ids {
            joins.push(self.find_mut(id)?.run_async()?);
        }
        Ok(joins)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// CPU assignments recorded for a group, if it was pinned.
    pub fn pinning_of(&self, id: &str) -> Option<&[usize]> {
        self.pinnings
            .iter()
            .find(|(group_id, _)| group_id == id)
            .map(|(_, cpus)| cpus.as_slice())
    }

    /// Print each group's aggregate duration and per-worker durations.
    pub fn report(&self) {
        for group in &self.groups {
            match group.group_duration(TimeUnit::Millis) {
                Some(ms) => println!("Group {} timing: {ms:.3} ms", group.id()),
                None => println!("Group {} timing: not measured", group.id()),
            }
            match group.worker_durations(TimeUnit::Millis) {
                Some(durations) => {
                    for (i, ms) in durations.iter().enumerate() {
                        println!("  Worker {i} timing: {ms:.3} ms");
                    }
                }
                None => println!("  No worker timings available"),
            }
        }
    }

    /// Print the CPU ids every pinned group's workers were placed on.
    pub fn print_pinnings(&self) {
        for (id, cpus) in &self.pinnings {
            let worker_count = self
                .groups
                .iter()
                .find(|g| g.id() == id)
                .map(|g| g.worker_count())
                .unwrap_or(0);
            let list = cpus
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            println!("Thread group {id} ({worker_count}) pinnings: {list}");
        }
    }

    fn find(&self, id: &str) -> Result<&ThreadGroup, RuntimeError> {
        self.groups
            .iter()
            .find(|g| g.id() == id)
            .ok_or_else(|| RuntimeError::UnknownGroup(id.to_string()))
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut ThreadGroup, RuntimeError> {
        self.groups
            .iter_mut()
            .find(|g| g.id() == id)
            .ok_or_else(|| RuntimeError::UnknownGroup(id.to_string()))
    }
}
