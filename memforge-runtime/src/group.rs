//! Thread groups: N workers, one function, disjoint slivers.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use memforge_primitives::cpu_range::{self, PinError, SubRange};
use memforge_primitives::seg_ptr::{SegElem, SegPtr};
use memforge_primitives::timing::{DoubleCallPolicy, SharedStopWatch, StopWatch, TimeUnit};

/// Contract-violation errors of groups and the manager.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("thread group `{0}` already exists")]
    DuplicateGroup(String),

    #[error("thread group needs at least one worker")]
    ZeroWorkers,

    #[error("thread group `{0}` was already started")]
    AlreadyStarted(String),

    #[error("no thread group named `{0}`")]
    UnknownGroup(String),

    #[error(transparent)]
    Pin(#[from] PinError),
}

// --- argument dispatch ---

/// Types that can hand out `n` per-worker parts of themselves.
pub trait Splittable: Sized {
    fn split_n(&self, n: usize) -> Vec<Self>;
}

impl<T: SegElem, const S: usize> Splittable for SegPtr<T, S> {
    fn split_n(&self, n: usize) -> Vec<Self> {
        self.split(n)
    }
}

/// Marks an argument to be cut into per-worker slivers; worker `i` receives
/// part `i`.
pub struct Split<T: Splittable>(pub T);

/// Marks an argument to be handed to every worker as its own value. Cloning
/// (never reference sharing) keeps workers isolated from each other's
/// mutations.
pub struct Replicate<T: Clone>(pub T);

/// Fan an argument bundle out into one bundle per worker.
pub trait FanOut {
    type Per: Send + 'static;

    fn fan_out(self, workers: usize) -> Vec<Self::Per>;
}

impl<T: Splittable + Send + 'static> FanOut for Split<T> {
    type Per = T;

    fn fan_out(self, workers: usize) -> Vec<T> {
        let parts = self.0.split_n(workers);
        assert_eq!(parts.len(), workers, "split produced a wrong part count");
        parts
    }
}

impl<T: Clone + Send + 'static> FanOut for Replicate<T> {
    type Per = T;

    fn fan_out(self, workers: usize) -> Vec<T> {
        vec![self.0; workers]
    }
}

macro_rules! impl_fan_out_tuple {
    ($($name:ident)+) => {
        #[allow(non_snake_case)]
        impl<$($name: FanOut),+> FanOut for ($($name,)+) {
            type Per = ($($name::Per,)+);

            fn fan_out(self, workers: usize) -> Vec<Self::Per> {
                let ($($name,)+) = self;
                $(let mut $name = $name.fan_out(workers).into_iter();)+
                (0..workers)
                    .map(|_| {
                        ($($name.next().expect("fan-out part count mismatch"),)+)
                    })
                    .collect()
            }
        }
    };
}

impl_fan_out_tuple!(A);
impl_fan_out_tuple!(A B);
impl_fan_out_tuple!(A B C);
impl_fan_out_tuple!(A B C D);
impl_fan_out_tuple!(A B C D E);
impl_fan_out_tuple!(A B C D E F);
impl_fan_out_tuple!(A B C D E F G);
impl_fan_out_tuple!(A B C D E F G H);

// --- start signal ---

/// One-shot broadcast the workers of a group block on.
struct StartSignal {
    fired: Mutex<bool>,
    cv: Condvar,
}

impl StartSignal {
    fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn fire(&self) {
        let mut fired = self.fired.lock().expect("start signal lock poisoned");
        *fired = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let fired = self.fired.lock().expect("start signal lock poisoned");
        let _guard = self
            .cv
            .wait_while(fired, |fired| !*fired)
            .expect("start signal lock poisoned");
    }
}

// --- timing ---

/// Which stopwatches bracket the worker calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timing {
    pub group: bool,
    pub workers: bool,
}

impl Timing {
    pub const OFF: Timing = Timing { group: false, workers: false };
    pub const GROUP: Timing = Timing { group: true, workers: false };
    pub const FULL: Timing = Timing { group: true, workers: true };
}

// --- thread group ---

/// A named set of workers running the same function on disjoint slivers.
pub struct ThreadGroup {
    id: String,
    workers: usize,
    signal: Arc<StartSignal>,
    fired: bool,
    timing: Timing,
    /// Handles of workers `0..n-1`; the designated worker (`n-1`) takes and
    /// joins them after its own call returns.
    pool: Arc<Mutex<Vec<Option<JoinHandle<()>>>>>,
    /// Handle of the designated worker, consumed by the first start.
    designated: Option<JoinHandle<()>>,
    group_timer: Arc<SharedStopWatch>,
    worker_timers: Vec<Arc<Mutex<StopWatch>>>,
}

impl ThreadGroup {
    /// Spawn `workers` threads configured to run `f` on the fanned-out
    /// `args`. The threads block on the start signal until [`run`](Self::run)
    /// or [`run_async`](Self::run_async) releases them.
    pub fn spawn<A, F>(id: impl Into<String>, workers: usize, timing: Timing, args: A, f: F) -> Self
    where
        A: FanOut,
        F: Fn(A::Per) + Send + Sync + 'static,
    {
        assert!(workers > 0, "thread group needs at least one worker");
        let id = id.into();
        let signal = Arc::new(StartSignal::new());
        // Earliest start / latest stop: the group round spans from the first
        // worker in to the last worker out.
        let group_timer = Arc::new(SharedStopWatch::with_policies(
            DoubleCallPolicy::SaveEarliest,
            DoubleCallPolicy::SaveLatest,
        ));
        let worker_timers: Vec<_> = (0..workers)
            .map(|_| Arc::new(Mutex::new(StopWatch::new())))
            .collect();
        let pool = Arc::new(Mutex::new(Vec::with_capacity(workers - 1)));
        let f = Arc::new(f);

        let mut designated = None;
        for (worker_id, bundle) in args.fan_out(workers).into_iter().enumerate() {
            let signal = Arc::clone(&signal);
            let group_timer = Arc::clone(&group_timer);
            let worker_timer = Arc::clone(&worker_timers[worker_id]);
            let siblings = Arc::clone(&pool);
            let f = Arc::clone(&f);

            let handle = std::thread::spawn(move || {
                signal.wait();

                if timing.group {
                    group_timer.start();
                }
                if timing.workers {
                    worker_timer.lock().expect("worker timer poisoned").start();
                }

                (*f)(bundle);

                if timing.workers {
                    worker_timer.lock().expect("worker timer poisoned").stop();
                }
                if timing.group {
                    group_timer.stop();
                }

                if worker_id == workers - 1 {
                    // Designated joiner: collect the siblings so the caller
                    // only ever joins this one thread.
                    let handles: Vec<JoinHandle<()>> = {
                        let mut pool = siblings.lock().expect("worker pool poisoned");
                        pool.iter_mut().filter_map(Option::take).collect()
                    };
                    for handle in handles {
                        handle.join().expect("sibling worker panicked");
                    }
                }
            });

            if worker_id == workers - 1 {
                designated = Some(handle);
            } else {
                pool.lock().expect("worker pool poisoned").push(Some(handle));
            }
        }

        tracing::debug!(group = %id, workers, "spawned thread group");
        Self {
            id,
            workers,
            signal,
            fired: false,
            timing,
            pool,
            designated,
            group_timer,
            worker_timers,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Release the workers and block until every one of them has returned.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.run_async()?.join();
        Ok(())
    }

    /// Release the workers and return a handle that joins the whole group.
    /// A second start fails with [`RuntimeError::AlreadyStarted`].
    pub fn run_async(&mut self) -> Result<GroupJoin, RuntimeError> {
        if self.fired {
            return Err(RuntimeError::AlreadyStarted(self.id.clone()));
        }
        self.fired = true;
        self.signal.fire();
        let handle = self
            .designated
            .take()
            .expect("designated handle present until the first start");
        Ok(GroupJoin {
            group_id: self.id.clone(),
            handle,
        })
    }

    /// Pin worker `i` to the `(start_index + i)`-th CPU of `range`. Returns
    /// the CPU id assigned to each worker. Must happen before the group is
    /// started.
    pub fn pin_workers(
        &self,
        range: &[SubRange],
        start_index: usize,
    ) -> Result<Vec<usize>, PinError> {
        use std::os::unix::thread::JoinHandleExt;

        let mut assigned = Vec::with_capacity(self.workers);
        let pool = self.pool.lock().expect("worker pool poisoned");
        for (i, slot) in pool.iter().enumerate() {
            let handle = slot.as_ref().expect("workers still parked before start");
            assigned.push(cpu_range::pin_thread_in_range(
                handle.as_pthread_t(),
                start_index + i,
                range,
            )?);
        }
        let designated = self
            .designated
            .as_ref()
            .expect("workers still parked before start");
        assigned.push(cpu_range::pin_thread_in_range(
            designated.as_pthread_t(),
            start_index + self.workers - 1,
            range,
        )?);
        tracing::debug!(group = %self.id, ?assigned, "pinned thread group");
        Ok(assigned)
    }

    /// Total group duration, when group timing was enabled.
    pub fn group_duration(&self, unit: TimeUnit) -> Option<f64> {
        self.timing.group.then(|| self.group_timer.duration_sum(unit))
    }

    /// Per-worker durations, when worker timing was enabled.
    pub fn worker_durations(&self, unit: TimeUnit) -> Option<Vec<f64>> {
        self.timing.workers.then(|| {
            self.worker_timers
                .iter()
                .map(|t| t.lock().expect("worker timer poisoned").duration_sum(unit))
                .collect()
        })
    }
}

impl Drop for ThreadGroup {
    fn drop(&mut self) {
        // Never-started groups still hold parked workers; release them so
        // the joins below terminate.
        if !self.fired {
            self.signal.fire();
        }
        if let Some(handle) = self.designated.take() {
            let _ = handle.join();
        }
        if let Ok(mut pool) = self.pool.lock() {
            for handle in pool.iter_mut().filter_map(Option::take) {
                let _ = handle.join();
            }
        }
    }
}

/// Join handle for a started group. Joining waits until every worker of the
/// group has terminated; a worker panic propagates out of the join.
#[derive(Debug)]
pub struct GroupJoin {
    group_id: String,
    handle: JoinHandle<()>,
}

impl GroupJoin {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            panic!("worker in thread group `{}` panicked", self.group_id);
        }
    }
}
