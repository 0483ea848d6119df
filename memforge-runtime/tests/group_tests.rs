//! Thread-group engine tests: dispatch, start/join discipline, pinning
//! bookkeeping, timing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memforge_primitives::cpu_range::{cpu_id_at, SubRange};
use memforge_primitives::mem_config::{MemClass, MemoryConfig};
use memforge_primitives::placement::AccessPattern;
use memforge_primitives::seg_ptr::{vmalloc_in, SegPtr};
use memforge_primitives::timing::TimeUnit;
use memforge_runtime::{
    PinPolicy, Replicate, RuntimeError, Split, ThreadGroup, ThreadManager, Timing,
};

fn test_config() -> MemoryConfig {
    MemoryConfig::from_entries([(0, MemClass::Dram)])
}

fn column(len: usize) -> SegPtr<u32, 16> {
    vmalloc_in(len, Some(AccessPattern::Linear), &test_config()).unwrap()
}

#[test]
fn test_every_worker_runs_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut group = ThreadGroup::spawn(
        "counter",
        4,
        Timing::OFF,
        (Replicate(Arc::clone(&calls)),),
        |(calls,): (Arc<AtomicUsize>,)| {
            calls.fetch_add(1, Ordering::SeqCst);
        },
    );
    group.run().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_split_slivers_cover_the_buffer_disjointly() {
    let mut data = column(28); // 7 segments of 4 elements
    for (i, v) in data.as_mut_slice().iter_mut().enumerate() {
        *v = i as u32;
    }

    let mut group = ThreadGroup::spawn(
        "double",
        3,
        Timing::OFF,
        (Split(data.clone()),),
        |(mut sliver,): (SegPtr<u32, 16>,)| {
            for seg in 0..sliver.segment_count() {
                for v in sliver.segment_mut(seg) {
                    *v *= 2;
                }
            }
        },
    );
    group.run().unwrap();

    // Every element doubled exactly once: the slivers partitioned the buffer.
    for (i, &v) in data.as_slice().iter().enumerate() {
        assert_eq!(v, 2 * i as u32);
    }
}

#[test]
fn test_replicated_values_are_per_worker_copies() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut group = ThreadGroup::spawn(
        "isolated",
        3,
        Timing::OFF,
        (Replicate(vec![1u32, 2, 3]), Replicate(Arc::clone(&seen))),
        |(mut local, seen): (Vec<u32>, Arc<AtomicUsize>)| {
            // Mutating the local copy must not be visible anywhere else.
            local.push(99);
            seen.fetch_add(local.len(), Ordering::SeqCst);
        },
    );
    group.run().unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 3 * 4);
}

#[test]
fn test_second_start_fails() {
    let mut group = ThreadGroup::spawn("once", 2, Timing::OFF, (Replicate(0u32),), |_| {});
    let join = group.run_async().unwrap();
    let err = group.run_async().unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyStarted(_)));
    join.join();
}

#[test]
fn test_join_completes_only_after_all_workers_returned() {
    let done = Arc::new(AtomicUsize::new(0));
    let mut group = ThreadGroup::spawn(
        "stagger",
        4,
        Timing::OFF,
        (Replicate(Arc::clone(&done)),),
        |(done,): (Arc<AtomicUsize>,)| {
            std::thread::sleep(std::time::Duration::from_millis(5));
            done.fetch_add(1, Ordering::SeqCst);
        },
    );
    group.run().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 4);
}

#[test]
#[should_panic(expected = "panicked")]
fn test_worker_panic_propagates_out_of_join() {
    let mut group = ThreadGroup::spawn("boom", 2, Timing::OFF, (Replicate(0u32),), |_| {
        panic!("operator failure");
    });
    let _ = group.run();
}

#[test]
fn test_unstarted_group_drop_releases_workers() {
    let group = ThreadGroup::spawn("parked", 3, Timing::OFF, (Replicate(0u32),), |_| {});
    drop(group); // must not hang
}

#[test]
fn test_group_timing_spans_workers() {
    let mut group = ThreadGroup::spawn(
        "timed",
        3,
        Timing::FULL,
        (Replicate(0u32),),
        |_| std::thread::sleep(std::time::Duration::from_millis(5)),
    );
    group.run().unwrap();
    let total = group.group_duration(TimeUnit::Millis).unwrap();
    assert!(total >= 2.0, "group duration {total} ms too small");
    let workers = group.worker_durations(TimeUnit::Millis).unwrap();
    assert_eq!(workers.len(), 3);
    assert!(workers.iter().all(|&ms| ms >= 2.0));
}

#[test]
fn test_timing_off_reports_nothing() {
    let mut group = ThreadGroup::spawn("untimed", 2, Timing::OFF, (Replicate(0u32),), |_| {});
    group.run().unwrap();
    assert!(group.group_duration(TimeUnit::Millis).is_none());
    assert!(group.worker_durations(TimeUnit::Millis).is_none());
}

#[test]
fn test_manager_rejects_duplicate_and_zero_worker_groups() {
    let mut tm = ThreadManager::new(PinPolicy::Manual, vec![]);
    tm.create_group("g", 2, Timing::OFF, (Replicate(0u32),), |_| {})
        .unwrap();
    let dup = tm
        .create_group("g", 2, Timing::OFF, (Replicate(0u32),), |_| {})
        .unwrap_err();
    assert!(matches!(dup, RuntimeError::DuplicateGroup(_)));
    let zero = tm
        .create_group("h", 0, Timing::OFF, (Replicate(0u32),), |_| {})
        .unwrap_err();
    assert!(matches!(zero, RuntimeError::ZeroWorkers));
    tm.run(&["g"]).unwrap();
}

#[test]
fn test_manager_unknown_group() {
    let mut tm = ThreadManager::new(PinPolicy::Manual, vec![]);
    let err = tm.run(&["ghost"]).unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownGroup(_)));
}

#[test]
fn test_manager_runs_groups_concurrently() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tm = ThreadManager::new(PinPolicy::Manual, vec![]);
    for id in ["a", "b"] {
        tm.create_group(
            id,
            2,
            Timing::GROUP,
            (Replicate(Arc::clone(&counter)),),
            |(counter,): (Arc<AtomicUsize>,)| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
    }
    tm.run(&["a", "b"]).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_manual_pinning_on_demand() {
    let mut tm = ThreadManager::new(PinPolicy::Manual, vec![]);
    tm.create_group("solo", 2, Timing::OFF, (Replicate(0u32),), |_| {})
        .unwrap();
    assert!(tm.pinning_of("solo").is_none());
    let assigned = tm.pin_group("solo", &[SubRange::new(0, 1)]).unwrap();
    assert_eq!(assigned, vec![0, 0]);
    assert_eq!(tm.pinning_of("solo"), Some(&[0usize, 0][..]));
    tm.run(&["solo"]).unwrap();
}

#[test]
fn test_automatic_pinning_advances_the_cursor() {
    // A single-CPU range keeps the test runnable on any host: every index
    // wraps to CPU 0, and the recorded assignments still prove the cursor
    // walked `sum(workers) + i` for each group in creation order.
    let range = vec![SubRange::new(0, 1)];
    let mut tm = ThreadManager::new(PinPolicy::Automatic, range.clone());
    tm.create_group("first", 3, Timing::OFF, (Replicate(0u32),), |_| {})
        .unwrap();
    tm.create_group("second", 2, Timing::OFF, (Replicate(0u32),), |_| {})
        .unwrap();

    let first = tm.pinning_of("first").unwrap();
    let second = tm.pinning_of("second").unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 2);
    for (i, &cpu) in first.iter().enumerate() {
        assert_eq!(cpu, cpu_id_at(i, &range));
    }
    for (i, &cpu) in second.iter().enumerate() {
        assert_eq!(cpu, cpu_id_at(3 + i, &range));
    }
    tm.run(&["first", "second"]).unwrap();
}
