//! Tests for parallel registry access.

use std::sync::Arc;
use std::thread;

use straylight::registry::{Entry, EntryKind, Registry, RegistryError, CAPACITY};

#[test]
fn parallel_adds_get_distinct_slots() {
    let registry = Arc::new(Registry::new());
    registry.init();

    let workers: Vec<_> = (0..8u32)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                (0..100u32)
                    .map(|n| {
                        registry
                            .add(Entry::ptrace_target(worker * 1000 + n))
                            .expect("below capacity")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut indices: Vec<usize> = workers
        .into_iter()
        .flat_map(|w| w.join().expect("worker panicked"))
        .collect();
    indices.sort_unstable();
    indices.dedup();

    assert_eq!(indices.len(), 800);
    assert_eq!(registry.count(), 800);
    assert_eq!(registry.count_by_type(EntryKind::PtraceTarget), 800);
}

#[test]
fn racing_writers_never_exceed_capacity() {
    let registry = Arc::new(Registry::new());
    registry.init();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut full = 0;
                for _ in 0..400 {
                    match registry.add(Entry::single_path("/race").expect("valid")) {
                        Ok(_) => {}
                        Err(RegistryError::Full { .. }) => full += 1,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                full
            })
        })
        .collect();

    let rejected: usize = workers
        .into_iter()
        .map(|w| w.join().expect("worker panicked"))
        .sum();

    assert_eq!(registry.count(), CAPACITY);
    assert_eq!(rejected, 1600 - CAPACITY);
}

#[test]
fn readers_see_consistent_counts_during_churn() {
    let registry = Arc::new(Registry::new());
    registry.init();

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for n in 0..2000u32 {
                if let Ok(index) = registry.add(Entry::ptrace_target(n)) {
                    if n % 2 == 0 {
                        let _ = registry.remove_by_global_index(index);
                    }
                }
            }
        })
    };

    let reader = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..2000 {
                let status = registry.status();
                assert_eq!(
                    status.total,
                    status.path_mappings + status.single_paths + status.ptrace_targets
                );
            }
        })
    };

    writer.join().expect("writer panicked");
    reader.join().expect("reader panicked");
    assert_eq!(registry.count(), 1000);
}
