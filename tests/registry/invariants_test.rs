//! Property tests for registry counters.

use proptest::prelude::*;

use straylight::registry::{Entry, EntryKind, Registry, CAPACITY};

#[derive(Debug, Clone)]
enum Op {
    AddPath(u8),
    AddTarget(u32),
    AddMapping(u32),
    RemoveGlobal(usize),
    RemoveTyped(u8, usize),
    ClearType(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::AddPath),
        4 => any::<u32>().prop_map(Op::AddTarget),
        4 => any::<u32>().prop_map(Op::AddMapping),
        3 => (0..CAPACITY + 8).prop_map(Op::RemoveGlobal),
        2 => (1u8..=3, 0usize..8).prop_map(|(k, i)| Op::RemoveTyped(k, i)),
        1 => (1u8..=3).prop_map(Op::ClearType),
    ]
}

fn kind(id: u8) -> EntryKind {
    EntryKind::from_id(u32::from(id)).expect("strategy yields 1..=3")
}

fn assert_counters(registry: &Registry) {
    let total: usize = EntryKind::ALL
        .iter()
        .map(|k| registry.count_by_type(*k))
        .sum();
    assert_eq!(registry.count(), total);
    assert!(registry.count() <= CAPACITY);
    assert_eq!(
        registry.entries().expect("initialized").len(),
        registry.count()
    );
}

proptest! {
    #[test]
    fn count_equals_sum_of_type_counts(ops in prop::collection::vec(op(), 1..200)) {
        let registry = Registry::new();
        registry.init();

        for op in ops {
            match op {
                Op::AddPath(n) => {
                    let _ = registry.add(Entry::single_path(&format!("/p/{n}")).expect("valid"));
                }
                Op::AddTarget(owner) => {
                    let _ = registry.add(Entry::ptrace_target(owner));
                }
                Op::AddMapping(owner) => {
                    let _ = registry.add(Entry::path_mapping(owner, "/s", "/d").expect("valid"));
                }
                Op::RemoveGlobal(index) => {
                    let before = registry.count();
                    if registry.remove_by_global_index(index).is_err() {
                        prop_assert_eq!(registry.count(), before);
                    }
                }
                Op::RemoveTyped(k, i) => {
                    let _ = registry.remove_by_type_index(kind(k), i);
                }
                Op::ClearType(k) => {
                    registry.clear_by_type(kind(k)).expect("initialized");
                    prop_assert_eq!(registry.count_by_type(kind(k)), 0);
                }
            }
            assert_counters(&registry);
        }
    }

    #[test]
    fn global_indices_are_unique_and_ascending(adds in 1usize..64) {
        let registry = Registry::new();
        registry.init();
        for owner in 0..adds {
            let owner = u32::try_from(owner).expect("small");
            registry.add(Entry::ptrace_target(owner)).expect("below capacity");
        }
        let indices: Vec<usize> = registry
            .entries()
            .expect("initialized")
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }
}
