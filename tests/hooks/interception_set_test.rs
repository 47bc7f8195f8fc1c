//! Tests for `InterceptionSet` install/rollback/uninstall.

use std::thread;

use straylight::hooks::{
    DispatchTable, Handle, HookBackend, HookDescriptor, HookError, InterceptionSet,
};

const SYMBOLS: [&str; 5] = ["point_a", "point_b", "point_c", "point_d", "point_e"];

fn original(i: usize) -> Handle {
    Handle(0x1000 + i)
}

fn replacement(i: usize) -> Handle {
    Handle(0x9000 + i)
}

fn backend() -> DispatchTable {
    let table = DispatchTable::new();
    for (i, symbol) in SYMBOLS.into_iter().enumerate() {
        table.define_function(symbol, Handle(0x100 + i), original(i));
    }
    table.define_table("call_table", Handle(0x500), [(59, Handle(0x5059))]);
    table
}

fn five_point_set() -> InterceptionSet<5> {
    InterceptionSet::new(
        "five",
        [
            HookDescriptor::inline("point_a", replacement(0)),
            HookDescriptor::inline("point_b", replacement(1)),
            HookDescriptor::inline("point_c", replacement(2)),
            HookDescriptor::inline("point_d", replacement(3)),
            HookDescriptor::inline("point_e", replacement(4)),
        ],
    )
}

fn assert_pristine(table: &DispatchTable) {
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        assert_eq!(table.current(symbol), Some(original(i)), "{symbol}");
    }
    assert_eq!(table.current_slot("call_table", 59), Some(Handle(0x5059)));
    assert_eq!(table.active_hooks(), 0);
}

#[test]
fn install_applies_every_hook_and_saves_originals() {
    let table = backend();
    let set = five_point_set();

    assert!(set.install(&table));
    assert!(set.is_installed());
    assert_eq!(table.active_hooks(), 5);
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        assert_eq!(table.current(symbol), Some(replacement(i)));
        assert_eq!(set.saved_original(symbol), Some(original(i)));
    }
}

#[test]
fn kth_apply_failure_rolls_back_earlier_hooks() {
    for (k, symbol) in SYMBOLS.into_iter().enumerate() {
        let table = backend();
        table.fail_apply_on(symbol);
        let set = five_point_set();

        let result = set.try_install(&table);
        assert!(
            matches!(result, Err(HookError::ApplyFailed { symbol: s, .. }) if s == symbol),
            "failure at hook {k} should surface, got {result:?}"
        );
        assert!(!set.is_installed());
        assert_pristine(&table);
        for other in SYMBOLS {
            assert_eq!(set.saved_original(other), None);
        }
    }
}

#[test]
fn install_reports_false_on_failure() {
    let table = backend();
    table.fail_apply_on("point_c");
    let set = five_point_set();

    assert!(!set.install(&table));
    assert!(!set.is_installed());
    assert_pristine(&table);
}

#[test]
fn unresolved_symbol_is_bad_address_and_touches_nothing() {
    let table = backend();
    let set = InterceptionSet::new(
        "partial",
        [
            HookDescriptor::inline("point_a", replacement(0)),
            HookDescriptor::inline("missing_point", replacement(1)),
        ],
    );

    assert_eq!(
        set.try_install(&table),
        Err(HookError::BadAddress {
            symbol: "missing_point"
        })
    );
    assert!(!set.is_installed());
    assert_pristine(&table);
}

#[test]
fn double_install_is_a_noop() {
    let table = backend();
    let set = five_point_set();

    assert!(set.install(&table));
    assert!(set.install(&table));
    assert_eq!(set.try_install(&table), Ok(()));
    assert_eq!(table.active_hooks(), 5);
    assert_eq!(set.saved_original("point_a"), Some(original(0)));
}

#[test]
fn uninstall_restores_and_clears_saved_state() {
    let table = backend();
    let set = five_point_set();
    assert!(set.install(&table));

    assert!(set.uninstall(&table));
    assert!(!set.is_installed());
    assert_pristine(&table);
    assert_eq!(set.saved_original("point_a"), None);

    // Already uninstalled: still a success.
    assert!(set.uninstall(&table));
    assert_pristine(&table);
}

#[test]
fn uninstall_of_never_installed_set_succeeds() {
    let table = backend();
    let set = InterceptionSet::new("idle", [HookDescriptor::inline("point_a", replacement(0))]);

    assert!(set.uninstall(&table));
    assert!(!set.is_installed());
    assert_pristine(&table);
}

#[test]
fn first_hook_failure_leaves_nothing_to_roll_back() {
    let table = backend();
    table.fail_apply_on("point_a");
    let set = five_point_set();

    assert!(matches!(
        set.try_install(&table),
        Err(HookError::ApplyFailed { symbol: "point_a", .. })
    ));
    assert!(!set.is_installed());
    assert_pristine(&table);
    // The set stays usable once the backend recovers.
    let healthy = backend();
    assert!(set.install(&healthy));
    assert_eq!(healthy.active_hooks(), 5);
}

#[test]
fn reinstall_after_uninstall_works() {
    let table = backend();
    let set = five_point_set();
    assert!(set.install(&table));
    assert!(set.uninstall(&table));
    assert!(set.install(&table));
    assert_eq!(table.active_hooks(), 5);
}

#[test]
fn mixed_inline_and_syscall_set() {
    let table = backend();
    let set = InterceptionSet::new(
        "mixed",
        [
            HookDescriptor::inline("point_a", replacement(0)),
            HookDescriptor::inline("point_b", replacement(1)),
            HookDescriptor::syscall("call_table", 59, Handle(0x7777)),
        ],
    );

    assert!(set.install(&table));
    assert_eq!(table.current_slot("call_table", 59), Some(Handle(0x7777)));
    assert_eq!(set.saved_original("call_table"), Some(Handle(0x5059)));

    assert!(set.uninstall(&table));
    assert_pristine(&table);
}

#[test]
fn syscall_failure_rolls_back_inline_hooks() {
    let table = backend();
    table.fail_apply_on("call_table");
    let set = InterceptionSet::new(
        "mixed",
        [
            HookDescriptor::inline("point_a", replacement(0)),
            HookDescriptor::inline("point_b", replacement(1)),
            HookDescriptor::syscall("call_table", 59, Handle(0x7777)),
        ],
    );

    assert!(!set.install(&table));
    assert_pristine(&table);
}

#[test]
fn overlapping_sets_conflict_cleanly() {
    let table = backend();
    let first = InterceptionSet::new("first", [HookDescriptor::inline("point_e", replacement(4))]);
    let second = InterceptionSet::new(
        "second",
        [
            HookDescriptor::inline("point_d", replacement(3)),
            HookDescriptor::inline("point_e", Handle(0xdead)),
        ],
    );

    assert!(first.install(&table));
    assert!(!second.install(&table));
    assert_eq!(table.current("point_d"), Some(original(3)));
    assert_eq!(table.current("point_e"), Some(replacement(4)));
    assert_eq!(table.active_hooks(), 1);
}

#[test]
fn racing_install_and_uninstall_leave_consistent_state() {
    let table = backend();
    let set = five_point_set();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    set.install(&table);
                    set.uninstall(&table);
                }
            });
        }
    });

    let expected = if set.is_installed() { 5 } else { 0 };
    assert_eq!(table.active_hooks(), expected);
    if !set.is_installed() {
        assert_pristine(&table);
    }
}

#[test]
fn backend_trait_is_object_safe() {
    let table = backend();
    let backend: &dyn HookBackend = &table;
    let descriptor = HookDescriptor::inline("point_a", replacement(0));
    assert_eq!(backend.resolve(&descriptor), Some(Handle(0x100)));
}
