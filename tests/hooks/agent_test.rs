//! Tests for `src/agent.rs` lifecycle ordering.

use straylight::agent::{Agent, SetReport};
use straylight::hooks::{DispatchTable, Handle, HookDescriptor, InterceptionSet};

fn backend() -> DispatchTable {
    let table = DispatchTable::new();
    for (i, symbol) in ["report_a", "report_b", "report_c", "report_d", "report_e"]
        .into_iter()
        .enumerate()
    {
        table.define_function(symbol, Handle(0x100 + i), Handle(0x1000 + i));
    }
    table.define_function("open_a", Handle(0x200), Handle(0x2000));
    table.define_function("open_b", Handle(0x201), Handle(0x2001));
    table.define_table("call_table", Handle(0x500), [(2, Handle(0x5002))]);
    table.define_function("text_a", Handle(0x300), Handle(0x3000));
    table
}

fn agent() -> Agent {
    let mut agent = Agent::new();
    agent.register(Box::new(InterceptionSet::new(
        "five_point",
        [
            HookDescriptor::inline("report_a", Handle(0x9000)),
            HookDescriptor::inline("report_b", Handle(0x9001)),
            HookDescriptor::inline("report_c", Handle(0x9002)),
            HookDescriptor::inline("report_d", Handle(0x9003)),
            HookDescriptor::inline("report_e", Handle(0x9004)),
        ],
    )));
    agent.register(Box::new(InterceptionSet::new(
        "two_plus_syscall",
        [
            HookDescriptor::inline("open_a", Handle(0x9100)),
            HookDescriptor::inline("open_b", Handle(0x9101)),
            HookDescriptor::syscall("call_table", 2, Handle(0x9102)),
        ],
    )));
    agent.register(Box::new(InterceptionSet::new(
        "single",
        [HookDescriptor::inline("text_a", Handle(0x9200))],
    )));
    agent
}

#[test]
fn start_installs_every_set() {
    let table = backend();
    let agent = agent();

    let reports = agent.start(&table);
    assert!(reports.iter().all(|r| r.installed));
    assert_eq!(
        agent.installed(),
        vec!["five_point", "two_plus_syscall", "single"]
    );
    assert_eq!(table.active_hooks(), 9);
    assert!(agent.registry().is_initialized());
}

#[test]
fn failing_set_stays_off_without_stopping_others() {
    let table = backend();
    table.fail_apply_on("call_table");
    let agent = agent();

    let reports = agent.start(&table);
    assert_eq!(
        reports,
        vec![
            SetReport {
                name: "five_point",
                installed: true
            },
            SetReport {
                name: "two_plus_syscall",
                installed: false
            },
            SetReport {
                name: "single",
                installed: true
            },
        ]
    );
    assert_eq!(table.active_hooks(), 6);
    assert_eq!(table.current("open_a"), Some(Handle(0x2000)));
}

#[test]
fn retry_only_touches_sets_that_are_off() {
    let table = backend();
    table.define_function("late_symbol", Handle(0x400), Handle(0x4000));
    let mut agent = agent();
    agent.register(Box::new(InterceptionSet::new(
        "late",
        [HookDescriptor::inline("late_symbol", Handle(0x9300))],
    )));
    table.fail_apply_on("text_a");

    agent.start(&table);
    assert_eq!(agent.installed().len(), 3);

    let retried = agent.retry(&table);
    assert_eq!(retried.len(), 1);
    assert_eq!(retried.first().map(|r| r.name), Some("single"));
}

#[test]
fn shutdown_uninstalls_everything_then_tears_down_registry() {
    let table = backend();
    let agent = agent();
    agent.start(&table);
    agent
        .device()
        .open()
        .write(b"PTRACE:7")
        .expect("write accepted");

    agent.shutdown(&table);
    assert!(agent.installed().is_empty());
    assert_eq!(table.active_hooks(), 0);
    assert_eq!(table.current_slot("call_table", 2), Some(Handle(0x5002)));
    assert!(!agent.registry().is_initialized());
}
