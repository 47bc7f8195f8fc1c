//! In-process hook backend.
//!
//! A [`DispatchTable`] maps symbols to call points. Each point holds the
//! handle callers currently dispatch to; applying a hook swaps it for the
//! replacement and removing the hook swaps the original back.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::{Handle, HookBackend, HookDescriptor, HookError, HookKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Point {
    Function(Handle),
    TableSlot { table: Handle, number: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    current: Handle,
    hooked: bool,
}

#[derive(Debug, Default)]
struct Inner {
    functions: HashMap<&'static str, Handle>,
    tables: HashMap<&'static str, Handle>,
    slots: HashMap<Point, Slot>,
    fail_apply: HashSet<&'static str>,
}

impl Inner {
    fn point(&self, descriptor: &HookDescriptor, target: Handle) -> Point {
        match descriptor.kind {
            HookKind::Inline => Point::Function(target),
            HookKind::Syscall { number } => Point::TableSlot {
                table: target,
                number,
            },
        }
    }
}

/// Symbol-addressed table of swappable call points.
#[derive(Debug, Default)]
pub struct DispatchTable {
    inner: Mutex<Inner>,
}

impl DispatchTable {
    /// Empty table; nothing resolves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register function `symbol` at `address`, currently dispatching to `handler`.
    pub fn define_function(&self, symbol: &'static str, address: Handle, handler: Handle) {
        let mut inner = self.inner.lock();
        inner.functions.insert(symbol, address);
        inner.slots.insert(
            Point::Function(address),
            Slot {
                current: handler,
                hooked: false,
            },
        );
    }

    /// Register call table `symbol` at `address` with numbered `entries`.
    pub fn define_table(
        &self,
        symbol: &'static str,
        address: Handle,
        entries: impl IntoIterator<Item = (u32, Handle)>,
    ) {
        let mut inner = self.inner.lock();
        inner.tables.insert(symbol, address);
        for (number, handler) in entries {
            inner.slots.insert(
                Point::TableSlot {
                    table: address,
                    number,
                },
                Slot {
                    current: handler,
                    hooked: false,
                },
            );
        }
    }

    /// Make every later `apply` on `symbol` fail.
    pub fn fail_apply_on(&self, symbol: &'static str) {
        self.inner.lock().fail_apply.insert(symbol);
    }

    /// Handler a call to function `symbol` dispatches to right now.
    pub fn current(&self, symbol: &str) -> Option<Handle> {
        let inner = self.inner.lock();
        let address = inner.functions.get(symbol)?;
        inner
            .slots
            .get(&Point::Function(*address))
            .map(|s| s.current)
    }

    /// Handler in slot `number` of call table `symbol` right now.
    pub fn current_slot(&self, symbol: &str, number: u32) -> Option<Handle> {
        let inner = self.inner.lock();
        let table = *inner.tables.get(symbol)?;
        inner
            .slots
            .get(&Point::TableSlot { table, number })
            .map(|s| s.current)
    }

    /// Number of points currently hooked.
    pub fn active_hooks(&self) -> usize {
        self.inner.lock().slots.values().filter(|s| s.hooked).count()
    }
}

impl HookBackend for DispatchTable {
    fn resolve(&self, descriptor: &HookDescriptor) -> Option<Handle> {
        let inner = self.inner.lock();
        match descriptor.kind {
            HookKind::Inline => inner.functions.get(descriptor.symbol).copied(),
            HookKind::Syscall { number } => {
                let table = *inner.tables.get(descriptor.symbol)?;
                inner
                    .slots
                    .contains_key(&Point::TableSlot { table, number })
                    .then_some(table)
            }
        }
    }

    fn apply(&self, descriptor: &HookDescriptor, target: Handle) -> Result<Handle, HookError> {
        let mut inner = self.inner.lock();
        let failed = |reason: &str| HookError::ApplyFailed {
            symbol: descriptor.symbol,
            reason: reason.to_owned(),
        };

        if inner.fail_apply.contains(descriptor.symbol) {
            return Err(failed("injected failure"));
        }
        let point = inner.point(descriptor, target);
        let slot = inner
            .slots
            .get_mut(&point)
            .ok_or_else(|| failed("no call point at target"))?;
        if slot.hooked {
            return Err(failed("call point already hooked"));
        }

        let original = slot.current;
        slot.current = descriptor.replacement;
        slot.hooked = true;
        Ok(original)
    }

    fn remove(&self, descriptor: &HookDescriptor, target: Handle, original: Handle) {
        let mut inner = self.inner.lock();
        let point = inner.point(descriptor, target);
        if let Some(slot) = inner.slots.get_mut(&point) {
            slot.current = original;
            slot.hooked = false;
        }
    }
}
