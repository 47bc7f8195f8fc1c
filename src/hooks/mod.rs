//! Interception coordinator.
//!
//! An [`InterceptionSet`] applies a fixed list of [`HookDescriptor`]s as one
//! unit: either every hook is live or none is. How a symbol is found and how
//! a hook is physically applied is the [`HookBackend`]'s concern.

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

pub mod table;

pub use table::DispatchTable;

/// Opaque address-like token handed out by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub usize);

/// How an interception point is hooked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Redirect a named function to a replacement.
    Inline,
    /// Replace one entry of a call table, by number.
    Syscall {
        /// Table slot.
        number: u32,
    },
}

/// One interception point: where, how, and what to call instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookDescriptor {
    /// Symbol the backend resolves.
    pub symbol: &'static str,
    /// Hook mechanism.
    pub kind: HookKind,
    /// Replacement entry point.
    pub replacement: Handle,
}

impl HookDescriptor {
    /// Function hook on `symbol`.
    pub const fn inline(symbol: &'static str, replacement: Handle) -> Self {
        Self {
            symbol,
            kind: HookKind::Inline,
            replacement,
        }
    }

    /// Call-table hook on slot `number`, resolved through `symbol`.
    pub const fn syscall(symbol: &'static str, number: u32, replacement: Handle) -> Self {
        Self {
            symbol,
            kind: HookKind::Syscall { number },
            replacement,
        }
    }
}

/// Coordinator failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// The backend could not resolve a symbol.
    #[error("cannot resolve `{symbol}`")]
    BadAddress {
        /// Unresolved symbol.
        symbol: &'static str,
    },

    /// The backend refused to apply a hook.
    #[error("applying hook on `{symbol}` failed: {reason}")]
    ApplyFailed {
        /// Symbol being hooked.
        symbol: &'static str,
        /// Backend-provided detail.
        reason: String,
    },
}

/// Physical hook mechanism.
///
/// `apply` must either fully succeed or leave the target untouched; the
/// coordinator relies on that to roll back with `remove` alone.
pub trait HookBackend: Send + Sync {
    /// Locate the interception point for `descriptor`.
    fn resolve(&self, descriptor: &HookDescriptor) -> Option<Handle>;

    /// Install `descriptor` at `target` and return the displaced original.
    ///
    /// # Errors
    ///
    /// [`HookError::ApplyFailed`] when the hook cannot be installed.
    fn apply(&self, descriptor: &HookDescriptor, target: Handle) -> Result<Handle, HookError>;

    /// Restore `original` at `target`.
    fn remove(&self, descriptor: &HookDescriptor, target: Handle, original: Handle);
}

/// Object-safe view of a set, for driving several sets of different sizes.
pub trait Interception: Send + Sync {
    /// Set name, for logs.
    fn name(&self) -> &'static str;
    /// Install every hook or none. Returns whether the set is installed afterwards.
    fn install(&self, backend: &dyn HookBackend) -> bool;
    /// Remove every hook. Returns success; an uninstalled set is a no-op.
    fn uninstall(&self, backend: &dyn HookBackend) -> bool;
    /// Whether the set is installed.
    fn is_installed(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct AppliedHook {
    target: Handle,
    saved_original: Handle,
}

#[derive(Debug)]
struct SetState<const N: usize> {
    installed: bool,
    applied: [Option<AppliedHook>; N],
}

/// A named, fixed-size set of hooks installed as one unit.
#[derive(Debug)]
pub struct InterceptionSet<const N: usize> {
    name: &'static str,
    descriptors: [HookDescriptor; N],
    state: Mutex<SetState<N>>,
}

impl<const N: usize> InterceptionSet<N> {
    /// A set in the uninstalled state.
    pub fn new(name: &'static str, descriptors: [HookDescriptor; N]) -> Self {
        Self {
            name,
            descriptors,
            state: Mutex::new(SetState {
                installed: false,
                applied: [None; N],
            }),
        }
    }

    /// Descriptors in install order.
    pub fn descriptors(&self) -> &[HookDescriptor; N] {
        &self.descriptors
    }

    /// Install all hooks, surfacing the first failure.
    ///
    /// Every symbol is resolved before anything is applied. If a hook fails
    /// to apply, those already applied are removed in reverse order and the
    /// set stays uninstalled. Installing an installed set is a no-op.
    ///
    /// # Errors
    ///
    /// [`HookError::BadAddress`] when a symbol is missing (nothing was
    /// touched) or [`HookError::ApplyFailed`] after rollback.
    pub fn try_install(&self, backend: &dyn HookBackend) -> Result<(), HookError> {
        let mut state = self.state.lock();
        if state.installed {
            drop(state);
            debug!(set = self.name, "already installed");
            return Ok(());
        }

        let mut targets = [Handle(0); N];
        for (target, descriptor) in targets.iter_mut().zip(&self.descriptors) {
            *target = backend
                .resolve(descriptor)
                .ok_or(HookError::BadAddress {
                    symbol: descriptor.symbol,
                })?;
        }

        for (i, (descriptor, target)) in self.descriptors.iter().zip(targets).enumerate() {
            match backend.apply(descriptor, target) {
                Ok(saved_original) => {
                    if let Some(slot) = state.applied.get_mut(i) {
                        *slot = Some(AppliedHook {
                            target,
                            saved_original,
                        });
                    }
                }
                Err(e) => {
                    let removed = self.release(&mut state, backend);
                    drop(state);
                    if removed > 0 {
                        warn!(set = self.name, removed, "rolled back partial install");
                    }
                    return Err(e);
                }
            }
        }

        state.installed = true;
        Ok(())
    }

    /// Install all hooks; returns whether the set is installed afterwards.
    pub fn install(&self, backend: &dyn HookBackend) -> bool {
        match self.try_install(backend) {
            Ok(()) => {
                info!(set = self.name, hooks = N, "interception set installed");
                true
            }
            Err(e) => {
                error!(set = self.name, error = %e, "interception set install failed");
                false
            }
        }
    }

    /// Remove all hooks in reverse order and return success.
    ///
    /// Uninstalling a set that is not installed is a no-op.
    pub fn uninstall(&self, backend: &dyn HookBackend) -> bool {
        let mut state = self.state.lock();
        if !state.installed {
            drop(state);
            debug!(set = self.name, "not installed, skipping uninstall");
            return true;
        }
        let removed = self.release(&mut state, backend);
        drop(state);

        info!(set = self.name, removed, "interception set uninstalled");
        true
    }

    /// Whether every hook is live.
    pub fn is_installed(&self) -> bool {
        self.state.lock().installed
    }

    /// The original displaced at `symbol`, while installed.
    pub fn saved_original(&self, symbol: &str) -> Option<Handle> {
        let state = self.state.lock();
        self.descriptors
            .iter()
            .zip(&state.applied)
            .find(|(d, _)| d.symbol == symbol)
            .and_then(|(_, applied)| applied.map(|a| a.saved_original))
    }

    /// Remove applied hooks in reverse order and reset state.
    ///
    /// Runs under the state lock and does not log; returns how many hooks
    /// were removed.
    fn release(&self, state: &mut SetState<N>, backend: &dyn HookBackend) -> usize {
        let mut removed = 0_usize;
        for (descriptor, slot) in self.descriptors.iter().zip(state.applied.iter_mut()).rev() {
            if let Some(applied) = slot.take() {
                backend.remove(descriptor, applied.target, applied.saved_original);
                removed = removed.saturating_add(1);
            }
        }
        state.installed = false;
        removed
    }
}

impl<const N: usize> Interception for InterceptionSet<N> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn install(&self, backend: &dyn HookBackend) -> bool {
        InterceptionSet::install(self, backend)
    }

    fn uninstall(&self, backend: &dyn HookBackend) -> bool {
        InterceptionSet::uninstall(self, backend)
    }

    fn is_installed(&self) -> bool {
        InterceptionSet::is_installed(self)
    }
}
