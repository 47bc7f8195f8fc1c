//! Agent lifecycle: registry, device channel, and interception sets.
//!
//! Startup initializes the registry before anything can reach it and then
//! installs each registered set. A set that fails to install leaves its
//! capability off without stopping the agent. Shutdown uninstalls sets in
//! reverse registration order and tears the registry down last.

use std::sync::Arc;

use tracing::{info, warn};

use crate::device::Device;
use crate::hooks::{HookBackend, Interception};
use crate::registry::Registry;

/// Outcome of installing one set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetReport {
    /// Set name.
    pub name: &'static str,
    /// Whether the set is live.
    pub installed: bool,
}

/// The resident agent.
pub struct Agent {
    registry: Arc<Registry>,
    device: Device,
    sets: Vec<Box<dyn Interception>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sets.iter().map(|s| s.name()).collect();
        f.debug_struct("Agent")
            .field("registry", &self.registry)
            .field("sets", &names)
            .finish()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent {
    /// Create an agent with an initialized registry and no sets.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        registry.init();
        let device = Device::new(Arc::clone(&registry));
        Self {
            registry,
            device,
            sets: Vec::new(),
        }
    }

    /// Register a set; sets are installed in registration order.
    pub fn register(&mut self, set: Box<dyn Interception>) {
        self.sets.push(set);
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Device channel over the registry.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Install every registered set.
    pub fn start(&self, backend: &dyn HookBackend) -> Vec<SetReport> {
        let reports: Vec<SetReport> = self
            .sets
            .iter()
            .map(|set| {
                let installed = set.install(backend);
                if !installed {
                    warn!(set = set.name(), "capability unavailable");
                }
                SetReport {
                    name: set.name(),
                    installed,
                }
            })
            .collect();

        let live = reports.iter().filter(|r| r.installed).count();
        info!(sets = reports.len(), live, "agent started");
        reports
    }

    /// Try again to install sets that are not live.
    pub fn retry(&self, backend: &dyn HookBackend) -> Vec<SetReport> {
        self.sets
            .iter()
            .filter(|set| !set.is_installed())
            .map(|set| SetReport {
                name: set.name(),
                installed: set.install(backend),
            })
            .collect()
    }

    /// Names of live sets, in registration order.
    pub fn installed(&self) -> Vec<&'static str> {
        self.sets
            .iter()
            .filter(|s| s.is_installed())
            .map(|s| s.name())
            .collect()
    }

    /// Uninstall sets in reverse order and tear the registry down.
    pub fn shutdown(&self, backend: &dyn HookBackend) {
        for set in self.sets.iter().rev() {
            set.uninstall(backend);
        }
        self.registry.teardown();
        info!("agent stopped");
    }
}
