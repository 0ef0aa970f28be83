/// Sizing hints for a [`Scheduler`](crate::Scheduler), analogous to the
/// capacity knobs an audio graph config exposes for its node/edge arenas.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Number of systems to pre-size the dependency graph and node table
    /// for. Purely an optimisation; the scheduler grows past this on demand.
    pub initial_system_capacity: usize,
    /// Forwarded to `ResourceManagerConfig::initial_resource_capacity`
    /// when constructing the scheduler's resource manager.
    pub initial_resource_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_system_capacity: 64,
            initial_resource_capacity: 16,
        }
    }
}
