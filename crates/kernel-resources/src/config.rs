/// Sizing hint for a [`ResourceManager`](crate::ResourceManager), mirroring
/// the capacity knob `kernel_scheduler::SchedulerConfig` exposes for the
/// node table and `DiGraph::with_capacity` exposes for the adjacency
/// arrays — the teacher's `AudioGraphConfig` pre-sizing pattern applied to
/// the resource table instead of the node/edge arenas.
#[derive(Debug, Clone, Copy)]
pub struct ResourceManagerConfig {
    /// Number of resources to pre-size the resource table for. Purely an
    /// optimisation; the manager grows past this on demand.
    pub initial_resource_capacity: usize,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            initial_resource_capacity: 16,
        }
    }
}
