use std::any::Any;

use ahash::AHashMap;
use kernel_core::{ResourceId, SchedulerError, SystemId};
use kernel_graph::{DiGraph, VertexId};

use crate::{Resource, ResourceManagerConfig};

fn vid(system: SystemId) -> VertexId {
    VertexId(system.0)
}

/// Tracks per-system read/write declarations against a set of named
/// resources and derives the ordering edges that guarantee
/// race-freedom: two writers of the same resource are serialised, a
/// writer runs before any reader of the same resource, and readers
/// never conflict with each other.
pub struct ResourceManager {
    resources: Vec<Resource>,
    index_by_key: AHashMap<&'static str, ResourceId>,
    highest_system_id: Option<usize>,
    global_graph: DiGraph,
    /// Disjunction of every resource's dirty bit, plus set directly by
    /// `add_resource` and `note_system_id`.
    dirty: bool,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::with_capacity(ResourceManagerConfig::default())
    }

    pub fn with_capacity(config: ResourceManagerConfig) -> Self {
        Self {
            resources: Vec::with_capacity(config.initial_resource_capacity),
            index_by_key: AHashMap::default(),
            highest_system_id: None,
            global_graph: DiGraph::new(),
            dirty: true,
        }
    }

    /// Register a resource under its type name, deduplicating repeat
    /// registrations of the same type. Returns the resource's dense id.
    pub fn add_resource<T: Any + Send + Sync>(&mut self, payload: T) -> ResourceId {
        let key = std::any::type_name::<T>();

        if let Some(&id) = self.index_by_key.get(key) {
            return id;
        }

        let id = ResourceId(self.resources.len());
        self.resources.push(Resource::new(key, Box::new(payload)));
        self.index_by_key.insert(key, id);
        self.dirty = true;

        id
    }

    pub fn fetch_resource<T: Any>(&self, id: ResourceId) -> Option<&T> {
        self.resources.get(id.0)?.payload.downcast_ref::<T>()
    }

    pub fn fetch_resource_mut<T: Any>(&mut self, id: ResourceId) -> Option<&mut T> {
        self.resources.get_mut(id.0)?.payload.downcast_mut::<T>()
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.0)
    }

    /// Record that `system` is interested in reading `resource`.
    ///
    /// Returns [`SchedulerError::ReadWriteConflict`] if `system` is
    /// already a writer of `resource` — a single system may never be
    /// both a reader and a writer of one resource. This is a
    /// program-logic error in the caller; per §7 of the design, callers
    /// that consider it fatal should `.expect()` the result rather than
    /// silently discard it (see `Scheduler::declare_read`).
    pub fn add_read_request(
        &mut self,
        system: SystemId,
        resource: ResourceId,
    ) -> Result<(), SchedulerError> {
        self.note_system_id(system);

        let res = &mut self.resources[resource.0];
        if res.writers.contains(&system) {
            return Err(SchedulerError::ReadWriteConflict { system, resource });
        }

        if res.readers.insert(system) {
            res.dirty = true;
            self.dirty = true;
        }
        Ok(())
    }

    /// Record that `system` is interested in writing `resource`.
    ///
    /// Returns [`SchedulerError::ReadWriteConflict`] if `system` is
    /// already a reader of `resource`.
    pub fn add_write_request(
        &mut self,
        system: SystemId,
        resource: ResourceId,
    ) -> Result<(), SchedulerError> {
        self.note_system_id(system);

        let res = &mut self.resources[resource.0];
        if res.readers.contains(&system) {
            return Err(SchedulerError::ReadWriteConflict { system, resource });
        }

        if res.writers.insert(system) {
            res.dirty = true;
            self.dirty = true;
        }
        Ok(())
    }

    /// Remove every reader/writer declaration made by `system`, across
    /// every resource. Called by the scheduler when a system is removed.
    pub fn purge_system(&mut self, system: SystemId) {
        for res in &mut self.resources {
            let removed_r = res.readers.remove(&system);
            let removed_w = res.writers.remove(&system);
            if removed_r || removed_w {
                res.dirty = true;
                self.dirty = true;
            }
        }
    }

    /// Bump the vertex-id watermark without declaring any access. Used
    /// by the scheduler so that a system with no resource declarations
    /// is still accounted for when the conflict graph is sized.
    pub fn note_system_id(&mut self, system: SystemId) {
        self.highest_system_id = Some(self.highest_system_id.map_or(system.0, |h| h.max(system.0)));
    }

    fn graph_size(&self) -> usize {
        self.highest_system_id.map_or(0, |h| h + 1)
    }

    /// Rebuild a single resource's cached conflict subgraph:
    /// writer-before-every-other-writer (ascending system id, giving a
    /// deterministic total order) and writer-before-every-reader.
    /// Unconditional: always rebuilds and clears the resource's dirty bit.
    pub fn rebuild_resource_graph(&mut self, resource: ResourceId) {
        let size = self.graph_size();
        let res = &mut self.resources[resource.0];

        let mut writers: Vec<SystemId> = res.writers.iter().copied().collect();
        writers.sort();

        let mut graph = DiGraph::dense(size);
        for i in 0..writers.len() {
            for j in (i + 1)..writers.len() {
                graph.add_edge(vid(writers[i]), vid(writers[j]));
            }
        }
        for &w in &writers {
            for r in res.readers.iter().copied() {
                graph.add_edge(vid(w), vid(r));
            }
        }

        res.graph = graph;
        res.dirty = false;
    }

    /// Rebuild the global conflict graph if anything is dirty: rebuilds
    /// every resource's subgraph and merge-unions them together.
    /// Idempotent when no requests were made since the last rebuild.
    pub fn rebuild_global_graph(&mut self) -> &DiGraph {
        let needs_rebuild = self.dirty || self.resources.iter().any(|r| r.dirty);

        if needs_rebuild {
            let size = self.graph_size();

            for i in 0..self.resources.len() {
                self.rebuild_resource_graph(ResourceId(i));
            }

            let mut fused = DiGraph::dense(size);
            for res in &self.resources {
                fused.merge_edges_into(&res.graph);
            }

            self.global_graph = fused;
            self.dirty = false;

            log::debug!(
                "rebuilt global resource conflict graph over {} resources, {} systems",
                self.resources.len(),
                size
            );
        }

        &self.global_graph
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.resources.iter().any(|r| r.dirty)
    }
}
