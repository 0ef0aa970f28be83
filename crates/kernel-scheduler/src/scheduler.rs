use std::any::Any;

use ahash::AHashMap;
use kernel_core::{DependencyKey, Phase, ResourceId, SchedulerError, Status, System, SystemId};
use kernel_graph::{DiGraph, GraphError, VertexId};
use kernel_resources::{ResourceManager, ResourceManagerConfig};
use rayon::prelude::*;

use crate::config::SchedulerConfig;
use crate::node::{Level, SystemNodeEntry};

fn vid(id: SystemId) -> VertexId {
    VertexId(id.0)
}

fn sid(id: VertexId) -> SystemId {
    SystemId(id.0)
}

fn take_node(nodes: &mut [Option<SystemNodeEntry>], idx: usize) -> Option<SystemNodeEntry> {
    nodes.get_mut(idx).and_then(Option::take)
}

/// A raw pointer wrapper asserting it is safe to send across the worker
/// pool. Sound only because [`Scheduler::run_update_pass`] hands out
/// disjoint indices within a single parallel bucket (testable property 7).
struct SendPtr<T>(*mut T);
unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}
impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for SendPtr<T> {}

fn run_one(id: SystemId, slot: &mut Option<SystemNodeEntry>, phase: Phase) {
    let Some(entry) = slot.as_mut() else {
        return;
    };
    if !entry.enabled || entry.status == Status::Deprecated {
        return;
    }

    let result = match phase {
        Phase::Awake => entry.system.awake(&entry.deps),
        Phase::Update => entry.system.update(&entry.deps),
        Phase::Shutdown => entry.system.shutdown(&entry.deps),
    };

    match result {
        Ok(()) => {
            entry.status = match phase {
                Phase::Awake | Phase::Update => Status::Ok,
                Phase::Shutdown => Status::Off,
            };
        }
        Err(source) => {
            let err = SchedulerError::SystemOpFailed {
                system: id,
                phase,
                source,
            };
            log::warn!("{err}");
            entry.last_error = Some(err);
            entry.status = Status::Err;
        }
    }
}

/// Translate a dependency-graph [`GraphError`] (vertex-id space) into the
/// [`SchedulerError`] surface callers of `add_dependency` see (system-id
/// space).
fn map_dependency_error(err: GraphError, from: SystemId, to: SystemId) -> SchedulerError {
    match err {
        GraphError::SelfLoop(_) => SchedulerError::CycleIntroduction { from, to },
        GraphError::DeadVertex(v) => SchedulerError::DeadVertexReference(sid(v)),
        GraphError::CycleDetected { .. } => SchedulerError::CycleIntroduction { from, to },
    }
}

/// Owns a set of systems, the explicit-dependency graph between them, and
/// the resource manager their read/write declarations feed. Fuses both
/// graphs into a leveled schedule and dispatches each level's systems,
/// running the parallel-eligible bucket on the worker pool before the
/// main-thread bucket of the same level.
pub struct Scheduler {
    nodes: Vec<Option<SystemNodeEntry>>,
    key_to_id: AHashMap<DependencyKey, SystemId>,
    dep_graph: DiGraph,
    resources: ResourceManager,
    levels: Vec<Level>,
    dirty: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            nodes: Vec::with_capacity(config.initial_system_capacity),
            key_to_id: AHashMap::default(),
            dep_graph: DiGraph::with_capacity(config.initial_system_capacity),
            resources: ResourceManager::with_capacity(ResourceManagerConfig {
                initial_resource_capacity: config.initial_resource_capacity,
            }),
            levels: Vec::new(),
            dirty: true,
        }
    }

    pub fn len(&self) -> usize {
        self.dep_graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dep_graph.is_empty()
    }

    pub fn node(&self, id: SystemId) -> Option<&SystemNodeEntry> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn set_enabled(&mut self, id: SystemId, enabled: bool) {
        if let Some(entry) = self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            entry.enabled = enabled;
        }
    }

    pub fn set_main_thread_only(&mut self, id: SystemId, main_thread_only: bool) {
        if let Some(entry) = self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            entry.main_thread_only = main_thread_only;
        }
        self.dirty = true;
    }

    pub fn set_deprecated(&mut self, id: SystemId) {
        if let Some(entry) = self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            entry.status = Status::Deprecated;
        }
    }

    /// Register a system, deduplicating on its dependency key. A repeat
    /// registration of an already-known key returns the existing id and
    /// does not store the new `system` value.
    pub fn add_system(&mut self, system: Box<dyn System>) -> SystemId {
        let key = system.dependency_key();
        if let Some(&id) = self.key_to_id.get(&key) {
            return id;
        }

        let vertex = self.dep_graph.add_vertex();
        let id = sid(vertex);
        self.resources.note_system_id(id);

        if self.nodes.len() <= id.0 {
            self.nodes.resize_with(id.0 + 1, || None);
        }
        let entry = SystemNodeEntry::new(system);
        self.key_to_id.insert(entry.key.clone(), id);
        self.nodes[id.0] = Some(entry);
        self.dirty = true;

        id
    }

    /// Remove a system's node, its dependency-graph vertex, and every
    /// resource read/write declaration it made.
    pub fn remove_system(&mut self, id: SystemId) {
        let vertex = vid(id);
        if !self.dep_graph.is_alive(vertex) {
            return;
        }

        self.dep_graph.remove_vertex(vertex);
        self.resources.purge_system(id);
        if let Some(entry) = take_node(&mut self.nodes, id.0) {
            self.key_to_id.remove(&entry.key);
        }
        self.dirty = true;
    }

    /// Add the ordering constraint `from` runs before `to`. Returns
    /// [`SchedulerError::CycleIntroduction`] or
    /// [`SchedulerError::DeadVertexReference`] (translated from the
    /// underlying [`GraphError`](kernel_graph::GraphError)) if the edge
    /// is rejected; the graph is unchanged in that case.
    pub fn add_dependency(&mut self, from: SystemId, to: SystemId) -> Result<(), SchedulerError> {
        self.dep_graph
            .try_add_edge(vid(from), vid(to))
            .map_err(|e| map_dependency_error(e, from, to))?;

        let from_key = self.nodes.get(from.0).and_then(Option::as_ref).map(|e| e.key.clone());
        if let (Some(from_key), Some(to_entry)) = (from_key, self.nodes.get_mut(to.0).and_then(Option::as_mut)) {
            to_entry.deps.insert(from_key, from);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn remove_dependency(&mut self, from: SystemId, to: SystemId) -> bool {
        let ok = self.dep_graph.remove_edge(vid(from), vid(to));
        if ok {
            self.dirty = true;
        }
        ok
    }

    /// Fold another scheduler's nodes and dependency edges into this one.
    /// A node in `other` whose dependency key already exists here is
    /// dropped in favour of the existing node; its edges are translated
    /// through to the survivor's id.
    pub fn merge(&mut self, mut other: Scheduler) {
        let mut id_map: AHashMap<SystemId, SystemId> = AHashMap::default();
        let other_vertices: Vec<VertexId> = other.dep_graph.alive_vertices().collect();

        for other_vertex in &other_vertices {
            let other_id = sid(*other_vertex);
            let Some(entry) = take_node(&mut other.nodes, other_id.0) else {
                continue;
            };

            if let Some(&existing) = self.key_to_id.get(&entry.key) {
                id_map.insert(other_id, existing);
                continue;
            }

            let new_vertex = self.dep_graph.add_vertex();
            let new_id = sid(new_vertex);
            self.resources.note_system_id(new_id);

            if self.nodes.len() <= new_id.0 {
                self.nodes.resize_with(new_id.0 + 1, || None);
            }
            self.key_to_id.insert(entry.key.clone(), new_id);
            self.nodes[new_id.0] = Some(entry);
            id_map.insert(other_id, new_id);
        }

        for other_vertex in &other_vertices {
            let Some(&mapped_u) = id_map.get(&sid(*other_vertex)) else {
                continue;
            };
            let out: Vec<VertexId> = other.dep_graph.out_neighbors(*other_vertex).collect();
            for other_v in out {
                if let Some(&mapped_v) = id_map.get(&sid(other_v)) {
                    // A conflicting edge is silently dropped, same as
                    // `DiGraph::merge_edges_into` — the caller discovers
                    // the discrepancy by inspecting the merged graph.
                    let _ = self.add_dependency(mapped_u, mapped_v);
                }
            }
        }

        self.dirty = true;
    }

    pub fn register_resource<T: Any + Send + Sync>(&mut self, payload: T) -> ResourceId {
        self.resources.add_resource(payload)
    }

    /// # Panics
    /// Panics if `system` is already a writer of `resource` — a reader/
    /// writer conflict is a program-logic error in the caller and is a
    /// fatal precondition per the scheduler's error-handling design.
    pub fn declare_read(&mut self, system: SystemId, resource: ResourceId) {
        self.resources
            .add_read_request(system, resource)
            .expect("read/write conflict");
        self.dirty = true;
    }

    /// # Panics
    /// Panics if `system` is already a reader of `resource`.
    pub fn declare_write(&mut self, system: SystemId, resource: ResourceId) {
        self.resources
            .add_write_request(system, resource)
            .expect("read/write conflict");
        self.dirty = true;
    }

    pub fn fetch_resource<T: Any>(&self, resource: ResourceId) -> Option<&T> {
        self.resources.fetch_resource(resource)
    }

    pub fn fetch_resource_mut<T: Any>(&mut self, resource: ResourceId) -> Option<&mut T> {
        self.resources.fetch_resource_mut(resource)
    }

    /// Enumerate the current readers of a resource. Diagnostic-only,
    /// extending §6's "caller may enumerate nodes" introspection pattern
    /// to resources; empty if `resource` is unknown.
    pub fn resource_readers(&self, resource: ResourceId) -> Vec<SystemId> {
        self.resources
            .resource(resource)
            .map(|r| r.readers().collect())
            .unwrap_or_default()
    }

    /// Enumerate the current writers of a resource.
    pub fn resource_writers(&self, resource: ResourceId) -> Vec<SystemId> {
        self.resources
            .resource(resource)
            .map(|r| r.writers().collect())
            .unwrap_or_default()
    }

    /// Fuse the resource conflict graph into the dependency graph, derive
    /// a topological order, assign each vertex a level (longest-path
    /// depth), and partition each level into its parallel and
    /// main-thread-pinned buckets.
    pub fn recompute_schedule(&mut self) {
        let mut fused = self.dep_graph.clone();
        {
            let resource_graph = self.resources.rebuild_global_graph();
            fused.merge_edges_into(resource_graph);
        }

        let order = fused.topo_sort().to_vec();

        let mut level_of: AHashMap<SystemId, usize> = AHashMap::default();
        for v in fused.alive_vertices() {
            level_of.insert(sid(v), 0);
        }
        for v in &order {
            let level = *level_of.get(&sid(*v)).unwrap_or(&0);
            for w in fused.out_neighbors(*v) {
                let slot = level_of.entry(sid(w)).or_insert(0);
                let candidate = level + 1;
                if candidate > *slot {
                    *slot = candidate;
                }
            }
        }

        let max_level = order.iter().map(|v| level_of[&sid(*v)]).max();
        let mut levels = vec![Level::default(); max_level.map_or(0, |m| m + 1)];

        for v in &order {
            let id = sid(*v);
            let level = level_of[&id];
            let Some(entry) = self.nodes.get(id.0).and_then(Option::as_ref) else {
                continue;
            };
            if entry.main_thread_only {
                levels[level].main_thread.push(id);
            } else {
                levels[level].parallel.push(id);
            }
        }

        log::debug!(
            "recompiled schedule: {} systems over {} levels",
            order.len(),
            levels.len()
        );

        self.levels = levels;
        self.dirty = false;
    }

    fn ensure_schedule(&mut self) {
        if self.dirty || self.resources.is_dirty() {
            self.recompute_schedule();
        }
    }

    /// Sequential pass in topological order: every level runs in order,
    /// and within a level the parallel and main-thread members run in
    /// whatever order they were stored in (no edge exists between two
    /// members of the same level, so the pick is safe).
    pub fn run_awake_pass(&mut self) {
        self.ensure_schedule();
        for level in &self.levels {
            for id in level.parallel.iter().chain(level.main_thread.iter()) {
                run_one(*id, &mut self.nodes[id.0], Phase::Awake);
            }
        }
    }

    /// Parallel pass: recomputes the schedule if dirty, then for each
    /// level dispatches the parallel bucket to the worker pool and waits
    /// for it to finish before running the main-thread bucket on the
    /// calling thread.
    pub fn run_update_pass(&mut self) {
        self.ensure_schedule();

        let nodes_ptr = SendPtr(self.nodes.as_mut_ptr());
        let level_count = self.levels.len();

        for li in 0..level_count {
            let parallel_ids = self.levels[li].parallel.clone();
            let main_ids = self.levels[li].main_thread.clone();

            if !parallel_ids.is_empty() {
                parallel_ids.par_iter().for_each(|&id| {
                    // SAFETY: ids within one level's parallel bucket are
                    // pairwise distinct and, by construction, share no
                    // edge in the fused graph (property 7), so no two
                    // closures ever touch the same slot.
                    let slot = unsafe { &mut *nodes_ptr.0.add(id.0) };
                    run_one(id, slot, Phase::Update);
                });
            }

            for id in &main_ids {
                run_one(*id, &mut self.nodes[id.0], Phase::Update);
            }
        }
    }

    /// Sequential pass in reverse-topological order.
    pub fn run_shutdown_pass(&mut self) {
        self.ensure_schedule();
        for level in self.levels.iter().rev() {
            for id in level.parallel.iter().chain(level.main_thread.iter()) {
                run_one(*id, &mut self.nodes[id.0], Phase::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{DependencyMap, SystemError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSystem {
        name: &'static str,
        updates: Arc<AtomicUsize>,
        fail: bool,
    }

    impl System for CountingSystem {
        fn debug_name(&self) -> &'static str {
            self.name
        }

        fn dependency_key(&self) -> DependencyKey {
            DependencyKey::from_str(self.name)
        }

        fn update(&mut self, _deps: &DependencyMap) -> Result<(), SystemError> {
            if self.fail {
                return Err("boom".into());
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn object_handle(&self) -> &dyn Any {
            self
        }
    }

    fn counting(name: &'static str, fail: bool) -> (Box<dyn System>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let system = CountingSystem {
            name,
            updates: counter.clone(),
            fail,
        };
        (Box::new(system), counter)
    }

    #[test]
    fn add_system_deduplicates_by_key() {
        let mut sched = Scheduler::new();
        let (a, _) = counting("dup", false);
        let (b, _) = counting("dup", false);
        assert_eq!(sched.add_system(a), sched.add_system(b));
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn writer_before_readers_gives_two_levels() {
        let mut sched = Scheduler::new();
        let (sys_a, _) = counting("A", false);
        let (sys_b, _) = counting("B", false);
        let (sys_c, _) = counting("C", false);
        let a = sched.add_system(sys_a);
        let b = sched.add_system(sys_b);
        let c = sched.add_system(sys_c);

        let r0 = sched.register_resource::<u32>(0);
        sched.declare_write(a, r0);
        sched.declare_read(b, r0);
        sched.declare_read(c, r0);

        sched.recompute_schedule();

        assert_eq!(sched.levels.len(), 2);
        assert_eq!(sched.levels[0].parallel, vec![a]);
        let mut level1 = sched.levels[1].parallel.clone();
        level1.sort();
        assert_eq!(level1, vec![b, c]);
    }

    #[test]
    fn main_thread_only_systems_land_in_the_second_bucket() {
        let mut sched = Scheduler::new();
        let (sys_a, _) = counting("A", false);
        let a = sched.add_system(sys_a);
        sched.set_main_thread_only(a, true);

        sched.recompute_schedule();

        assert_eq!(sched.levels[0].main_thread, vec![a]);
        assert!(sched.levels[0].parallel.is_empty());
    }

    #[test]
    fn per_node_failure_is_contained() {
        let mut sched = Scheduler::new();
        let (first, first_count) = counting("first", false);
        let (middle, _middle_count) = counting("middle", true);
        let (third, third_count) = counting("third", false);

        sched.add_system(first);
        let middle_id = sched.add_system(middle);
        sched.add_system(third);

        sched.run_update_pass();

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(third_count.load(Ordering::SeqCst), 1);

        let middle_node = sched.node(middle_id).unwrap();
        assert_eq!(middle_node.status(), Status::Err);
        assert!(matches!(
            middle_node.last_error(),
            Some(SchedulerError::SystemOpFailed { system, phase: Phase::Update, .. })
                if *system == middle_id
        ));
    }

    #[test]
    fn add_dependency_rejects_a_cycle_and_reports_why() {
        let mut sched = Scheduler::new();
        let (sys_a, _) = counting("A", false);
        let (sys_b, _) = counting("B", false);
        let a = sched.add_system(sys_a);
        let b = sched.add_system(sys_b);

        sched.add_dependency(a, b).unwrap();
        let err = sched.add_dependency(b, a).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::CycleIntroduction { from, to } if from == b && to == a
        ));
        assert!(!sched.dep_graph.has_edge(vid(b), vid(a)));
    }

    #[test]
    fn resource_readers_and_writers_are_queryable_through_the_scheduler() {
        let mut sched = Scheduler::new();
        let (sys_a, _) = counting("A", false);
        let (sys_b, _) = counting("B", false);
        let (sys_c, _) = counting("C", false);
        let a = sched.add_system(sys_a);
        let b = sched.add_system(sys_b);
        let c = sched.add_system(sys_c);

        let r0 = sched.register_resource::<u32>(0);
        sched.declare_write(a, r0);
        sched.declare_read(b, r0);
        sched.declare_read(c, r0);

        assert_eq!(sched.resource_writers(r0), vec![a]);
        let mut readers = sched.resource_readers(r0);
        readers.sort();
        assert_eq!(readers, vec![b, c]);
    }

    #[test]
    fn remove_system_purges_its_resource_declarations() {
        let mut sched = Scheduler::new();
        let (sys_a, _) = counting("A", false);
        let (sys_b, _) = counting("B", false);
        let a = sched.add_system(sys_a);
        let b = sched.add_system(sys_b);

        let r0 = sched.register_resource::<u32>(0);
        sched.declare_write(a, r0);
        sched.declare_read(b, r0);

        sched.remove_system(a);
        sched.recompute_schedule();

        assert_eq!(sched.levels[0].parallel, vec![b]);
    }

    #[test]
    fn merge_deduplicates_shared_keys_and_translates_edges() {
        let mut left = Scheduler::new();
        let (shared_l, _) = counting("shared", false);
        let (only_left, _) = counting("only_left", false);
        let shared_left_id = left.add_system(shared_l);
        let left_only_id = left.add_system(only_left);
        left.add_dependency(shared_left_id, left_only_id).unwrap();

        let mut right = Scheduler::new();
        let (shared_r, _) = counting("shared", false);
        let (only_right, _) = counting("only_right", false);
        let shared_right_id = right.add_system(shared_r);
        let right_only_id = right.add_system(only_right);
        right.add_dependency(shared_right_id, right_only_id).unwrap();

        left.merge(right);

        assert_eq!(left.len(), 3);
        left.recompute_schedule();
        assert_eq!(left.levels[0].parallel.len(), 1);
    }

    #[test]
    fn empty_scheduler_passes_are_no_ops() {
        let mut sched = Scheduler::new();
        sched.run_awake_pass();
        sched.run_update_pass();
        sched.run_shutdown_pass();
        assert!(sched.is_empty());
    }
}
