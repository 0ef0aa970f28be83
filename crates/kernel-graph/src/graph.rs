use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::GraphError;

const DEAD: i64 = -1;

/// A dense, process-local identifier for a vertex in a [`DiGraph`].
///
/// Stable across edge insertion/removal, but reused after
/// [`DiGraph::remove_vertex`] via a free list. Treat it as opaque and
/// never persist it across a removal of the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub usize);

/// One half of an edge: the other endpoint, plus the index of this
/// half-edge's counterpart in the opposite adjacency list. The back
/// index is what makes `remove_edge` and `remove_vertex` O(1) per edge
/// instead of requiring a scan of the whole graph.
#[derive(Debug, Clone, Copy)]
struct HalfEdge {
    other: VertexId,
    back: u32,
}

/// A mutable directed graph supporting amortised O(1) vertex/edge
/// mutation, cycle rejection on insert, and a cached topological sort.
///
/// Edge insertion that would create a cycle is rejected by
/// [`DiGraph::add_edge`] rather than accepted and detected later: every
/// state the graph can be in (after any sequence of successful calls)
/// is acyclic.
#[derive(Debug, Clone, Default)]
pub struct DiGraph {
    out: Vec<SmallVec<[HalfEdge; 4]>>,
    inc: Vec<SmallVec<[HalfEdge; 4]>>,
    /// Non-negative while the slot is alive; [`DEAD`] once freed.
    in_degree: Vec<i64>,
    free_list: Vec<usize>,
    topo_cache: Vec<VertexId>,
    dirty: bool,
}

impl DiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            inc: Vec::with_capacity(capacity),
            in_degree: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            topo_cache: Vec::new(),
            dirty: true,
        }
    }

    /// Build a graph with `n` fresh, alive vertices with ids `0..n`.
    /// Used by callers (notably the resource manager) that size a graph
    /// to a known vertex-id watermark up front.
    pub fn dense(n: usize) -> Self {
        let mut g = Self::with_capacity(n);
        for _ in 0..n {
            g.add_vertex();
        }
        g
    }

    pub fn is_alive(&self, v: VertexId) -> bool {
        self.in_degree.get(v.0).is_some_and(|&d| d >= 0)
    }

    /// Number of currently alive vertices.
    pub fn len(&self) -> usize {
        self.in_degree.iter().filter(|&&d| d >= 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The size of the dense id space, including freed (dead) slots.
    pub fn capacity(&self) -> usize {
        self.in_degree.len()
    }

    pub fn add_vertex(&mut self) -> VertexId {
        self.dirty = true;

        if let Some(slot) = self.free_list.pop() {
            self.out[slot].clear();
            self.inc[slot].clear();
            self.in_degree[slot] = 0;
            return VertexId(slot);
        }

        let slot = self.out.len();
        self.out.push(SmallVec::new());
        self.inc.push(SmallVec::new());
        self.in_degree.push(0);
        VertexId(slot)
    }

    /// Remove a vertex and every edge touching it. Silently ignored if
    /// `v` is dead or out of range.
    pub fn remove_vertex(&mut self, v: VertexId) {
        if !self.is_alive(v) {
            return;
        }

        while let Some(edge) = self.out[v.0].last().copied() {
            let idx = self.out[v.0].len() - 1;
            self.swap_remove_out(v.0, idx);
            self.swap_remove_inc(edge.other.0, edge.back as usize);
            self.in_degree[edge.other.0] -= 1;
        }

        while let Some(edge) = self.inc[v.0].last().copied() {
            let idx = self.inc[v.0].len() - 1;
            self.swap_remove_inc(v.0, idx);
            self.swap_remove_out(edge.other.0, edge.back as usize);
        }

        self.in_degree[v.0] = DEAD;
        self.free_list.push(v.0);
        self.dirty = true;
    }

    /// Add the edge `u -> v`. Returns `false` (no state change) if
    /// either endpoint is dead, `u == v`, or `v` already reaches `u`
    /// (the edge would close a cycle). A duplicate of an existing edge
    /// is an idempotent no-op that returns `true`.
    pub fn add_edge(&mut self, u: VertexId, v: VertexId) -> bool {
        if u == v || !self.is_alive(u) || !self.is_alive(v) {
            return false;
        }

        if self.out[u.0].iter().any(|e| e.other == v) {
            return true;
        }

        if self.reachable(v, u) {
            return false;
        }

        let back_in_v = self.inc[v.0].len() as u32;
        self.out[u.0].push(HalfEdge {
            other: v,
            back: back_in_v,
        });
        let back_in_u = (self.out[u.0].len() - 1) as u32;
        self.inc[v.0].push(HalfEdge {
            other: u,
            back: back_in_u,
        });
        self.in_degree[v.0] += 1;
        self.dirty = true;

        true
    }

    /// Same contract as [`add_edge`](Self::add_edge), but returns a
    /// [`GraphError`] documenting *why* on failure instead of a bare
    /// `false`. `add_edge` remains the primary entry point; this is for
    /// callers that want to log or propagate a reason.
    pub fn try_add_edge(&mut self, u: VertexId, v: VertexId) -> Result<(), GraphError> {
        if u == v {
            return Err(GraphError::SelfLoop(u));
        }
        if !self.is_alive(u) {
            return Err(GraphError::DeadVertex(u));
        }
        if !self.is_alive(v) {
            return Err(GraphError::DeadVertex(v));
        }
        if self.add_edge(u, v) {
            Ok(())
        } else {
            Err(GraphError::CycleDetected { from: u, to: v })
        }
    }

    /// Remove the edge `u -> v` if present. Returns whether an edge was
    /// actually removed.
    pub fn remove_edge(&mut self, u: VertexId, v: VertexId) -> bool {
        if !self.is_alive(u) || !self.is_alive(v) {
            return false;
        }

        let Some(idx) = self.out[u.0].iter().position(|e| e.other == v) else {
            return false;
        };

        let removed = self.swap_remove_out(u.0, idx);
        self.swap_remove_inc(v.0, removed.back as usize);
        self.in_degree[v.0] -= 1;
        self.dirty = true;

        true
    }

    pub fn has_edge(&self, u: VertexId, v: VertexId) -> bool {
        self.is_alive(u) && self.out[u.0].iter().any(|e| e.other == v)
    }

    pub fn in_degree(&self, v: VertexId) -> usize {
        self.in_degree.get(v.0).copied().filter(|&d| d >= 0).unwrap_or(0) as usize
    }

    pub fn out_neighbors(&self, v: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.out
            .get(v.0)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|e| e.other))
    }

    /// Alive vertex ids in ascending order. Kahn's algorithm and the
    /// level assignment downstream both depend on this tie-break.
    pub fn alive_vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.in_degree.len())
            .filter(move |&i| self.in_degree[i] >= 0)
            .map(VertexId)
    }

    /// Whether the graph (restricted to alive vertices) contains a
    /// cycle. Runs Kahn's algorithm on a scratch copy of the in-degree
    /// vector; does not touch the cached topological sort.
    pub fn has_cycle(&self) -> bool {
        let (order, visited) = self.kahn();
        order.len() != visited
    }

    /// Is `dst` reachable from `src` by following edges forward?
    /// `src` trivially reaches itself.
    pub fn reachable(&self, src: VertexId, dst: VertexId) -> bool {
        if !self.is_alive(src) || !self.is_alive(dst) {
            return false;
        }
        if src == dst {
            return true;
        }

        let mut visited = vec![false; self.out.len()];
        let mut stack = vec![src];
        visited[src.0] = true;

        while let Some(v) = stack.pop() {
            for edge in &self.out[v.0] {
                if edge.other == dst {
                    return true;
                }
                if !visited[edge.other.0] {
                    visited[edge.other.0] = true;
                    stack.push(edge.other);
                }
            }
        }

        false
    }

    /// A topological ordering of the alive vertices. Rebuilt lazily:
    /// returns the cache unless a mutation has set the dirty bit since
    /// the last call.
    pub fn topo_sort(&mut self) -> &[VertexId] {
        if self.dirty {
            let (order, _) = self.kahn();
            log::trace!("recomputed topological order over {} vertices", order.len());
            self.topo_cache = order;
            self.dirty = false;
        }
        &self.topo_cache
    }

    /// Union every alive edge of `other` into `self` via [`add_edge`].
    /// Edges that would create a cycle in `self` are silently skipped;
    /// the caller is responsible for detecting any resulting
    /// discrepancy between the two graphs.
    pub fn merge_edges_into(&mut self, other: &DiGraph) {
        for u in other.alive_vertices() {
            for v in other.out_neighbors(u) {
                self.add_edge(u, v);
            }
        }
    }

    fn swap_remove_out(&mut self, u: usize, idx: usize) -> HalfEdge {
        let removed = self.out[u].swap_remove(idx);
        if let Some(moved) = self.out[u].get(idx).copied() {
            self.inc[moved.other.0][moved.back as usize].back = idx as u32;
        }
        removed
    }

    fn swap_remove_inc(&mut self, v: usize, idx: usize) -> HalfEdge {
        let removed = self.inc[v].swap_remove(idx);
        if let Some(moved) = self.inc[v].get(idx).copied() {
            self.out[moved.other.0][moved.back as usize].back = idx as u32;
        }
        removed
    }

    /// Kahn's algorithm over alive vertices, visiting ties in ascending
    /// vertex-id order. Returns the resulting order and the number of
    /// vertices actually visited (fewer than alive count means a cycle).
    fn kahn(&self) -> (Vec<VertexId>, usize) {
        let mut in_degree: Vec<i64> = self.in_degree.clone();
        let mut queue: VecDeque<VertexId> = VecDeque::new();
        let mut order = Vec::with_capacity(self.len());

        for v in self.alive_vertices() {
            if in_degree[v.0] == 0 {
                queue.push_back(v);
            }
        }

        let mut visited = 0;
        while let Some(v) = queue.pop_front() {
            visited += 1;
            order.push(v);

            for edge in &self.out[v.0] {
                in_degree[edge.other.0] -= 1;
                if in_degree[edge.other.0] == 0 {
                    queue.push_back(edge.other);
                }
            }
        }

        (order, visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: usize) -> VertexId {
        VertexId(id)
    }

    #[test]
    fn linear_chain() {
        let mut g = DiGraph::new();
        let verts: Vec<_> = (0..4).map(|_| g.add_vertex()).collect();
        assert!(g.add_edge(verts[0], verts[1]));
        assert!(g.add_edge(verts[1], verts[2]));
        assert!(g.add_edge(verts[2], verts[3]));

        assert_eq!(g.topo_sort(), &[v(0), v(1), v(2), v(3)]);

        g.remove_vertex(verts[2]);
        let alive: Vec<_> = g.alive_vertices().collect();
        assert_eq!(alive, vec![v(0), v(1), v(3)]);
        assert!(g.has_edge(verts[0], verts[1]));
        assert!(!g.has_edge(verts[1], verts[2]));
        assert!(!g.has_edge(verts[2], verts[3]));
    }

    #[test]
    fn self_loop_rejected() {
        let mut g = DiGraph::new();
        let a = g.add_vertex();
        assert!(!g.add_edge(a, a));
    }

    #[test]
    fn try_add_edge_reports_the_specific_reason() {
        let mut g = DiGraph::new();
        let a = g.add_vertex();
        let b = g.add_vertex();
        let dead = g.add_vertex();
        g.remove_vertex(dead);

        assert_eq!(g.try_add_edge(a, a), Err(GraphError::SelfLoop(a)));
        assert_eq!(g.try_add_edge(dead, b), Err(GraphError::DeadVertex(dead)));
        assert!(g.try_add_edge(a, b).is_ok());
        assert_eq!(
            g.try_add_edge(b, a),
            Err(GraphError::CycleDetected { from: b, to: a })
        );
    }

    #[test]
    fn cycle_rejected() {
        let mut g = DiGraph::new();
        let verts: Vec<_> = (0..3).map(|_| g.add_vertex()).collect();
        assert!(g.add_edge(verts[0], verts[1]));
        assert!(g.add_edge(verts[1], verts[2]));

        assert!(!g.add_edge(verts[2], verts[0]));
        assert!(!g.has_edge(verts[2], verts[0]));
        assert_eq!(g.topo_sort(), &[v(0), v(1), v(2)]);
    }

    #[test]
    fn duplicate_edge_is_idempotent() {
        let mut g = DiGraph::new();
        let a = g.add_vertex();
        let b = g.add_vertex();
        assert!(g.add_edge(a, b));
        assert!(g.add_edge(a, b));
        assert_eq!(g.out_neighbors(a).count(), 1);
    }

    #[test]
    fn add_remove_edge_round_trip() {
        let mut g = DiGraph::new();
        let a = g.add_vertex();
        let b = g.add_vertex();
        assert!(g.add_edge(a, b));
        assert!(g.remove_edge(a, b));
        assert!(!g.has_edge(a, b));
        assert_eq!(g.in_degree(b), 0);
    }

    #[test]
    fn remove_vertex_leaves_no_dangling_half_edges() {
        let mut g = DiGraph::new();
        let hub = g.add_vertex();
        let leaves: Vec<_> = (0..5).map(|_| g.add_vertex()).collect();
        for &leaf in &leaves {
            assert!(g.add_edge(hub, leaf));
        }

        g.remove_vertex(hub);

        for &leaf in &leaves {
            assert!(g.is_alive(leaf));
            assert_eq!(g.in_degree(leaf), 0);
        }
        for v in g.alive_vertices() {
            assert_eq!(g.out_neighbors(v).count(), 0);
        }
    }

    #[test]
    fn empty_graph_boundary() {
        let mut g = DiGraph::new();
        assert!(g.topo_sort().is_empty());
        assert!(!g.has_cycle());
    }

    #[test]
    fn vertex_ids_are_recycled() {
        let mut g = DiGraph::new();
        let a = g.add_vertex();
        g.remove_vertex(a);
        let b = g.add_vertex();
        assert_eq!(a, b);
    }

    #[test]
    fn topo_sort_is_stable_without_mutation() {
        let mut g = DiGraph::new();
        let verts: Vec<_> = (0..4).map(|_| g.add_vertex()).collect();
        g.add_edge(verts[0], verts[2]);
        g.add_edge(verts[1], verts[2]);

        let first = g.topo_sort().to_vec();
        let second = g.topo_sort().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn merge_skips_cycles_but_keeps_compatible_edges() {
        let mut a = DiGraph::new();
        let verts: Vec<_> = (0..3).map(|_| a.add_vertex()).collect();
        assert!(a.add_edge(verts[2], verts[0])); // explicit: C -> A

        let mut b = DiGraph::new();
        let b_verts: Vec<_> = (0..3).map(|_| b.add_vertex()).collect();
        assert!(b.add_edge(b_verts[0], b_verts[2])); // resource rule: A -> C

        a.merge_edges_into(&b);

        // The resource edge A -> C would close a cycle with the explicit
        // C -> A edge, so it is dropped; the explicit edge survives.
        assert!(a.has_edge(verts[2], verts[0]));
        assert!(!a.has_edge(verts[0], verts[2]));
        assert!(!a.has_cycle());
        assert_eq!(a.topo_sort(), &[v(1), v(2), v(0)]);
    }

    #[test]
    fn merging_two_identical_graphs_keeps_the_same_vertex_count() {
        let mut a = DiGraph::new();
        let verts: Vec<_> = (0..3).map(|_| a.add_vertex()).collect();
        a.add_edge(verts[0], verts[1]);
        a.add_edge(verts[1], verts[2]);

        let b = a.clone();
        a.merge_edges_into(&b);

        assert_eq!(a.len(), b.len());
    }
}
