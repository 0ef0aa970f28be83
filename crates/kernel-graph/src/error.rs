use crate::VertexId;

/// Documents the reason [`DiGraph::add_edge`](crate::DiGraph::add_edge)
/// returned `false`. The boolean contract itself is load-bearing (callers
/// branch on it without allocating), so this type is surfaced only
/// through [`DiGraph::try_add_edge`](crate::DiGraph::try_add_edge) for
/// callers that want a diagnostic instead of a bare `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// `u == v`; a vertex cannot depend on itself.
    #[error("vertex {0:?} cannot have an edge to itself")]
    SelfLoop(VertexId),
    /// One of the two endpoints is not currently alive.
    #[error("vertex {0:?} is not alive")]
    DeadVertex(VertexId),
    /// The edge would close a cycle: the destination already reaches the source.
    #[error("edge {from:?} -> {to:?} would create a cycle")]
    CycleDetected { from: VertexId, to: VertexId },
}
