use std::any::Any;

use ahash::AHashSet;
use kernel_core::SystemId;
use kernel_graph::DiGraph;

/// A typed, process-wide datum whose concurrent access is mediated by
/// the [`ResourceManager`](crate::ResourceManager) through explicit
/// reader/writer declarations.
pub struct Resource {
    pub(crate) type_name: &'static str,
    pub(crate) payload: Box<dyn Any + Send + Sync>,
    pub(crate) readers: AHashSet<SystemId>,
    pub(crate) writers: AHashSet<SystemId>,
    /// Set whenever `readers` or `writers` changes; cleared by
    /// `rebuild_resource_graph`.
    pub(crate) dirty: bool,
    /// This resource's own conflict subgraph: writer-before-writer and
    /// writer-before-reader edges, rebuilt from `readers`/`writers`.
    pub(crate) graph: DiGraph,
}

impl Resource {
    pub(crate) fn new(type_name: &'static str, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            type_name,
            payload,
            readers: AHashSet::default(),
            writers: AHashSet::default(),
            dirty: true,
            graph: DiGraph::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn readers(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.readers.iter().copied()
    }

    pub fn writers(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.writers.iter().copied()
    }
}
