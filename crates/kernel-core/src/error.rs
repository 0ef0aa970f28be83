use std::error::Error;
use std::fmt;

use crate::{ResourceId, SystemId};

/// The boxed error type returned by a system's `awake`/`update`/`shutdown`.
pub type SystemError = Box<dyn Error + Send + Sync>;

/// Which lifecycle op was running when a system failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Awake,
    Update,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Awake => write!(f, "awake"),
            Self::Update => write!(f, "update"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Errors raised by the scheduler, the resource manager, or the
/// dependency graph.
///
/// Per-node op failures ([`Self::SystemOpFailed`]) are informational: the
/// scheduler contains them on the node and keeps going. Every other
/// variant is returned directly as the `Err` side of the call that
/// rejected its input (`Scheduler::add_dependency`,
/// `ResourceManager::add_read_request`/`add_write_request`); none of
/// those calls panic on their own, though some callers (e.g.
/// `Scheduler::declare_read`/`declare_write`) choose to `.expect()` the
/// result as a fatal precondition.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Adding an edge would have introduced a cycle; the graph is unchanged.
    #[error("adding dependency {from:?} -> {to:?} would create a cycle")]
    CycleIntroduction { from: SystemId, to: SystemId },
    /// An operation referenced a system id that is not currently alive.
    #[error("system {0:?} is not alive")]
    DeadVertexReference(SystemId),
    /// The same system was declared both a reader and a writer of one resource.
    #[error("system {system:?} declared as both reader and writer of resource {resource:?}")]
    ReadWriteConflict {
        system: SystemId,
        resource: ResourceId,
    },
    /// A system's lifecycle op raised an error. Contained to that node;
    /// surfaced here only when the caller explicitly asks for it.
    #[error("system {system:?} failed during {phase}: {source}")]
    SystemOpFailed {
        system: SystemId,
        phase: Phase,
        #[source]
        source: SystemError,
    },
}
