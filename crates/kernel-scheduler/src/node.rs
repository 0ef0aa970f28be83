use kernel_core::{DependencyKey, DependencyMap, SchedulerError, Status, System};

/// A registered system plus the bookkeeping the scheduler needs to run
/// and introspect it. Never exposed by value; the scheduler hands out
/// [`SystemId`](kernel_core::SystemId)s and mediates every read.
pub struct SystemNodeEntry {
    pub(crate) key: DependencyKey,
    pub(crate) system: Box<dyn System>,
    pub(crate) enabled: bool,
    pub(crate) main_thread_only: bool,
    pub(crate) status: Status,
    /// The most recent lifecycle-op failure, wrapped in
    /// [`SchedulerError::SystemOpFailed`] so callers can see which phase
    /// failed alongside the system's own error.
    pub(crate) last_error: Option<SchedulerError>,
    pub(crate) deps: DependencyMap,
}

impl SystemNodeEntry {
    pub(crate) fn new(system: Box<dyn System>) -> Self {
        Self {
            key: system.dependency_key(),
            system,
            enabled: true,
            main_thread_only: false,
            status: Status::Off,
            last_error: None,
            deps: DependencyMap::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn main_thread_only(&self) -> bool {
        self.main_thread_only
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn last_error(&self) -> Option<&SchedulerError> {
        self.last_error.as_ref()
    }

    pub fn debug_name(&self) -> &'static str {
        self.system.debug_name()
    }

    /// Downcast this node's concrete system, if the caller knows the type.
    pub fn object<T: 'static>(&self) -> Option<&T> {
        self.system.object_handle().downcast_ref::<T>()
    }

    pub fn capability<T: 'static>(&self, capability: &str) -> Option<&T> {
        self.system
            .capability_handle(capability)
            .and_then(|h| h.downcast_ref::<T>())
    }
}

/// A schedule level: the set of nodes whose predecessors are all in
/// strictly earlier levels, split into the nodes free to run on any
/// worker and the nodes pinned to the main thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct Level {
    pub(crate) parallel: Vec<kernel_core::SystemId>,
    pub(crate) main_thread: Vec<kernel_core::SystemId>,
}
