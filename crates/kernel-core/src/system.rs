use std::any::Any;
use std::collections::HashMap;

use downcast_rs::{impl_downcast, Downcast};

use crate::{DependencyKey, SystemError, SystemId};

/// A read-only view of a system's resolved dependencies, keyed by
/// [`DependencyKey`]. Passed in at pass time rather than held as an
/// owning back-reference, so a system never needs a handle to the
/// scheduler that owns it.
#[derive(Default)]
pub struct DependencyMap {
    handles: HashMap<DependencyKey, SystemId>,
}

impl DependencyMap {
    pub fn insert(&mut self, key: DependencyKey, id: SystemId) {
        self.handles.insert(key, id);
    }

    pub fn get(&self, key: &DependencyKey) -> Option<SystemId> {
        self.handles.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// The lifecycle state of a registered system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Never awoken, or explicitly shut down.
    #[default]
    Off,
    /// Awoken and ready to be updated.
    Ok,
    /// Caller-set state; the scheduler skips this node entirely.
    Deprecated,
    /// The last invoked op raised an error. Terminal for the current
    /// pass, but not permanent: re-invoking `awake` clears it.
    Err,
}

/// The capability set every schedulable unit of work must satisfy.
///
/// A node may be driven by static or dynamic dispatch; the scheduler
/// only ever holds `Box<dyn System>`, so this trait object is the
/// single seam between the scheduler and user code. `Downcast` is a
/// supertrait so `object_handle` can recover a concrete system type
/// from a `&dyn System` without every implementor hand-rolling it.
pub trait System: Downcast + Send {
    /// A human-readable name used in logs and in the default
    /// [`DependencyKey`].
    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// The key used to deduplicate this system and to address it from
    /// another system's [`DependencyMap`]. Defaults to the concrete
    /// type name; override to register multiple instances of one type.
    fn dependency_key(&self) -> DependencyKey {
        DependencyKey::of::<Self>()
    }

    /// Called once per awake pass. The first successful call transitions
    /// the node from `OFF` to `OK`.
    fn awake(&mut self, _deps: &DependencyMap) -> Result<(), SystemError> {
        Ok(())
    }

    /// Called once per frame during the parallel update pass.
    fn update(&mut self, deps: &DependencyMap) -> Result<(), SystemError>;

    /// Called once per shutdown pass. Transitions `OK` -> `OFF`.
    fn shutdown(&mut self, _deps: &DependencyMap) -> Result<(), SystemError> {
        Ok(())
    }

    /// Query hook exposing the system's own type for downcasting, e.g.
    /// so a caller holding a `SystemId` can recover `&MyConcreteSystem`.
    fn object_handle(&self) -> &dyn Any {
        self.as_any()
    }

    /// Query hook for an optional secondary capability this system
    /// implements (e.g. "this system is also renderable"). Returns
    /// `None` by default; a system overrides it to expose one.
    fn capability_handle(&self, _capability: &str) -> Option<&dyn Any> {
        None
    }
}

impl_downcast!(System);
