use std::borrow::Cow;
use std::fmt;

/// A dense, process-local identifier for a registered [`System`](crate::System).
///
/// Reused after [`remove_system`](crate::System), so callers must treat it
/// as opaque and never persist it across a removal of the same slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SystemId(pub usize);

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.0)
    }
}

/// A dense identifier assigned by the resource manager on registration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceId(pub usize);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// A human-meaningful handle used to deduplicate systems and to look up
/// dependencies from inside a running system.
///
/// Defaults to the registered system's concrete type name, but a system
/// may override it (e.g. to register two instances of the same type
/// under distinct keys).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey(pub Cow<'static, str>);

impl DependencyKey {
    /// Derive a key from a concrete type's name.
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn from_str(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
