mod error;
mod ids;
mod system;

pub use error::{Phase, SchedulerError, SystemError};
pub use ids::{DependencyKey, ResourceId, SystemId};
pub use system::{DependencyMap, Status, System};
