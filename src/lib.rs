//! Facade crate re-exporting the public surface of the plugin-kernel
//! workspace: the directed-graph library, the resource-access conflict
//! graph builder, and the scheduler that fuses them into a runnable,
//! per-level-parallel system pipeline.

pub use kernel_core::*;
pub use kernel_graph::*;
pub use kernel_resources::*;
pub use kernel_scheduler::*;
