//! Per-context, per-frame-slot recycling pools for descriptor sets and
//! command buffers, grounded on spec.md §4.C5.

pub mod command;
pub mod descriptor;

pub use command::{CommandBufferHandle, CommandPoolHandle, CommandSuperpool};
pub use descriptor::{DescriptorCounts, DescriptorPoolHandle, DescriptorSetHandle, DescriptorSuperpool};
