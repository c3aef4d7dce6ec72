//! Reflection-driven pipeline/descriptor-set layout construction, grounded
//! on spec.md §4.C7.
//!
//! Flattens bindings across all shader modules passed to a pipeline
//! creation call, sorts by `(set, binding)`, coalesces duplicates seen in
//! more than one stage, and materializes a contiguous, possibly-empty
//! descriptor-set layout list plus the overall pipeline layout.

use crate::error::{GfxError, Result};
use crate::resources::pipeline::{DescriptorSetLayout, LayoutBinding, PipelineLayout};
use crate::resources::shader::{DescriptorType, ReflectedBinding, ShaderModule, ShaderStage};

struct FlatBinding {
    set: u32,
    binding: u32,
    descriptor_type: DescriptorType,
    count: u32,
    readonly: bool,
    stage_mask: ShaderStage,
}

/// Builds a `PipelineLayout` from the reflection metadata of every shader
/// module in `modules`. Fatal (returns `Err`) on a `(set, binding)` that
/// disagrees on descriptor type or count across stages.
pub fn build_pipeline_layout(modules: &[&ShaderModule]) -> Result<PipelineLayout> {
    let mut flat: Vec<FlatBinding> = Vec::new();
    for module in modules {
        for b in &module.bindings {
            flat.push(FlatBinding {
                set: b.set,
                binding: b.binding,
                descriptor_type: b.descriptor_type,
                count: b.count,
                readonly: b.readonly,
                stage_mask: module.stage,
            });
        }
    }

    flat.sort_by_key(|b| (b.set, b.binding));

    let mut coalesced: Vec<FlatBinding> = Vec::with_capacity(flat.len());
    for b in flat {
        match coalesced
            .last_mut()
            .filter(|last| last.set == b.set && last.binding == b.binding)
        {
            Some(last) => {
                if last.descriptor_type != b.descriptor_type || last.count != b.count {
                    return Err(GfxError::object_creation_failed(format!(
                        "reflection mismatch at (set={}, binding={}): {:?}x{} vs {:?}x{}",
                        b.set, b.binding, last.descriptor_type, last.count, b.descriptor_type, b.count
                    )));
                }
                last.stage_mask |= b.stage_mask;
                last.readonly = last.readonly && b.readonly;
            }
            None => coalesced.push(b),
        }
    }

    let nall_sets = coalesced.iter().map(|b| b.set).max().map_or(0, |m| m + 1);
    let mut set_layouts = vec![DescriptorSetLayout::default(); nall_sets as usize];
    for b in coalesced {
        set_layouts[b.set as usize].bindings.push(LayoutBinding {
            binding: b.binding,
            descriptor_type: b.descriptor_type,
            count: b.count,
            stage_mask: b.stage_mask,
            readonly: b.readonly,
        });
    }
    for layout in &mut set_layouts {
        layout.bindings.sort_by_key(|b| b.binding);
    }

    Ok(PipelineLayout {
        set_layouts,
        #[cfg(feature = "vulkan")]
        handle: None,
    })
}

/// Computes the workgroup size for a compute pipeline, fatal if the sole
/// compute module's reflection doesn't declare one.
pub fn compute_workgroup_size(module: &ShaderModule) -> Result<(u32, u32, u32)> {
    module
        .workgroup_size
        .ok_or_else(|| GfxError::object_creation_failed("compute module missing workgroup size"))
}

/// Builds a `ReflectedBinding` list the way a real shader blob's reflection
/// table would, for use by tests that don't want to hand-parse a binary
/// blob format (out of scope per spec.md — shader compilation is a
/// collaborator, not implemented here).
pub fn binding(set: u32, binding: u32, ty: DescriptorType) -> ReflectedBinding {
    ReflectedBinding {
        set,
        binding,
        descriptor_type: ty,
        count: 1,
        readonly: matches!(
            ty,
            DescriptorType::UniformBuffer | DescriptorType::Image | DescriptorType::Sampler
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(stage: ShaderStage, bindings: Vec<ReflectedBinding>) -> ShaderModule {
        ShaderModule {
            stage,
            entry_point: "main".into(),
            bindings,
            workgroup_size: None,
            native_binding_map: None,
            #[cfg(feature = "vulkan")]
            handle: ash::vk::ShaderModule::null(),
        }
    }

    #[test]
    fn merges_the_same_binding_seen_in_two_stages() {
        let vs = module(
            ShaderStage::VERTEX,
            vec![binding(0, 0, DescriptorType::UniformBuffer)],
        );
        let fs = module(
            ShaderStage::FRAGMENT,
            vec![binding(0, 0, DescriptorType::UniformBuffer)],
        );
        let layout = build_pipeline_layout(&[&vs, &fs]).unwrap();
        assert_eq!(layout.set_layouts.len(), 1);
        let b = layout.set_layouts[0].binding(0).unwrap();
        assert_eq!(b.stage_mask, ShaderStage::VERTEX | ShaderStage::FRAGMENT);
    }

    #[test]
    fn mismatched_descriptor_type_is_fatal() {
        let vs = module(
            ShaderStage::VERTEX,
            vec![binding(0, 0, DescriptorType::UniformBuffer)],
        );
        let fs = module(
            ShaderStage::FRAGMENT,
            vec![binding(0, 0, DescriptorType::StorageBuffer)],
        );
        assert!(build_pipeline_layout(&[&vs, &fs]).is_err());
    }

    #[test]
    fn missing_sets_are_materialized_empty() {
        let vs = module(
            ShaderStage::VERTEX,
            vec![binding(2, 0, DescriptorType::UniformBuffer)],
        );
        let layout = build_pipeline_layout(&[&vs]).unwrap();
        assert_eq!(layout.set_layouts.len(), 3);
        assert!(layout.set_layouts[0].bindings.is_empty());
        assert!(layout.set_layouts[1].bindings.is_empty());
        assert_eq!(layout.set_layouts[2].bindings.len(), 1);
    }
}
