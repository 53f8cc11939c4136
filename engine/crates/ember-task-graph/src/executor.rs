//! Group 执行计划
//!
//! 每个 group 开始前，根据 `TgLayoutTracker` 中图像当前的 layout 与各访问请求的 layout，
//! 计算出需要录制在 layout 作用域中的命令：clear 以及 layout 转换。
//! 计算本身是纯函数，tracker 只在 group 提交之后通过 `apply` 显式推进。

use std::collections::HashMap;

use ash::vk;
use ember_gfx::commands::barrier::{GfxBarrierMask, GfxBufferBarrier, GfxImageBarrier};
use ember_gfx::commands::command_scope::GfxCommandScope;
use itertools::Itertools;
use slotmap::SecondaryMap;

use crate::compiler::TgExecutionGroup;
use crate::resource::{TgAccess, TgClearValue, TgNativeResource};
use crate::resource_handle::TgResourceHandle;
use crate::resource_registry::TgResourceRegistry;
use crate::task::TgTask;

/// 跟踪每个图像当前的 layout，以及尚未执行的 clear
#[derive(Clone, Debug, Default)]
pub struct TgLayoutTracker {
    layouts: SecondaryMap<TgResourceHandle, vk::ImageLayout>,
    pending_clears: SecondaryMap<TgResourceHandle, TgClearValue>,
}

impl TgLayoutTracker {
    /// 以资源进入 build 时的状态初始化
    pub fn from_registry(registry: &TgResourceRegistry) -> Self {
        let mut tracker = Self::default();
        for (handle, resource) in registry.iter_resources() {
            if resource.native.is_image() {
                tracker.layouts.insert(handle, resource.initial_layout);
            }
            if let Some(clear) = resource.pending_clear {
                tracker.pending_clears.insert(handle, clear);
            }
        }
        tracker
    }

    #[inline]
    pub fn layout(&self, resource: TgResourceHandle) -> vk::ImageLayout {
        self.layouts.get(resource).copied().unwrap_or(vk::ImageLayout::UNDEFINED)
    }

    #[inline]
    pub fn pending_clear(&self, resource: TgResourceHandle) -> Option<TgClearValue> {
        self.pending_clears.get(resource).copied()
    }

    /// group 提交之后推进状态
    pub fn apply(&mut self, plan: &TgGroupPlan) {
        for &(resource, layout) in &plan.final_layouts {
            self.layouts.insert(resource, layout);
        }
        for &resource in &plan.cleared {
            self.pending_clears.remove(resource);
        }
    }
}

/// 一次图像 layout 转换
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TgImageTransition {
    pub resource: TgResourceHandle,
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl TgImageTransition {
    pub fn to_gfx_barrier(&self) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(self.image)
            .layout_transfer(self.old_layout, self.new_layout)
            .src_mask(self.src_stage, self.src_access)
            .dst_mask(self.dst_stage, self.dst_access)
            .image_aspect_flag(self.aspect)
    }
}

/// buffer 填充之后到第一次使用之间的 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TgBufferTransition {
    pub resource: TgResourceHandle,
    pub buffer: vk::Buffer,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl TgBufferTransition {
    pub fn to_gfx_barrier(&self) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .mask(GfxBarrierMask {
                src_stage: vk::PipelineStageFlags2::TRANSFER,
                src_access: vk::AccessFlags2::TRANSFER_WRITE,
                dst_stage: self.dst_stage,
                dst_access: self.dst_access,
            })
            .buffer(self.buffer, 0, vk::WHOLE_SIZE)
    }
}

/// 新分配资源的初始化命令
#[derive(Clone, Copy, Debug)]
pub enum TgClearCommand {
    Image {
        resource: TgResourceHandle,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        value: TgClearValue,
    },
    Buffer {
        resource: TgResourceHandle,
        buffer: vk::Buffer,
        data: u32,
    },
}

/// 一个 group 的 layout 作用域内容
///
/// 录制顺序：clear 前的转换、clear、buffer barrier 与其余 layout 转换。
#[derive(Clone, Debug, Default)]
pub struct TgGroupPlan {
    pub pre_clear: Vec<TgImageTransition>,
    pub clears: Vec<TgClearCommand>,
    pub buffer_barriers: Vec<TgBufferTransition>,
    pub transitions: Vec<TgImageTransition>,

    /// group 结束后图像的 layout
    pub final_layouts: Vec<(TgResourceHandle, vk::ImageLayout)>,
    /// 本 group 中完成 clear 的资源
    pub cleared: Vec<TgResourceHandle>,
    /// layout 作用域自身用到的 stage
    pub stage_mask: vk::PipelineStageFlags2,
}

impl TgGroupPlan {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pre_clear.is_empty()
            && self.clears.is_empty()
            && self.buffer_barriers.is_empty()
            && self.transitions.is_empty()
    }
}

/// 转换的 src：资源链上前一次访问的 stage 和 access
fn src_masks(registry: &TgResourceRegistry, access: &TgAccess) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    access
        .prev_access
        .map(|prev| registry.access(prev))
        .filter(|prev| !prev.stage.is_empty())
        .map_or((vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::NONE), |prev| (prev.stage, prev.access))
}

/// 计算一个 group 的 layout 作用域内容
pub fn plan_group(
    registry: &TgResourceRegistry,
    tracker: &TgLayoutTracker,
    tasks: &[TgTask<'_>],
    group: &TgExecutionGroup,
    swapchain: Option<(vk::Image, vk::ImageView)>,
) -> TgGroupPlan {
    let _span = tracy_client::span!("plan_group");
    let mut plan = TgGroupPlan::default();
    // 本 group 内已经推进过的 layout
    let mut current: HashMap<TgResourceHandle, vk::ImageLayout> = HashMap::new();

    let accesses = group.tasks.iter().flat_map(|&index| tasks[index].accesses.iter().copied());
    for handle in accesses {
        let access = registry.access(handle);
        if access.kind.is_import_only() {
            continue;
        }
        let resource = registry.resource(access.resource);
        let (mut src_stage, mut src_access) = src_masks(registry, access);
        let mut force_transition = false;

        if let Some(clear) = tracker.pending_clear(access.resource).filter(|_| !plan.cleared.contains(&access.resource))
        {
            plan.cleared.push(access.resource);
            plan.stage_mask |= vk::PipelineStageFlags2::TRANSFER;

            match (resource.native, clear) {
                (TgNativeResource::Buffer { buffer }, TgClearValue::Fill(data)) => {
                    plan.clears.push(TgClearCommand::Buffer {
                        resource: access.resource,
                        buffer,
                        data,
                    });
                    plan.buffer_barriers.push(TgBufferTransition {
                        resource: access.resource,
                        buffer,
                        dst_stage: access.stage,
                        dst_access: access.access,
                    });
                }
                (native, TgClearValue::Color(_) | TgClearValue::DepthStencil(_)) if native.is_image() => {
                    let image = native.resolve_image(swapchain).0;
                    let old_layout = current
                        .get(&access.resource)
                        .copied()
                        .unwrap_or_else(|| tracker.layout(access.resource));
                    plan.pre_clear.push(TgImageTransition {
                        resource: access.resource,
                        image,
                        aspect: native.aspect(),
                        old_layout,
                        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        src_stage,
                        src_access,
                        dst_stage: vk::PipelineStageFlags2::TRANSFER,
                        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                    });
                    plan.clears.push(TgClearCommand::Image {
                        resource: access.resource,
                        image,
                        aspect: native.aspect(),
                        value: clear,
                    });
                    current.insert(access.resource, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                    (src_stage, src_access) = (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);
                    force_transition = true;
                }
                (_, clear) => panic!("unrecognized clear payload {:?} for resource \"{}\"", clear, resource.name),
            }
        }

        if !resource.native.is_image() {
            continue;
        }

        let old_layout = current.get(&access.resource).copied().unwrap_or_else(|| tracker.layout(access.resource));
        if old_layout != access.layout || force_transition {
            plan.transitions.push(TgImageTransition {
                resource: access.resource,
                image: resource.native.resolve_image(swapchain).0,
                aspect: resource.native.aspect(),
                old_layout,
                new_layout: access.layout,
                src_stage,
                src_access,
                dst_stage: access.stage,
                dst_access: access.access,
            });
            current.insert(access.resource, access.layout);
        }
    }

    plan.final_layouts = current.into_iter().sorted_by_key(|(resource, _)| *resource).collect_vec();
    plan
}

/// 把计划录制到 layout 作用域
pub fn record_layout_commands(scope: &mut dyn GfxCommandScope, plan: &TgGroupPlan) {
    if !plan.pre_clear.is_empty() {
        let barriers = plan.pre_clear.iter().map(TgImageTransition::to_gfx_barrier).collect_vec();
        scope.image_memory_barrier(vk::DependencyFlags::empty(), &barriers);
    }

    for clear in &plan.clears {
        match *clear {
            TgClearCommand::Image {
                image, aspect, value, ..
            } => {
                let range = vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: vk::REMAINING_ARRAY_LAYERS,
                };
                let layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
                match value {
                    TgClearValue::Color(color) => scope.clear_color_image(image, layout, &color, range),
                    TgClearValue::DepthStencil(depth) => scope.clear_depth_stencil_image(image, layout, &depth, range),
                    TgClearValue::Fill(_) => {}
                }
            }
            TgClearCommand::Buffer { buffer, data, .. } => scope.fill_buffer(buffer, 0, vk::WHOLE_SIZE, data),
        }
    }

    if !plan.buffer_barriers.is_empty() {
        let barriers = plan.buffer_barriers.iter().map(TgBufferTransition::to_gfx_barrier).collect_vec();
        scope.buffer_memory_barrier(vk::DependencyFlags::empty(), &barriers);
    }

    if !plan.transitions.is_empty() {
        let barriers = plan.transitions.iter().map(TgImageTransition::to_gfx_barrier).collect_vec();
        scope.image_memory_barrier(vk::DependencyFlags::empty(), &barriers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    use crate::resource::{TgResource, TgResourceOrigin};
    use crate::resource_handle::TgAccessHandle;
    use crate::resource_state::{TgAccessDesc, TgAccessMode, TgImportInfo};
    use crate::task::TgTaskKind;

    const STAGE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::COMPUTE_SHADER;

    fn image(raw: u64) -> TgNativeResource {
        TgNativeResource::image(vk::Image::from_raw(raw), vk::ImageView::from_raw(raw), vk::Format::R8G8B8A8_UNORM)
    }

    fn single_task(accesses: Vec<TgAccessHandle>) -> (Vec<TgTask<'static>>, TgExecutionGroup) {
        tracy_client::Client::start();
        let task = TgTask {
            name: "task".to_string(),
            kind: TgTaskKind::Compute,
            accesses,
            stage_mask: STAGE,
            work: None,
        };
        let group = TgExecutionGroup {
            tasks: vec![0],
            stage_mask: STAGE,
        };
        (vec![task], group)
    }

    #[test]
    fn test_transition_from_import_state() {
        let mut registry = TgResourceRegistry::new();
        let info = TgImportInfo::new(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
        );
        let (head, _) = registry.import("gbuffer", image(1), info);
        let sampled = registry.append_access(head, TgAccessDesc::sampled(STAGE), None);
        let (tasks, group) = single_task(vec![sampled]);

        let tracker = TgLayoutTracker::from_registry(&registry);
        let plan = plan_group(&registry, &tracker, &tasks, &group, None);

        assert_eq!(plan.transitions.len(), 1);
        let transition = plan.transitions[0];
        assert_eq!(transition.old_layout, vk::ImageLayout::ATTACHMENT_OPTIMAL);
        assert_eq!(transition.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(transition.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(transition.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(transition.dst_stage, STAGE);
        assert!(plan.pre_clear.is_empty() && plan.clears.is_empty());
    }

    #[test]
    fn test_no_transition_when_layout_matches() {
        let mut registry = TgResourceRegistry::new();
        let info = TgImportInfo::new(STAGE, vk::AccessFlags2::SHADER_STORAGE_WRITE, vk::ImageLayout::GENERAL);
        let (head, _) = registry.import("history", image(1), info);
        let read = registry.append_access(head, TgAccessDesc::storage_image(STAGE, TgAccessMode::Read), None);
        let (tasks, group) = single_task(vec![read]);

        let tracker = TgLayoutTracker::from_registry(&registry);
        let plan = plan_group(&registry, &tracker, &tasks, &group, None);
        assert!(plan.is_empty());
        assert!(plan.final_layouts.is_empty());
    }

    #[test]
    fn test_import_only_head_uses_all_commands() {
        let mut registry = TgResourceRegistry::new();
        let (head, _) = registry.import("target", image(1), TgImportInfo::IMPORT_ONLY);
        let write = registry.append_access(head, TgAccessDesc::storage_image(STAGE, TgAccessMode::Write), None);
        let (tasks, group) = single_task(vec![head, write]);

        let tracker = TgLayoutTracker::from_registry(&registry);
        let plan = plan_group(&registry, &tracker, &tasks, &group, None);

        let transition = plan.transitions[0];
        assert_eq!(transition.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(transition.new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(transition.src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(transition.src_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_clear_precedes_first_access() {
        let mut registry = TgResourceRegistry::new();
        let clear = TgClearValue::Color(vk::ClearColorValue { float32: [0.0; 4] });
        let resource = TgResource::new("accum", image(7), TgResourceOrigin::Transient).with_clear(Some(clear));
        let (head, _) = registry.register(resource, TgAccessDesc::IMPORT_ONLY);
        let write = registry.append_access(head, TgAccessDesc::storage_image(STAGE, TgAccessMode::ReadWrite), None);
        let (tasks, group) = single_task(vec![head, write]);

        let mut tracker = TgLayoutTracker::from_registry(&registry);
        let plan = plan_group(&registry, &tracker, &tasks, &group, None);

        assert_eq!(plan.pre_clear.len(), 1);
        assert_eq!(plan.pre_clear[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(plan.pre_clear[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(plan.clears.len(), 1);
        let transition = plan.transitions[0];
        assert_eq!(transition.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(transition.src_stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(transition.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert!(plan.stage_mask.contains(vk::PipelineStageFlags2::TRANSFER));

        let resource = registry.access(write).resource;
        tracker.apply(&plan);
        assert_eq!(tracker.layout(resource), vk::ImageLayout::GENERAL);
        assert!(tracker.pending_clear(resource).is_none());
    }

    #[test]
    fn test_buffer_fill_gets_barrier() {
        let mut registry = TgResourceRegistry::new();
        let native = TgNativeResource::buffer(vk::Buffer::from_raw(3));
        let resource = TgResource::new("counters", native, TgResourceOrigin::Transient)
            .with_clear(Some(TgClearValue::Fill(0)));
        let (head, _) = registry.register(resource, TgAccessDesc::IMPORT_ONLY);
        let read = registry.append_access(head, TgAccessDesc::storage_buffer(STAGE, TgAccessMode::Read), None);
        let (tasks, group) = single_task(vec![head, read]);

        let tracker = TgLayoutTracker::from_registry(&registry);
        let plan = plan_group(&registry, &tracker, &tasks, &group, None);

        assert!(matches!(plan.clears[0], TgClearCommand::Buffer { data: 0, .. }));
        assert_eq!(plan.buffer_barriers[0].dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);
        assert!(plan.transitions.is_empty());
    }

    #[test]
    fn test_swapchain_placeholder_resolved() {
        let mut registry = TgResourceRegistry::new();
        let (head, _) = registry.import("swapchain", TgNativeResource::SwapchainImage, TgImportInfo::IMPORT_ONLY);
        let color = registry.append_access(head, TgAccessDesc::COLOR_ATTACHMENT, None);
        let (tasks, group) = single_task(vec![color]);

        let tracker = TgLayoutTracker::from_registry(&registry);
        let acquired = (vk::Image::from_raw(42), vk::ImageView::from_raw(43));
        let plan = plan_group(&registry, &tracker, &tasks, &group, Some(acquired));

        assert_eq!(plan.transitions[0].image, acquired.0);
        assert_eq!(plan.transitions[0].new_layout, vk::ImageLayout::ATTACHMENT_OPTIMAL);
    }
}
