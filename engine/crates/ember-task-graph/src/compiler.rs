//! 依赖编译
//!
//! 按声明顺序对 task 做一次前向扫描，为每个 task 选择最早的合法 group：
//!
//! - 只登记的访问：group 0
//! - 写：`max(last_read + 1, last_write + 1)`
//! - 读：`last_write + 1`，并且与前一次访问是同一 layout 的读时可以和它合并到 `last_read`，
//!   否则至少为 `last_read + 1`
//!
//! task 的 group 取其所有访问的最大值，随后按访问类型更新资源的 `last_read_group` / `last_write_group`。

use std::collections::HashMap;

use ash::vk;
use itertools::Itertools;

use crate::resource::TgAccess;
use crate::resource_handle::TgResourceHandle;
use crate::resource_registry::TgResourceRegistry;
use crate::resource_state::TgAccessKind;
use crate::task::TgTask;

/// 共享同一个同步点的一组 task，组内没有依赖
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TgExecutionGroup {
    /// task 在 build 中的序号，保持声明顺序
    pub tasks: Vec<usize>,
    pub stage_mask: vk::PipelineStageFlags2,
}

/// 尚未调度记为 `None`，下一个可用的 group
#[inline]
fn next_group(group: Option<usize>) -> usize {
    group.map_or(0, |group| group + 1)
}

/// 一次访问最早可以进入的 group
pub fn earliest_group(registry: &TgResourceRegistry, access: &TgAccess) -> usize {
    let resource = registry.resource(access.resource);
    let last_read = resource.last_read_group;
    let last_write = resource.last_write_group;

    match access.kind {
        TgAccessKind::ImportOnly => 0,
        TgAccessKind::Write | TgAccessKind::ReadWrite => next_group(last_read).max(next_group(last_write)),
        TgAccessKind::Read => {
            let coalesced = access.prev_access.map(|prev| registry.access(prev)).is_some_and(|prev| {
                prev.kind == TgAccessKind::Read && prev.layout == access.layout
            });
            let after_reads = if coalesced { last_read.unwrap_or(0) } else { next_group(last_read) };
            after_reads.max(next_group(last_write))
        }
    }
}

/// 编译结果
#[derive(Clone, Debug, Default)]
pub struct TgSchedule {
    pub groups: Vec<TgExecutionGroup>,
    /// 每个 task 所在的 group
    pub task_groups: Vec<usize>,
}

/// 为所有 task 分配 group，并更新资源的 group 记录
pub fn compile_groups(registry: &mut TgResourceRegistry, tasks: &[TgTask<'_>]) -> TgSchedule {
    let mut schedule = TgSchedule::default();

    for (task_index, task) in tasks.iter().enumerate() {
        let group = {
            let registry: &TgResourceRegistry = registry;
            task.accesses.iter().map(|&handle| earliest_group(registry, registry.access(handle))).max().unwrap_or(0)
        };

        if schedule.groups.len() <= group {
            schedule.groups.resize_with(group + 1, TgExecutionGroup::default);
        }
        let entry = &mut schedule.groups[group];
        entry.tasks.push(task_index);
        entry.stage_mask |= task.stage_mask;
        schedule.task_groups.push(group);

        for &handle in &task.accesses {
            let access = *registry.access(handle);
            let resource = registry.resource_mut(access.resource);
            if access.kind.is_read() {
                resource.last_read_group = Some(resource.last_read_group.map_or(group, |last| last.max(group)));
            }
            if access.kind.is_write() {
                resource.last_write_group = Some(resource.last_write_group.map_or(group, |last| last.max(group)));
            }
        }

        log::trace!("task \"{}\" -> group {}", task.name, group);
    }

    schedule
}

/// 只被登记、从未被真正访问的资源
///
/// 通常是忘记调用 helper，或者导入时漏写了 flags。
pub fn warn_import_only(registry: &TgResourceRegistry) {
    for (handle, resource) in registry.iter_resources() {
        let only_imported = registry
            .history(handle)
            .into_iter()
            .all(|access| registry.access(access).kind.is_import_only());
        if only_imported {
            log::warn!("resource \"{}\" is only imported and never accessed with real flags", resource.name);
        }
    }
}

/// 检查同一 group 内没有冲突
///
/// - 一个资源被某个 task 写入时，不能再被同组的其他 task 访问
/// - 同一图像在一个 group 内只能请求一种 layout
///
/// # Panics
/// 存在冲突
pub fn validate_groups(registry: &TgResourceRegistry, tasks: &[TgTask<'_>], groups: &[TgExecutionGroup]) {
    #[derive(Default)]
    struct Usage {
        writer: Option<usize>,
        users: Vec<usize>,
        layout: Option<vk::ImageLayout>,
    }

    for (group_index, group) in groups.iter().enumerate() {
        let mut usages: HashMap<TgResourceHandle, Usage> = HashMap::new();

        for &task_index in &group.tasks {
            for &handle in &tasks[task_index].accesses {
                let access = registry.access(handle);
                if access.kind.is_import_only() {
                    continue;
                }
                let resource = registry.resource(access.resource);
                let usage = usages.entry(access.resource).or_default();

                if !usage.users.contains(&task_index) {
                    usage.users.push(task_index);
                }
                if access.kind.is_write() {
                    usage.writer.get_or_insert(task_index);
                }
                if let Some(writer) = usage.writer {
                    if let Some(&other) = usage.users.iter().find(|&&user| user != writer) {
                        panic!(
                            "resource \"{}\" is written by task \"{}\" and accessed by task \"{}\" in the same group {}",
                            resource.name, tasks[writer].name, tasks[other].name, group_index
                        );
                    }
                }

                if resource.native.is_image() {
                    let layout = *usage.layout.get_or_insert(access.layout);
                    assert_eq!(
                        layout, access.layout,
                        "image \"{}\" requests conflicting layouts in group {} (task \"{}\")",
                        resource.name, group_index, tasks[task_index].name
                    );
                }
            }
        }
    }
}

/// 每个 group 的 task 名，用于日志
pub fn group_task_names<'t>(tasks: &'t [TgTask<'_>], group: &TgExecutionGroup) -> Vec<&'t str> {
    group.tasks.iter().map(|&index| tasks[index].name.as_str()).collect_vec()
}
