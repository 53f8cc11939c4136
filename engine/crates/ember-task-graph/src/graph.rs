//! TaskGraph 与一次 build
//!
//! `TaskGraph` 跨帧存在，持有 timeline semaphore、持久资源缓存以及 build 级 arena；
//! `TgBuild` 是一帧内的声明、编译和执行。
//!
//! # 使用流程
//!
//! 1. `graph.begin_build(&mut factory)`
//! 2. 导入外部资源: `build.import_resource(...)`
//! 3. 添加 task: `build.add_compute_pass(name, setup, work)`，setup 立即执行
//! 4. 编译: `build.compile()`
//! 5. 执行: `build.execute(&mut queue, wait_on)`，之后本次 build 的所有状态被丢弃

use std::collections::HashMap;

use ash::prelude::VkResult;
use ash::vk;
use ember_gfx::commands::semaphore::GfxSemaphoreInfo;
use ember_gfx::commands::submit_info::GfxSubmitInfo;
use ember_gfx::queue::GfxSubmitQueue;
use ember_gfx::resources::factory::GfxResourceFactory;
use itertools::Itertools;

use crate::compiler::{self, TgExecutionGroup, TgSchedule};
use crate::executor::{self, TgLayoutTracker};
use crate::persistent_cache::TgPersistentCache;
use crate::resource::{TgNativeKey, TgNativeResource, TgResourceOrigin, retire_native};
use crate::resource_handle::{TgAccessHandle, TgResourceHandle};
use crate::resource_registry::TgResourceRegistry;
use crate::resource_state::TgImportInfo;
use crate::task::{TgBoundWork, TgRayTracingSettings, TgRecord, TgTask, TgTaskContext, TgTaskKind, TgTaskWork};
use crate::task_builder::TgTaskBuilder;

/// TaskGraph 的配置
#[derive(Clone, Debug)]
pub struct TgConfig {
    /// 调试名称，也是录制作用域名称的前缀
    pub name: String,
    /// 编译后检查同一 group 内没有冲突
    pub validate_groups: bool,
    /// 编译后打印执行计划
    pub print_schedule: bool,
}

impl Default for TgConfig {
    fn default() -> Self {
        Self {
            name: "task-graph".to_string(),
            validate_groups: true,
            print_schedule: false,
        }
    }
}

/// swapchain 图像以及获取当前帧图像序号的回调
pub struct TgSwapchain {
    images: Vec<(vk::Image, vk::ImageView)>,
    acquire: Box<dyn FnMut() -> u32>,
}

pub struct TaskGraph {
    config: TgConfig,

    timeline: vk::Semaphore,
    /// 最近一次 signal 的值
    timeline_value: u64,

    /// build 级 arena，每次 build 结束时清空
    registry: TgResourceRegistry,
    persistent: TgPersistentCache,
    swapchain: Option<TgSwapchain>,
}

// new & init
impl TaskGraph {
    /// `timeline` 为共享的 timeline semaphore，从 0 开始计数
    pub fn new(config: TgConfig, timeline: vk::Semaphore) -> Self {
        Self::with_timeline_value(config, timeline, 0)
    }

    /// timeline semaphore 已经被使用过时，从它当前的值开始
    pub fn with_timeline_value(config: TgConfig, timeline: vk::Semaphore, timeline_value: u64) -> Self {
        Self {
            config,
            timeline,
            timeline_value,
            registry: TgResourceRegistry::new(),
            persistent: TgPersistentCache::new(),
            swapchain: None,
        }
    }

    /// 开始一次 build
    pub fn begin_build<'a>(&'a mut self, factory: &'a mut dyn GfxResourceFactory) -> TgBuild<'a> {
        self.registry.clear();
        TgBuild {
            graph: self,
            factory,
            tasks: Vec::new(),
            schedule: None,
            finished: false,
        }
    }

    /// 设置 swapchain，`acquire` 每次 build 执行时调用一次，返回图像序号
    pub fn set_swapchain(&mut self, images: Vec<(vk::Image, vk::ImageView)>, acquire: impl FnMut() -> u32 + 'static) {
        self.swapchain = Some(TgSwapchain {
            images,
            acquire: Box::new(acquire),
        });
    }

    /// swapchain 重建时先清除
    pub fn clear_swapchain(&mut self) {
        self.swapchain = None;
    }

    /// 把所有持久资源交还给 renderer
    pub fn release_persistent(&mut self, factory: &mut dyn GfxResourceFactory) {
        self.persistent.release_all(factory, self.timeline_value);
    }
}

// getters
impl TaskGraph {
    #[inline]
    pub fn config(&self) -> &TgConfig {
        &self.config
    }

    #[inline]
    pub fn timeline(&self) -> vk::Semaphore {
        self.timeline
    }

    #[inline]
    pub fn timeline_value(&self) -> u64 {
        self.timeline_value
    }

    #[inline]
    pub fn persistent_cache(&self) -> &TgPersistentCache {
        &self.persistent
    }
}

impl Drop for TaskGraph {
    fn drop(&mut self) {
        if !self.persistent.is_empty() {
            log::warn!(
                "task graph \"{}\" dropped with {} persistent resources not released",
                self.config.name,
                self.persistent.len()
            );
        }
    }
}

/// 执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TgExecution {
    pub timeline: vk::Semaphore,
    /// 最后一个 group 完成时 timeline 的值
    pub reached_value: u64,
    /// 每个 group 完成时 timeline 的值
    pub group_values: Vec<u64>,
}

impl TgExecution {
    /// 等待整个 build 完成
    #[inline]
    pub fn wait_info(&self, stage: vk::PipelineStageFlags2) -> GfxSemaphoreInfo {
        GfxSemaphoreInfo::timeline(self.timeline, stage, self.reached_value)
    }

    /// 只等待某个 group 完成
    #[inline]
    pub fn group_wait_info(&self, group: usize, stage: vk::PipelineStageFlags2) -> Option<GfxSemaphoreInfo> {
        self.group_values.get(group).map(|&value| GfxSemaphoreInfo::timeline(self.timeline, stage, value))
    }
}

/// 一次 build
///
/// `'a` 是 task 的录制闭包可以借用的外部数据的生命周期。
pub struct TgBuild<'a> {
    graph: &'a mut TaskGraph,
    factory: &'a mut dyn GfxResourceFactory,

    tasks: Vec<TgTask<'a>>,
    schedule: Option<TgSchedule>,
    /// 资源已经交还，arena 已经清空
    finished: bool,
}

// 导入
impl TgBuild<'_> {
    /// 导入外部资源，`info` 为资源当前所处的状态
    ///
    /// 同一个底层句柄重复导入时返回已有的链头。
    pub fn import_resource(
        &mut self,
        name: impl Into<String>,
        native: TgNativeResource,
        info: TgImportInfo,
    ) -> TgAccessHandle {
        self.graph.registry.import(name, native, info).0
    }

    /// 导入 swapchain 图像的占位符，执行时才解析为具体图像
    pub fn import_swapchain_image(&mut self, info: TgImportInfo) -> TgAccessHandle {
        self.import_resource("swapchain", TgNativeResource::SwapchainImage, info)
    }
}

// 添加 task
impl<'a> TgBuild<'a> {
    /// 添加图形 task
    ///
    /// `setup` 立即执行，其返回值在执行阶段传给 `work`。
    pub fn add_graphics_pass<T: 'a>(
        &mut self,
        name: impl Into<String>,
        setup: impl FnOnce(&mut TgTaskBuilder<'_>) -> T,
        work: impl FnOnce(&mut TgTaskContext<'_>, T) + 'a,
    ) -> &mut Self {
        self.add_task(name.into(), TgTaskKind::Graphics, setup, TgTaskWork::Graphics, work)
    }

    /// 添加计算 task
    pub fn add_compute_pass<T: 'a>(
        &mut self,
        name: impl Into<String>,
        setup: impl FnOnce(&mut TgTaskBuilder<'_>) -> T,
        work: impl FnOnce(&mut TgTaskContext<'_>, T) + 'a,
    ) -> &mut Self {
        self.add_task(name.into(), TgTaskKind::Compute, setup, TgTaskWork::Compute, work)
    }

    /// 添加光追 task
    ///
    /// 参数不完整时记录错误并丢弃该 task，`setup` 不会执行。
    pub fn add_raytracing_pass<T: 'a>(
        &mut self,
        name: impl Into<String>,
        settings: TgRayTracingSettings,
        setup: impl FnOnce(&mut TgTaskBuilder<'_>) -> T,
        work: impl FnOnce(&mut TgTaskContext<'_>, T) + 'a,
    ) -> &mut Self {
        let name = name.into();
        if let Some(missing) = settings.missing_settings() {
            log::error!("ray tracing task \"{}\" dropped: missing {}", name, missing);
            return self;
        }
        self.add_task(name, TgTaskKind::RayTracing, setup, |work| TgTaskWork::RayTracing { settings, work }, work)
    }

    fn add_task<T: 'a>(
        &mut self,
        name: String,
        kind: TgTaskKind,
        setup: impl FnOnce(&mut TgTaskBuilder<'_>) -> T,
        wrap: impl FnOnce(Box<dyn TgRecord + 'a>) -> TgTaskWork<'a>,
        work: impl FnOnce(&mut TgTaskContext<'_>, T) + 'a,
    ) -> &mut Self {
        assert!(self.schedule.is_none(), "task \"{name}\" added after the build was compiled");

        let timeline_value = self.graph.timeline_value;
        let mut builder = TgTaskBuilder::new(
            &name,
            kind,
            &mut self.graph.registry,
            &mut self.graph.persistent,
            &mut *self.factory,
            timeline_value,
        );
        let data = setup(&mut builder);
        let accesses = std::mem::take(&mut builder.accesses);
        let stage_mask = builder.stage_mask;

        self.check_task_layouts(&name, &accesses);

        let work = wrap(Box::new(TgBoundWork { work, data }));
        debug_assert_eq!(work.kind(), kind);
        self.tasks.push(TgTask {
            name,
            kind,
            accesses,
            stage_mask,
            work: Some(work),
        });
        self
    }

    /// 同一个 task 不能对同一图像请求两种 layout
    fn check_task_layouts(&self, task_name: &str, accesses: &[TgAccessHandle]) {
        let registry = &self.graph.registry;
        let mut layouts: HashMap<TgResourceHandle, vk::ImageLayout> = HashMap::new();
        for &handle in accesses {
            let access = registry.access(handle);
            let resource = registry.resource(access.resource);
            if access.kind.is_import_only() || !resource.native.is_image() {
                continue;
            }
            let layout = *layouts.entry(access.resource).or_insert(access.layout);
            assert_eq!(
                layout, access.layout,
                "task \"{}\" requests conflicting layouts for image \"{}\"",
                task_name, resource.name
            );
        }
    }
}

// 编译
impl TgBuild<'_> {
    /// 为所有 task 分配 group
    ///
    /// # Panics
    /// 重复编译；开启 `validate_groups` 时同一 group 内存在冲突
    pub fn compile(&mut self) {
        let _span = tracy_client::span!("TgBuild::compile");
        assert!(self.schedule.is_none(), "build \"{}\" compiled twice", self.graph.config.name);

        let schedule = compiler::compile_groups(&mut self.graph.registry, &self.tasks);
        compiler::warn_import_only(&self.graph.registry);
        if self.graph.config.validate_groups {
            compiler::validate_groups(&self.graph.registry, &self.tasks, &schedule.groups);
        }
        log::debug!(
            "build \"{}\" compiled: {} tasks in {} groups",
            self.graph.config.name,
            self.tasks.len(),
            schedule.groups.len()
        );
        self.schedule = Some(schedule);

        if self.graph.config.print_schedule {
            self.print_schedule();
        }
    }

    /// 编译之前为空
    #[inline]
    pub fn groups(&self) -> &[TgExecutionGroup] {
        self.schedule.as_ref().map(|schedule| schedule.groups.as_slice()).unwrap_or_default()
    }

    /// task 所在的 group，未编译或者 task 不存在时为 `None`
    pub fn task_group(&self, name: &str) -> Option<usize> {
        let schedule = self.schedule.as_ref()?;
        let index = self.tasks.iter().position(|task| task.name == name)?;
        schedule.task_groups.get(index).copied()
    }

    #[inline]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// 打印执行计划（用于调试）
    pub fn print_schedule(&self) {
        let registry = &self.graph.registry;
        let groups = self.groups();

        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║ TaskGraph \"{}\" execution plan", self.graph.config.name);
        log::info!("║ {} tasks, {} groups", self.tasks.len(), groups.len());
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (group_index, group) in groups.iter().enumerate() {
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ Group {}: {:?}", group_index, group.stage_mask);
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            for &task_index in &group.tasks {
                let task = &self.tasks[task_index];
                log::info!("│ [{:?}] \"{}\"", task.kind, task.name);
                for &handle in &task.accesses {
                    let access = registry.access(handle);
                    let resource = registry.resource(access.resource);
                    let kind = format!("{:?}", access.kind);
                    if resource.native.is_image() {
                        log::info!("│     {:<10} \"{}\" -> {:?}", kind, resource.name, access.layout);
                    } else {
                        log::info!("│     {:<10} \"{}\"", kind, resource.name);
                    }
                }
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }
    }
}

// 执行
impl TgBuild<'_> {
    /// 按 group 顺序录制并提交
    ///
    /// 每个 group 等待 timeline 的上一个值，并 signal 下一个值；第一个 group 额外等待 `wait_on`。
    /// 只录制和提交，不等待 GPU 完成。
    ///
    /// # Panics
    /// 导入了 swapchain 图像但没有设置 swapchain，或者回调返回的序号越界
    pub fn execute(
        mut self,
        queue: &mut dyn GfxSubmitQueue,
        wait_on: Option<GfxSemaphoreInfo>,
    ) -> VkResult<TgExecution> {
        let _span = tracy_client::span!("TgBuild::execute");
        if self.schedule.is_none() {
            self.compile();
        }
        let schedule = self.schedule.take().unwrap_or_default();
        let mut tasks = std::mem::take(&mut self.tasks);
        let swapchain = self.acquire_swapchain();

        let mut tracker = TgLayoutTracker::from_registry(&self.graph.registry);
        let mut group_values = Vec::with_capacity(schedule.groups.len());
        let submitted = self.submit_groups(
            queue,
            wait_on,
            &schedule,
            &mut tasks,
            swapchain,
            &mut tracker,
            &mut group_values,
        );

        // 提交失败时 tracker 停在最后一个成功提交的 group
        self.release(Some(&tracker));
        submitted?;

        Ok(TgExecution {
            timeline: self.graph.timeline,
            reached_value: self.graph.timeline_value,
            group_values,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_groups(
        &mut self,
        queue: &mut dyn GfxSubmitQueue,
        wait_on: Option<GfxSemaphoreInfo>,
        schedule: &TgSchedule,
        tasks: &mut [TgTask<'_>],
        swapchain: Option<(vk::Image, vk::ImageView)>,
        tracker: &mut TgLayoutTracker,
        group_values: &mut Vec<u64>,
    ) -> VkResult<()> {
        let name = self.graph.config.name.clone();
        let timeline = self.graph.timeline;

        if schedule.groups.is_empty() {
            if let Some(wait) = wait_on {
                // 没有 task 时也要把等待传递下去
                let wait_value = self.graph.timeline_value;
                let submit_info = GfxSubmitInfo::new()
                    .wait(GfxSemaphoreInfo::timeline(timeline, vk::PipelineStageFlags2::ALL_COMMANDS, wait_value))
                    .wait(wait)
                    .signal(GfxSemaphoreInfo::timeline(
                        timeline,
                        vk::PipelineStageFlags2::ALL_COMMANDS,
                        wait_value + 1,
                    ));
                queue.submit(Vec::new(), submit_info)?;
                self.graph.timeline_value = wait_value + 1;
            }
        }

        for (group_index, group) in schedule.groups.iter().enumerate() {
            let plan = executor::plan_group(&self.graph.registry, tracker, tasks, group, swapchain);

            let mut scopes = Vec::with_capacity(group.tasks.len() + 1);
            if !plan.is_empty() {
                let mut scope = queue.begin_scope(&format!("{name}::group-{group_index}::layout"));
                executor::record_layout_commands(scope.as_mut(), &plan);
                scope.end();
                scopes.push(scope);
            }

            for &task_index in &group.tasks {
                let task = &mut tasks[task_index];
                let Some(work) = task.work.take() else {
                    continue;
                };
                let (record, ray_tracing) = work.into_parts();
                let mut ctx = TgTaskContext::new(
                    &task.name,
                    format!("{name}::{}", task.name),
                    &self.graph.registry,
                    swapchain,
                    ray_tracing,
                    &mut *queue,
                );
                record.record(&mut ctx);
                scopes.extend(ctx.finish());
            }

            let wait_value = self.graph.timeline_value;
            let signal_value = wait_value + 1;
            let mut signal_stage = group.stage_mask | plan.stage_mask;
            if signal_stage.is_empty() {
                signal_stage = vk::PipelineStageFlags2::ALL_COMMANDS;
            }

            let mut submit_info = GfxSubmitInfo::new().wait(GfxSemaphoreInfo::timeline(
                timeline,
                vk::PipelineStageFlags2::ALL_COMMANDS,
                wait_value,
            ));
            if group_index == 0 {
                if let Some(wait) = wait_on {
                    submit_info = submit_info.wait(wait);
                }
            }
            submit_info = submit_info.signal(GfxSemaphoreInfo::timeline(timeline, signal_stage, signal_value));

            log::debug!(
                "group {} [{}]: {} scopes, {} transitions, signal {}",
                group_index,
                compiler::group_task_names(tasks, group).join(", "),
                scopes.len(),
                plan.pre_clear.len() + plan.transitions.len(),
                signal_value
            );
            queue.submit(scopes, submit_info)?;

            self.graph.timeline_value = signal_value;
            group_values.push(signal_value);
            tracker.apply(&plan);
        }

        Ok(())
    }

    /// 解析 swapchain 占位符，每次 build 只调用一次回调
    fn acquire_swapchain(&mut self) -> Option<(vk::Image, vk::ImageView)> {
        self.graph.registry.find_native(TgNativeKey::Swapchain)?;

        let Some(swapchain) = self.graph.swapchain.as_mut() else {
            panic!("build \"{}\" imports the swapchain image but no swapchain is set", self.graph.config.name);
        };
        let index = (swapchain.acquire)() as usize;
        assert!(
            index < swapchain.images.len(),
            "swapchain image index {} out of range ({} images)",
            index,
            swapchain.images.len()
        );
        Some(swapchain.images[index])
    }

    /// 交还临时资源，保存持久资源的 layout 与 clear 状态，清空 arena
    ///
    /// `tracker` 为 `None` 表示没有任何 group 提交过。
    fn release(&mut self, tracker: Option<&TgLayoutTracker>) {
        let timeline_value = self.graph.timeline_value;
        let graph = &mut *self.graph;
        for (handle, resource) in graph.registry.iter_resources() {
            match resource.origin {
                TgResourceOrigin::Transient => retire_native(resource.native, &mut *self.factory, timeline_value),
                TgResourceOrigin::Persistent { key } => {
                    if let Some(tracker) = tracker {
                        if resource.native.is_image() {
                            graph.persistent.store_layout(key, tracker.layout(handle));
                        }
                        if resource.pending_clear.is_some() && tracker.pending_clear(handle).is_none() {
                            graph.persistent.mark_cleared(key);
                        }
                    }
                }
                TgResourceOrigin::Imported => {}
            }
        }

        let retired = graph
            .registry
            .iter_resources()
            .filter(|(_, resource)| resource.origin == TgResourceOrigin::Transient)
            .map(|(_, resource)| resource.name.as_str())
            .collect_vec();
        if !retired.is_empty() {
            log::trace!("retired transient resources at {}: {:?}", timeline_value, retired);
        }

        graph.registry.clear();
        self.finished = true;
    }
}

impl Drop for TgBuild<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if !self.tasks.is_empty() || self.graph.registry.resource_count() > 0 {
            log::warn!("build \"{}\" dropped before its execution completed", self.graph.config.name);
        }
        self.release(None);
    }
}
