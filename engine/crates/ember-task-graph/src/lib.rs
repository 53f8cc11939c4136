//! Ember Task Graph - 声明式 GPU task 调度
//!
//! 每帧声明一组 task 以及它们对 buffer / image 的访问，graph 自动决定执行顺序、
//! 插入 layout 转换，并用 timeline semaphore 把各个 group 串起来。
//!
//! # 核心概念
//!
//! - **TgAccessHandle**: 一次资源访问，同一资源上的访问通过 `prev_access` 串成链
//! - **TgTaskBuilder**: setup 阶段声明访问，每个 helper 返回新的访问句柄
//! - **TgExecutionGroup**: 组内 task 之间没有依赖，共享一个同步点
//! - **TgBuild**: 一帧的声明、编译和执行，执行后所有状态随之丢弃
//! - **TgPersistentCache**: 以 `(task 名, 资源名)` 为键跨帧保留的资源
//!
//! # 使用示例
//!
//! ```ignore
//! let mut graph = TaskGraph::new(TgConfig::default(), timeline_semaphore);
//!
//! let mut build = graph.begin_build(&mut factory);
//! let depth = build.import_resource("depth", depth_native, TgImportInfo::IMPORT_ONLY);
//!
//! build.add_graphics_pass(
//!     "gbuffer",
//!     |b| {
//!         let desc = GfxImageDesc::new_2d("albedo", 1920, 1080, vk::Format::R8G8B8A8_UNORM, usage);
//!         let albedo = b.create_resource(desc, true, None);
//!         let albedo = b.access_color(albedo, TgAccessOverrides::NONE);
//!         let depth = b.access_depth(depth, TgAccessOverrides::NONE);
//!         (albedo, depth)
//!     },
//!     |ctx, (albedo, depth)| {
//!         let view = ctx.image_view(albedo);
//!         // begin rendering, draw...
//!     },
//! );
//!
//! build.compile();
//! let execution = build.execute(&mut queue, Some(acquire_semaphore))?;
//! present_queue.wait(execution.wait_info(vk::PipelineStageFlags2::ALL_COMMANDS));
//! ```
//!
//! # 模块结构
//!
//! - `resource_handle`: build 级 arena 的句柄
//! - `resource_state`: stage / access / layout 以及各类用途的标准组合
//! - `resource`: 资源与访问
//! - `resource_registry`: 资源注册表和访问账本
//! - `persistent_cache`: 跨 build 保留的资源
//! - `task` / `task_builder`: task 定义、setup 与执行上下文
//! - `compiler`: 分配 group
//! - `executor`: layout 转换与 clear 的计划
//! - `graph`: `TaskGraph` 与 `TgBuild`

pub mod compiler;
pub mod executor;
pub mod graph;
pub mod persistent_cache;
pub mod resource;
pub mod resource_handle;
pub mod resource_registry;
pub mod resource_state;
pub mod task;
pub mod task_builder;

// Re-exports
pub use compiler::TgExecutionGroup;
pub use graph::{TaskGraph, TgBuild, TgConfig, TgExecution};
pub use persistent_cache::TgPersistentCache;
pub use resource::{TgClearValue, TgNativeResource, TgResourceDesc};
pub use resource_handle::{TgAccessHandle, TgResourceHandle};
pub use resource_state::{TgAccessDesc, TgAccessKind, TgAccessMode, TgAccessOverrides, TgImportInfo};
pub use task::{TgRayTracingSettings, TgRecord, TgTaskContext, TgTaskKind};
pub use task_builder::TgTaskBuilder;
