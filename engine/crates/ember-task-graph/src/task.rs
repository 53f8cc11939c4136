//! Task 定义以及执行时的上下文

use ash::vk;
use ember_gfx::commands::command_scope::GfxCommandScope;
use ember_gfx::queue::GfxSubmitQueue;

use crate::resource::TgNativeResource;
use crate::resource_handle::TgAccessHandle;
use crate::resource_registry::TgResourceRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TgTaskKind {
    Graphics,
    Compute,
    RayTracing,
}

impl TgTaskKind {
    /// helper 中 "task 的 stage" 对应的 pipeline stage
    #[inline]
    pub fn shader_stage(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::Graphics => vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            Self::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            Self::RayTracing => vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        }
    }
}

/// trace rays 所需的参数
///
/// SBT 各区域以及 dispatch 尺寸。
#[derive(Clone, Copy, Debug, Default)]
pub struct TgRayTracingSettings {
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
    pub extent: vk::Extent3D,
}

impl TgRayTracingSettings {
    /// 缺失的必要参数，`None` 表示参数完整
    pub fn missing_settings(&self) -> Option<&'static str> {
        if self.raygen.device_address == 0 || self.raygen.size == 0 {
            return Some("ray generation shader binding table region");
        }
        if self.extent.width == 0 || self.extent.height == 0 || self.extent.depth == 0 {
            return Some("trace extent");
        }
        None
    }
}

/// 延迟执行的录制工作
///
/// 闭包 `FnOnce(&mut TgTaskContext)` 自动实现该 trait。
pub trait TgRecord {
    fn record(self: Box<Self>, ctx: &mut TgTaskContext<'_>);
}

impl<F> TgRecord for F
where
    F: FnOnce(&mut TgTaskContext<'_>),
{
    fn record(self: Box<Self>, ctx: &mut TgTaskContext<'_>) {
        (*self)(ctx)
    }
}

/// setup 的返回值与录制闭包绑定在一起
pub(crate) struct TgBoundWork<W, T> {
    pub(crate) work: W,
    pub(crate) data: T,
}

impl<W, T> TgRecord for TgBoundWork<W, T>
where
    W: FnOnce(&mut TgTaskContext<'_>, T),
{
    fn record(self: Box<Self>, ctx: &mut TgTaskContext<'_>) {
        let Self { work, data } = *self;
        work(ctx, data)
    }
}

/// 按 task 类型区分的录制工作
pub(crate) enum TgTaskWork<'a> {
    Graphics(Box<dyn TgRecord + 'a>),
    Compute(Box<dyn TgRecord + 'a>),
    RayTracing {
        settings: TgRayTracingSettings,
        work: Box<dyn TgRecord + 'a>,
    },
}

impl<'a> TgTaskWork<'a> {
    pub(crate) fn kind(&self) -> TgTaskKind {
        match self {
            Self::Graphics(_) => TgTaskKind::Graphics,
            Self::Compute(_) => TgTaskKind::Compute,
            Self::RayTracing { .. } => TgTaskKind::RayTracing,
        }
    }

    pub(crate) fn into_parts(self) -> (Box<dyn TgRecord + 'a>, Option<TgRayTracingSettings>) {
        match self {
            Self::Graphics(work) | Self::Compute(work) => (work, None),
            Self::RayTracing { settings, work } => (work, Some(settings)),
        }
    }
}

/// 一个声明好的 task
pub struct TgTask<'a> {
    pub name: String,
    pub kind: TgTaskKind,
    /// 按声明顺序
    pub accesses: Vec<TgAccessHandle>,
    /// 所有访问的 stage 之并
    pub stage_mask: vk::PipelineStageFlags2,

    /// 执行时取出
    pub(crate) work: Option<TgTaskWork<'a>>,
}

/// Task 执行时的上下文
///
/// 命令录制作用域在第一次调用 `cmd` 时才会创建，不录制命令的 task 不会产生作用域。
pub struct TgTaskContext<'r> {
    task_name: &'r str,
    scope_name: String,
    registry: &'r TgResourceRegistry,
    swapchain: Option<(vk::Image, vk::ImageView)>,
    ray_tracing: Option<TgRayTracingSettings>,

    queue: &'r mut dyn GfxSubmitQueue,
    scope: Option<Box<dyn GfxCommandScope>>,
}

impl<'r> TgTaskContext<'r> {
    pub(crate) fn new(
        task_name: &'r str,
        scope_name: String,
        registry: &'r TgResourceRegistry,
        swapchain: Option<(vk::Image, vk::ImageView)>,
        ray_tracing: Option<TgRayTracingSettings>,
        queue: &'r mut dyn GfxSubmitQueue,
    ) -> Self {
        Self {
            task_name,
            scope_name,
            registry,
            swapchain,
            ray_tracing,
            queue,
            scope: None,
        }
    }

    /// 结束录制，返回需要提交的作用域
    pub(crate) fn finish(self) -> Option<Box<dyn GfxCommandScope>> {
        self.scope.map(|mut scope| {
            scope.end();
            scope
        })
    }
}

impl TgTaskContext<'_> {
    #[inline]
    pub fn task_name(&self) -> &str {
        self.task_name
    }

    /// 命令录制作用域
    pub fn cmd(&mut self) -> &mut (dyn GfxCommandScope + 'static) {
        let queue = &mut *self.queue;
        let scope_name = &self.scope_name;
        self.scope.get_or_insert_with(|| queue.begin_scope(scope_name)).as_mut()
    }

    /// # Panics
    /// 访问的不是 buffer
    pub fn buffer(&self, access: TgAccessHandle) -> vk::Buffer {
        let resource = self.registry.resource_of(access);
        match resource.native {
            TgNativeResource::Buffer { buffer } => buffer,
            _ => panic!(
                "unrecognized access payload: image \"{}\" used as a buffer in task \"{}\"",
                resource.name, self.task_name
            ),
        }
    }

    pub fn image(&self, access: TgAccessHandle) -> vk::Image {
        self.registry.resource_of(access).native.resolve_image(self.swapchain).0
    }

    /// 访问声明的 view，没有覆盖时为默认视图
    pub fn image_view(&self, access: TgAccessHandle) -> vk::ImageView {
        let entry = self.registry.access(access);
        match entry.view_override {
            Some(view) => view,
            None => self.registry.resource(entry.resource).native.resolve_image(self.swapchain).1,
        }
    }

    /// 执行时图像所处的 layout
    #[inline]
    pub fn layout(&self, access: TgAccessHandle) -> vk::ImageLayout {
        self.registry.access(access).layout
    }

    #[inline]
    pub fn ray_tracing_settings(&self) -> Option<&TgRayTracingSettings> {
        self.ray_tracing.as_ref()
    }
}
