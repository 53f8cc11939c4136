//! 资源与访问
//!
//! `TgResource` 是一次 build 中被触碰的一个 GPU 对象，`TgAccess` 是对它的一次声明式访问。
//! 每个访问通过 `prev_access` 指向同一资源上的前一次访问，形成该资源在本次 build 中的完整读写历史。

use std::fmt;

use ash::vk;
use ember_gfx::resources::buffer_desc::GfxBufferDesc;
use ember_gfx::resources::factory::GfxResourceFactory;
use ember_gfx::resources::image_desc::GfxImageDesc;

use crate::resource_handle::{TgAccessHandle, TgResourceHandle};
use crate::resource_state::{TgAccessDesc, TgAccessKind};

/// 资源的底层句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TgNativeResource {
    Buffer {
        buffer: vk::Buffer,
    },
    Image {
        image: vk::Image,
        view: vk::ImageView,
        aspect: vk::ImageAspectFlags,
    },
    /// swapchain 图像的占位符，每次 build 执行时才解析为具体的图像
    SwapchainImage,
}

/// 用于 build 内去重的键
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TgNativeKey {
    Buffer(vk::Buffer),
    Image(vk::Image),
    Swapchain,
}

// new & init
impl TgNativeResource {
    #[inline]
    pub fn buffer(buffer: vk::Buffer) -> Self {
        Self::Buffer { buffer }
    }

    /// 按格式推断 aspect
    #[inline]
    pub fn image(image: vk::Image, view: vk::ImageView, format: vk::Format) -> Self {
        Self::Image {
            image,
            view,
            aspect: GfxImageDesc::infer_aspect(format),
        }
    }
}

// getters
impl TgNativeResource {
    #[inline]
    pub fn key(&self) -> TgNativeKey {
        match *self {
            Self::Buffer { buffer } => TgNativeKey::Buffer(buffer),
            Self::Image { image, .. } => TgNativeKey::Image(image),
            Self::SwapchainImage => TgNativeKey::Swapchain,
        }
    }

    #[inline]
    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Buffer { .. })
    }

    /// 解析出图像和默认视图，`swapchain` 为本次 build 获取到的 swapchain 图像
    ///
    /// # Panics
    /// buffer，或者 swapchain 占位符尚未解析
    pub fn resolve_image(&self, swapchain: Option<(vk::Image, vk::ImageView)>) -> (vk::Image, vk::ImageView) {
        match *self {
            Self::Image { image, view, .. } => (image, view),
            Self::SwapchainImage => {
                swapchain.unwrap_or_else(|| panic!("swapchain image used before it was acquired for this build"))
            }
            Self::Buffer { buffer } => panic!("unrecognized access payload: buffer {buffer:?} used as an image"),
        }
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        match *self {
            Self::Image { aspect, .. } => aspect,
            Self::SwapchainImage => vk::ImageAspectFlags::COLOR,
            Self::Buffer { .. } => vk::ImageAspectFlags::empty(),
        }
    }
}

/// 创建资源的描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TgResourceDesc {
    Buffer(GfxBufferDesc),
    Image(GfxImageDesc),
}

impl From<GfxBufferDesc> for TgResourceDesc {
    fn from(desc: GfxBufferDesc) -> Self {
        Self::Buffer(desc)
    }
}

impl From<GfxImageDesc> for TgResourceDesc {
    fn from(desc: GfxImageDesc) -> Self {
        Self::Image(desc)
    }
}

impl TgResourceDesc {
    #[inline]
    pub fn name(&self) -> &str {
        match self {
            Self::Buffer(desc) => &desc.name,
            Self::Image(desc) => &desc.name,
        }
    }

    /// 通过 renderer 分配底层资源
    pub(crate) fn allocate(&self, factory: &mut dyn GfxResourceFactory) -> TgNativeResource {
        match self {
            Self::Buffer(desc) => TgNativeResource::buffer(factory.make_buffer(desc)),
            Self::Image(desc) => {
                let (image, view) = factory.make_image(desc);
                TgNativeResource::Image {
                    image,
                    view,
                    aspect: desc.aspect(),
                }
            }
        }
    }
}

/// 把底层资源交还给 renderer 延迟销毁
pub(crate) fn retire_native(native: TgNativeResource, factory: &mut dyn GfxResourceFactory, timeline_value: u64) {
    match native {
        TgNativeResource::Buffer { buffer } => factory.retire_buffer(buffer, timeline_value),
        TgNativeResource::Image { image, view, .. } => factory.retire_image(image, view, timeline_value),
        TgNativeResource::SwapchainImage => {}
    }
}

/// 新分配资源的初始化内容
#[derive(Clone, Copy)]
pub enum TgClearValue {
    Color(vk::ClearColorValue),
    DepthStencil(vk::ClearDepthStencilValue),
    /// buffer 按 u32 填充
    Fill(u32),
}

impl fmt::Debug for TgClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // union 只能按 float32 打印
            Self::Color(color) => write!(f, "Color({:?})", unsafe { color.float32 }),
            Self::DepthStencil(value) => write!(f, "DepthStencil({}, {})", value.depth, value.stencil),
            Self::Fill(data) => write!(f, "Fill({data:#x})"),
        }
    }
}

/// 资源的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TgResourceOrigin {
    /// 外部导入，graph 不负责销毁
    Imported,
    /// 本次 build 分配，执行后交还 renderer
    Transient,
    /// 跨 build 保留，键为 `(task 名, 资源名)` 的哈希
    Persistent { key: u64 },
}

/// 一次 build 中的资源条目
#[derive(Clone, Debug)]
pub struct TgResource {
    /// 调试名称
    pub name: String,
    pub native: TgNativeResource,
    pub origin: TgResourceOrigin,
    /// 进入本次 build 时图像所处的 layout
    pub initial_layout: vk::ImageLayout,
    /// 只有新分配的资源才需要 clear
    pub pending_clear: Option<TgClearValue>,

    /// 访问链的头和尾
    pub(crate) head: Option<TgAccessHandle>,
    pub(crate) tail: Option<TgAccessHandle>,

    /// 最后一次读/写它的 group，`None` 表示尚未被调度
    pub(crate) last_read_group: Option<usize>,
    pub(crate) last_write_group: Option<usize>,
}

// new & init
impl TgResource {
    pub fn new(name: impl Into<String>, native: TgNativeResource, origin: TgResourceOrigin) -> Self {
        Self {
            name: name.into(),
            native,
            origin,
            initial_layout: vk::ImageLayout::UNDEFINED,
            pending_clear: None,
            head: None,
            tail: None,
            last_read_group: None,
            last_write_group: None,
        }
    }

    #[inline]
    pub fn with_initial_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.initial_layout = layout;
        self
    }

    #[inline]
    pub fn with_clear(mut self, clear: Option<TgClearValue>) -> Self {
        self.pending_clear = clear;
        self
    }
}

// getters
impl TgResource {
    #[inline]
    pub fn last_read_group(&self) -> Option<usize> {
        self.last_read_group
    }

    #[inline]
    pub fn last_write_group(&self) -> Option<usize> {
        self.last_write_group
    }
}

/// 一次声明式访问，创建后不可变
#[derive(Clone, Copy, Debug)]
pub struct TgAccess {
    pub resource: TgResourceHandle,
    /// 同一资源上按声明顺序的前一次访问
    pub prev_access: Option<TgAccessHandle>,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    /// buffer 恒为 `UNDEFINED`
    pub layout: vk::ImageLayout,
    pub view_override: Option<vk::ImageView>,
    pub kind: TgAccessKind,
}

impl TgAccess {
    #[inline]
    pub fn desc(&self) -> TgAccessDesc {
        TgAccessDesc::new(self.stage, self.access, self.layout)
    }
}
