//! 资源访问状态
//!
//! 封装 Vulkan 的 pipeline stage、access mask 和 image layout，
//! 并给出各类用途的标准组合。

use ash::vk;

/// 访问的读写分类，由 stage/access mask 推断
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TgAccessKind {
    /// stage 和 access 都为空：只登记资源，不参与同步
    ImportOnly,
    Read,
    Write,
    ReadWrite,
}

impl TgAccessKind {
    /// 写操作的 access flags
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::HOST_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw()
            | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
    );

    pub fn classify(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        if stage.is_empty() && access.is_empty() {
            return Self::ImportOnly;
        }

        let writes = access.intersects(Self::WRITE_ACCESS);
        // 只有 stage 没有 access 的情况视为执行依赖，按读处理
        let reads = !(access & !Self::WRITE_ACCESS).is_empty() || access.is_empty();
        match (reads, writes) {
            (true, true) => Self::ReadWrite,
            (false, true) => Self::Write,
            _ => Self::Read,
        }
    }

    #[inline]
    pub fn is_import_only(self) -> bool {
        self == Self::ImportOnly
    }

    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    #[inline]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }
}

/// storage 资源的读写模式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TgAccessMode {
    Read,
    Write,
    ReadWrite,
}

impl TgAccessMode {
    #[inline]
    fn storage_access(self) -> vk::AccessFlags2 {
        match self {
            Self::Read => vk::AccessFlags2::SHADER_STORAGE_READ,
            Self::Write => vk::AccessFlags2::SHADER_STORAGE_WRITE,
            Self::ReadWrite => vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        }
    }
}

/// 一次访问请求的状态
///
/// buffer 没有 layout，对应字段保持 `UNDEFINED`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TgAccessDesc {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl Default for TgAccessDesc {
    fn default() -> Self {
        Self::IMPORT_ONLY
    }
}

// new & 常量定义
impl TgAccessDesc {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    /// 只登记，不同步
    pub const IMPORT_ONLY: Self =
        Self::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 颜色附件读写
    pub const COLOR_ATTACHMENT: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::ATTACHMENT_OPTIMAL,
    );

    /// 深度附件读写
    pub const DEPTH_ATTACHMENT: Self = Self::new(
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::ATTACHMENT_OPTIMAL,
    );

    /// 传输源
    pub const TRANSFER_SRC: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );

    /// 传输目标
    pub const TRANSFER_DST: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 着色器采样
    #[inline]
    pub const fn sampled(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_SAMPLED_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// storage image
    #[inline]
    pub fn storage_image(stage: vk::PipelineStageFlags2, mode: TgAccessMode) -> Self {
        Self::new(stage, mode.storage_access(), vk::ImageLayout::GENERAL)
    }

    /// storage buffer
    #[inline]
    pub fn storage_buffer(stage: vk::PipelineStageFlags2, mode: TgAccessMode) -> Self {
        Self::new(stage, mode.storage_access(), vk::ImageLayout::UNDEFINED)
    }

    /// 去掉 layout，用于 buffer
    #[inline]
    pub fn without_layout(mut self) -> Self {
        self.layout = vk::ImageLayout::UNDEFINED;
        self
    }

    #[inline]
    pub fn kind(&self) -> TgAccessKind {
        TgAccessKind::classify(self.stage, self.access)
    }
}

/// 导入资源时，资源已经处于的状态
pub type TgImportInfo = TgAccessDesc;

/// 调用方对标准访问状态的覆盖
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TgAccessOverrides {
    pub stage: Option<vk::PipelineStageFlags2>,
    pub access: Option<vk::AccessFlags2>,
    pub layout: Option<vk::ImageLayout>,
    /// 图像专用：替换默认 image view
    pub view: Option<vk::ImageView>,
}

impl TgAccessOverrides {
    pub const NONE: Self = Self {
        stage: None,
        access: None,
        layout: None,
        view: None,
    };

    #[inline]
    pub fn stage(mut self, stage: vk::PipelineStageFlags2) -> Self {
        self.stage = Some(stage);
        self
    }

    #[inline]
    pub fn access(mut self, access: vk::AccessFlags2) -> Self {
        self.access = Some(access);
        self
    }

    #[inline]
    pub fn layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    #[inline]
    pub fn view(mut self, view: vk::ImageView) -> Self {
        self.view = Some(view);
        self
    }

    #[inline]
    pub fn apply(&self, desc: TgAccessDesc) -> TgAccessDesc {
        TgAccessDesc {
            stage: self.stage.unwrap_or(desc.stage),
            access: self.access.unwrap_or(desc.access),
            layout: self.layout.unwrap_or(desc.layout),
        }
    }
}
