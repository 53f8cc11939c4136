use ash::vk;

/// 图像创建描述
///
/// 包含创建 `vk::Image` 以及默认 `vk::ImageView` 所需的信息。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxImageDesc {
    /// 调试名称
    pub name: String,
    /// 图像宽度
    pub width: u32,
    /// 图像高度
    pub height: u32,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    /// Mip 级别数
    pub mip_levels: u32,
    /// 数组层数
    pub array_layers: u32,
    /// 图像格式
    pub format: vk::Format,
    /// 图像用途
    pub usage: vk::ImageUsageFlags,
    /// 采样数
    pub samples: vk::SampleCountFlags,
    /// 图像类型
    pub image_type: vk::ImageType,
}

impl Default for GfxImageDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE,
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
        }
    }
}

// new & init
impl GfxImageDesc {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        Self::infer_aspect(self.format)
    }

    /// 从格式推断 aspect
    pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_aspect() {
        assert_eq!(GfxImageDesc::infer_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            GfxImageDesc::infer_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(GfxImageDesc::infer_aspect(vk::Format::R16G16B16A16_SFLOAT), vk::ImageAspectFlags::COLOR);
    }
}
