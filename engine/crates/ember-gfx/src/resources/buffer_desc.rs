use ash::vk;

/// 缓冲区创建描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferDesc {
    /// 调试名称
    pub name: String,
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    /// 缓冲区用途
    pub usage: vk::BufferUsageFlags,
}

// new & init
impl GfxBufferDesc {
    #[inline]
    pub fn new(name: impl Into<String>, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
        }
    }

    /// 默认用途：storage + transfer dst（clear 需要 fill_buffer）
    #[inline]
    pub fn storage(name: impl Into<String>, size: vk::DeviceSize) -> Self {
        Self::new(name, size, vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
    }
}
