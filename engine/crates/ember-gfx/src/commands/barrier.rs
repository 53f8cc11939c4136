use ash::vk;

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// 便捷创建 image memory barrier 的结构体
#[derive(Clone, Copy, Debug)]
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: vk::REMAINING_ARRAY_LAYERS,
                },
                ..Default::default()
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'_> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn mask(self, mask: GfxBarrierMask) -> Self {
        self.src_mask(mask.src_stage, mask.src_access).dst_mask(mask.dst_stage, mask.dst_access)
    }

    /// builder
    /// 覆盖整个 mip 链和所有 array layer
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }

    #[inline]
    pub fn old_layout(&self) -> vk::ImageLayout {
        self.inner.old_layout
    }

    #[inline]
    pub fn new_layout(&self) -> vk::ImageLayout {
        self.inner.new_layout
    }

    #[inline]
    pub fn image_handle(&self) -> vk::Image {
        self.inner.image
    }

    #[inline]
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        self.inner.subresource_range
    }

    #[inline]
    pub fn barrier_mask(&self) -> GfxBarrierMask {
        GfxBarrierMask {
            src_stage: self.inner.src_stage_mask,
            dst_stage: self.inner.dst_stage_mask,
            src_access: self.inner.src_access_mask,
            dst_access: self.inner.dst_access_mask,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GfxBufferBarrier {
    inner: vk::BufferMemoryBarrier2<'static>,
}

impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            inner: vk::BufferMemoryBarrier2 {
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            },
        }
    }
}

impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::BufferMemoryBarrier2<'_> {
        &self.inner
    }

    #[inline]
    pub fn mask(mut self, mask: GfxBarrierMask) -> Self {
        self.inner.src_stage_mask = mask.src_stage;
        self.inner.dst_stage_mask = mask.dst_stage;
        self.inner.src_access_mask = mask.src_access;
        self.inner.dst_access_mask = mask.dst_access;
        self
    }

    #[inline]
    pub fn buffer(mut self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.inner.buffer = buffer;
        self.inner.offset = offset;
        self.inner.size = size;
        self
    }

    #[inline]
    pub fn buffer_handle(&self) -> vk::Buffer {
        self.inner.buffer
    }

    #[inline]
    pub fn barrier_mask(&self) -> GfxBarrierMask {
        GfxBarrierMask {
            src_stage: self.inner.src_stage_mask,
            dst_stage: self.inner.dst_stage_mask,
            src_access: self.inner.src_access_mask,
            dst_access: self.inner.dst_access_mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_image_barrier_builder() {
        let image = vk::Image::from_raw(7);
        let barrier = GfxImageBarrier::new()
            .image(image)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::ATTACHMENT_OPTIMAL)
            .src_mask(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE)
            .dst_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .image_aspect_flag(vk::ImageAspectFlags::COLOR);

        assert_eq!(barrier.image_handle(), image);
        assert_eq!(barrier.old_layout(), vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout(), vk::ImageLayout::ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.barrier_mask().dst_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.inner().src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.subresource_range().level_count, vk::REMAINING_MIP_LEVELS);
    }

    #[test]
    fn test_buffer_barrier_defaults_to_whole_size() {
        let barrier = GfxBufferBarrier::new().mask(GfxBarrierMask {
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_access: vk::AccessFlags2::SHADER_STORAGE_READ,
        });

        assert_eq!(barrier.inner().size, vk::WHOLE_SIZE);
        assert_eq!(barrier.barrier_mask().src_access, vk::AccessFlags2::TRANSFER_WRITE);
    }
}
