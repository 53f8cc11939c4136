use ash::vk;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};

/// 一段命令录制作用域
///
/// 对应一个已经 begin 的 command buffer，由 `GfxSubmitQueue::begin_scope` 创建，
/// `end` 之后交还给 queue 提交。实现方负责真正的 `vkCmd*` 调用。
pub trait GfxCommandScope {
    /// 调试名称（也是 debug label）
    fn name(&self) -> &str;

    /// 底层 command buffer，mock 实现可以返回 null
    fn vk_handle(&self) -> vk::CommandBuffer;

    fn image_memory_barrier(&mut self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]);

    fn buffer_memory_barrier(&mut self, dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]);

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        range: vk::ImageSubresourceRange,
    );

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        value: &vk::ClearDepthStencilValue,
        range: vk::ImageSubresourceRange,
    );

    fn fill_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32);

    /// 结束录制
    fn end(&mut self);
}
