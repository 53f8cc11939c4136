use ash::vk;

use crate::resources::buffer_desc::GfxBufferDesc;
use crate::resources::image_desc::GfxImageDesc;

/// 资源分配器（renderer 一侧实现）
///
/// `retire_*` 是延迟销毁：只有当共享 timeline semaphore 达到 `timeline_value` 之后，
/// 实现方才可以真正释放资源。
pub trait GfxResourceFactory {
    fn make_buffer(&mut self, desc: &GfxBufferDesc) -> vk::Buffer;

    /// 返回图像以及默认视图
    fn make_image(&mut self, desc: &GfxImageDesc) -> (vk::Image, vk::ImageView);

    fn retire_buffer(&mut self, buffer: vk::Buffer, timeline_value: u64);

    fn retire_image(&mut self, image: vk::Image, view: vk::ImageView, timeline_value: u64);
}
