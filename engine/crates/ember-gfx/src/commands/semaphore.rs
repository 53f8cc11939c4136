use ash::vk;

/// 一次 semaphore 的等待或者信号
///
/// 只是描述，不持有 semaphore 的所有权。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxSemaphoreInfo {
    /// Vulkan semaphore 原始句柄
    pub semaphore: vk::Semaphore,
    /// 等待或者信号的 pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Timeline semaphore 的值（binary semaphore 为 None）
    pub value: Option<u64>,
}

impl GfxSemaphoreInfo {
    /// binary semaphore
    #[inline]
    pub fn binary(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            stage,
            value: None,
        }
    }

    /// timeline semaphore
    #[inline]
    pub fn timeline(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: u64) -> Self {
        Self {
            semaphore,
            stage,
            value: Some(value),
        }
    }

    #[inline]
    pub fn is_timeline(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    pub fn to_vk(&self) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .stage_mask(self.stage)
            .value(self.value.unwrap_or_default())
    }
}
