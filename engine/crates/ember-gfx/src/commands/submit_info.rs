use ash::vk;
use itertools::Itertools;

use crate::commands::semaphore::GfxSemaphoreInfo;

/// 一次 queue submit 的同步描述
///
/// 命令作用域本身由 `GfxSubmitQueue::submit` 单独传入，这里只记录 wait 和 signal。
#[derive(Clone, Debug, Default)]
pub struct GfxSubmitInfo {
    wait_infos: Vec<GfxSemaphoreInfo>,
    signal_infos: Vec<GfxSemaphoreInfo>,
}

impl GfxSubmitInfo {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn wait(mut self, info: GfxSemaphoreInfo) -> Self {
        self.wait_infos.push(info);
        self
    }

    #[inline]
    pub fn signal(mut self, info: GfxSemaphoreInfo) -> Self {
        self.signal_infos.push(info);
        self
    }

    #[inline]
    pub fn wait_infos(&self) -> &[GfxSemaphoreInfo] {
        &self.wait_infos
    }

    #[inline]
    pub fn signal_infos(&self) -> &[GfxSemaphoreInfo] {
        &self.signal_infos
    }

    /// 转换为 `vk::SubmitInfo2` 需要的数组，由调用者保证生命周期
    pub fn vk_wait_infos(&self) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
        self.wait_infos.iter().map(GfxSemaphoreInfo::to_vk).collect_vec()
    }

    pub fn vk_signal_infos(&self) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
        self.signal_infos.iter().map(GfxSemaphoreInfo::to_vk).collect_vec()
    }
}
