use ash::prelude::VkResult;

use crate::commands::command_scope::GfxCommandScope;
use crate::commands::submit_info::GfxSubmitInfo;

/// 提交队列
///
/// 负责创建命令录制作用域，并把一批作用域连同 semaphore 的 wait/signal 一起提交。
/// 只有一个执行队列，提交顺序即执行顺序。
pub trait GfxSubmitQueue {
    /// 创建一个已经 begin 的录制作用域
    fn begin_scope(&mut self, name: &str) -> Box<dyn GfxCommandScope>;

    /// 按顺序提交已经 end 的作用域
    fn submit(&mut self, scopes: Vec<Box<dyn GfxCommandScope>>, submit_info: GfxSubmitInfo) -> VkResult<()>;
}
