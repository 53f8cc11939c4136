//! Ember GFX 层
//!
//! 这里只放"GPU 边界"上的东西：
//!
//! - `commands`: barrier 构建器、semaphore 描述、提交描述，以及命令录制作用域 trait
//! - `queue`: 提交队列 trait
//! - `resources`: buffer / image 的创建描述和资源分配 trait
//!
//! 真正的 Vulkan 对象由上层（renderer）实现这些 trait 后提供。

pub mod commands;
pub mod queue;
pub mod resources;
