//! Ember 工具集
//!
//! 目前只提供日志初始化：运行时使用 `init_log`，测试使用 `init_test_log`。

pub mod init_log;

pub use init_log::{init_log, init_test_log};
