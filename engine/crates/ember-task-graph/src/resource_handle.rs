//! Task graph 句柄定义
//!
//! 所有句柄都是 build 级 arena（`SlotMap`）中的代际索引。每次 build 结束时 arena 会被清空，
//! 旧句柄的版本号随之失效，再次使用会在查询时被发现。

use slotmap::new_key_type;

new_key_type! {
    /// 一次 build 内的资源句柄
    pub struct TgResourceHandle;

    /// 一次资源访问的句柄，也就是访问链上的一个节点
    pub struct TgAccessHandle;
}
