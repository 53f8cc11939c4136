//! 跨 build 保留的资源
//!
//! 以 `(task 名, 资源名)` 的哈希为键。命中时复用上一次 build 的底层句柄和最终 layout，
//! 未命中时向 renderer 申请新的资源。

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use ash::vk;
use ember_gfx::resources::factory::GfxResourceFactory;

use crate::resource::{TgNativeResource, TgResourceDesc, retire_native};

/// 缓存中的一项
#[derive(Clone, Debug)]
pub struct TgPersistentEntry {
    pub task_name: String,
    pub debug_name: String,
    pub desc: TgResourceDesc,
    pub native: TgNativeResource,
    /// 上一次 build 结束时的 layout
    pub layout: vk::ImageLayout,
    /// 分配之后还没有提交过 clear
    pub needs_clear: bool,
}

/// `get_or_create` 的结果
#[derive(Clone, Copy, Debug)]
pub struct TgPersistentLookup {
    pub native: TgNativeResource,
    pub layout: vk::ImageLayout,
    /// 新分配的资源，或者上一次 clear 没有提交出去
    pub needs_clear: bool,
}

#[derive(Default)]
pub struct TgPersistentCache {
    entries: HashMap<u64, TgPersistentEntry>,
}

impl TgPersistentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 缓存键
    pub fn key(task_name: &str, debug_name: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        (task_name, debug_name).hash(&mut hasher);
        hasher.finish()
    }

    /// 查找或者创建
    ///
    /// 描述发生变化时旧资源会交还给 renderer，在 `timeline_value` 之后销毁。
    ///
    /// # Panics
    /// 键相同但 task 名或资源名不同（哈希冲突）
    pub fn get_or_create(
        &mut self,
        key: u64,
        task_name: &str,
        desc: &TgResourceDesc,
        factory: &mut dyn GfxResourceFactory,
        timeline_value: u64,
    ) -> TgPersistentLookup {
        if let Some(entry) = self.entries.get_mut(&key) {
            assert!(
                entry.task_name == task_name && entry.debug_name == desc.name(),
                "persistent resource hash collision: \"{}\" of task \"{}\" and \"{}\" of task \"{}\" share key {key:#x}",
                desc.name(),
                task_name,
                entry.debug_name,
                entry.task_name,
            );

            if entry.desc == *desc {
                log::trace!("persistent resource \"{}\" of task \"{}\" reused", entry.debug_name, task_name);
                return TgPersistentLookup {
                    native: entry.native,
                    layout: entry.layout,
                    needs_clear: entry.needs_clear,
                };
            }

            log::info!(
                "persistent resource \"{}\" of task \"{}\" changed its descriptor, reallocating",
                entry.debug_name,
                task_name
            );
            retire_native(entry.native, factory, timeline_value);
            entry.native = desc.allocate(factory);
            entry.desc = desc.clone();
            entry.layout = vk::ImageLayout::UNDEFINED;
            entry.needs_clear = true;
            return TgPersistentLookup {
                native: entry.native,
                layout: entry.layout,
                needs_clear: true,
            };
        }

        log::debug!("persistent resource \"{}\" of task \"{}\" allocated", desc.name(), task_name);
        let native = desc.allocate(factory);
        self.entries.insert(
            key,
            TgPersistentEntry {
                task_name: task_name.to_string(),
                debug_name: desc.name().to_string(),
                desc: desc.clone(),
                native,
                layout: vk::ImageLayout::UNDEFINED,
                needs_clear: true,
            },
        );
        TgPersistentLookup {
            native,
            layout: vk::ImageLayout::UNDEFINED,
            needs_clear: true,
        }
    }

    /// 记录 build 结束时的 layout
    pub fn store_layout(&mut self, key: u64, layout: vk::ImageLayout) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.layout = layout;
        }
    }

    /// 初始化已经提交，之后的 build 不再 clear
    pub fn mark_cleared(&mut self, key: u64) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.needs_clear = false;
        }
    }

    /// 全部交还给 renderer
    pub fn release_all(&mut self, factory: &mut dyn GfxResourceFactory, timeline_value: u64) {
        for (_, entry) in self.entries.drain() {
            log::debug!("persistent resource \"{}\" of task \"{}\" released", entry.debug_name, entry.task_name);
            retire_native(entry.native, factory, timeline_value);
        }
    }

    #[inline]
    pub fn get(&self, key: u64) -> Option<&TgPersistentEntry> {
        self.entries.get(&key)
    }

    #[inline]
    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
