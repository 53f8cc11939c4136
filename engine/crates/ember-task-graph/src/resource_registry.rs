use std::collections::HashMap;

use slotmap::SlotMap;

use crate::resource::{TgAccess, TgNativeKey, TgNativeResource, TgResource, TgResourceOrigin};
use crate::resource_handle::{TgAccessHandle, TgResourceHandle};
use crate::resource_state::{TgAccessDesc, TgImportInfo};
use ash::vk;

/// 资源注册表 + 访问账本
///
/// 一次 build 内所有的资源和访问都存放在这里。build 结束时整体 `clear`，
/// 之前发出的句柄随之失效。
#[derive(Clone, Default)]
pub struct TgResourceRegistry {
    resources: SlotMap<TgResourceHandle, TgResource>,
    accesses: SlotMap<TgAccessHandle, TgAccess>,
    /// 按底层句柄去重
    native_lookup: HashMap<TgNativeKey, TgResourceHandle>,
}

// new & init
impl TgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

// register
impl TgResourceRegistry {
    /// 注册资源并创建访问链头
    ///
    /// 同一个底层句柄在一次 build 内只会注册一次；重复注册直接返回已有的链头，
    /// 第二个返回值表示是否为新注册。
    pub fn register(&mut self, resource: TgResource, head: TgAccessDesc) -> (TgAccessHandle, bool) {
        let key = resource.native.key();
        if let Some(&existing) = self.native_lookup.get(&key) {
            let existing_resource = &self.resources[existing];
            log::debug!("resource \"{}\" already imported as \"{}\"", resource.name, existing_resource.name);
            let head = existing_resource.head.unwrap_or_else(|| {
                panic!("resource \"{}\" registered without an access chain", existing_resource.name)
            });
            return (head, false);
        }

        let handle = self.resources.insert(resource);
        self.native_lookup.insert(key, handle);
        let head = self.push_access(handle, head, None);
        (head, true)
    }

    /// 导入外部资源，`info` 为资源当前所处的状态
    pub fn import(
        &mut self,
        name: impl Into<String>,
        native: TgNativeResource,
        info: TgImportInfo,
    ) -> (TgAccessHandle, bool) {
        let resource =
            TgResource::new(name, native, TgResourceOrigin::Imported).with_initial_layout(info.layout);
        self.register(resource, info)
    }

    /// 在 `prev` 所属资源的访问链尾部追加一次访问
    ///
    /// 链总是按声明顺序延伸：即使 `prev` 不是链尾，新访问的 `prev_access` 也指向当前链尾。
    pub fn append_access(
        &mut self,
        prev: TgAccessHandle,
        desc: TgAccessDesc,
        view_override: Option<vk::ImageView>,
    ) -> TgAccessHandle {
        let resource = self.access(prev).resource;
        let tail = self.resources[resource].tail;
        if tail != Some(prev) {
            log::debug!(
                "access on \"{}\" chained to the latest access instead of a stale one",
                self.resources[resource].name
            );
        }
        self.push_access(resource, desc, view_override)
    }

    fn push_access(
        &mut self,
        resource: TgResourceHandle,
        desc: TgAccessDesc,
        view_override: Option<vk::ImageView>,
    ) -> TgAccessHandle {
        let entry = &self.resources[resource];
        let layout = if entry.native.is_image() { desc.layout } else { vk::ImageLayout::UNDEFINED };
        let access = TgAccess {
            resource,
            prev_access: entry.tail,
            stage: desc.stage,
            access: desc.access,
            layout,
            view_override,
            kind: desc.kind(),
        };

        let handle = self.accesses.insert(access);
        let entry = &mut self.resources[resource];
        entry.head.get_or_insert(handle);
        entry.tail = Some(handle);
        handle
    }

    /// 丢弃本次 build 的全部状态
    pub fn clear(&mut self) {
        self.resources.clear();
        self.accesses.clear();
        self.native_lookup.clear();
    }
}

// getter & iter
impl TgResourceRegistry {
    /// 获取访问
    ///
    /// # Panics
    /// 句柄来自已经结束的 build
    #[inline]
    pub fn access(&self, handle: TgAccessHandle) -> &TgAccess {
        self.accesses
            .get(handle)
            .unwrap_or_else(|| panic!("stale access handle {handle:?}: it belongs to a finished build"))
    }

    #[inline]
    pub fn resource(&self, handle: TgResourceHandle) -> &TgResource {
        self.resources
            .get(handle)
            .unwrap_or_else(|| panic!("stale resource handle {handle:?}: it belongs to a finished build"))
    }

    #[inline]
    pub fn resource_mut(&mut self, handle: TgResourceHandle) -> &mut TgResource {
        self.resources
            .get_mut(handle)
            .unwrap_or_else(|| panic!("stale resource handle {handle:?}: it belongs to a finished build"))
    }

    /// 访问所属的资源
    #[inline]
    pub fn resource_of(&self, access: TgAccessHandle) -> &TgResource {
        self.resource(self.access(access).resource)
    }

    #[inline]
    pub fn find_native(&self, key: TgNativeKey) -> Option<TgResourceHandle> {
        self.native_lookup.get(&key).copied()
    }

    /// 资源的完整访问历史（按声明顺序）
    pub fn history(&self, resource: TgResourceHandle) -> Vec<TgAccessHandle> {
        let mut chain = Vec::new();
        let mut cursor = self.resource(resource).tail;
        while let Some(handle) = cursor {
            chain.push(handle);
            cursor = self.accesses[handle].prev_access;
        }
        chain.reverse();
        chain
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn iter_resources(&self) -> impl Iterator<Item = (TgResourceHandle, &TgResource)> {
        self.resources.iter()
    }
}
