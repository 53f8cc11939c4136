//! Task 的 setup 阶段
//!
//! 每个 helper 都是 `(前一次访问, 覆盖) -> 新访问`：按用途给出标准的 stage / access / layout，
//! 在资源的访问链尾部追加一次访问，并记入当前 task。

use ash::vk;
use ember_gfx::resources::factory::GfxResourceFactory;

use crate::persistent_cache::TgPersistentCache;
use crate::resource::{TgClearValue, TgNativeResource, TgResource, TgResourceDesc, TgResourceOrigin};
use crate::resource_handle::TgAccessHandle;
use crate::resource_registry::TgResourceRegistry;
use crate::resource_state::{TgAccessDesc, TgAccessMode, TgAccessOverrides, TgImportInfo};
use crate::task::TgTaskKind;

/// helper 接受的资源类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TgPayload {
    Image,
    Buffer,
    Any,
}

/// 在 `add_*_pass` 的 setup 中使用
pub struct TgTaskBuilder<'b> {
    task_name: &'b str,
    kind: TgTaskKind,

    registry: &'b mut TgResourceRegistry,
    cache: &'b mut TgPersistentCache,
    factory: &'b mut dyn GfxResourceFactory,
    /// 交还旧的持久资源时使用
    timeline_value: u64,

    pub(crate) accesses: Vec<TgAccessHandle>,
    pub(crate) stage_mask: vk::PipelineStageFlags2,
}

// new & init
impl<'b> TgTaskBuilder<'b> {
    pub(crate) fn new(
        task_name: &'b str,
        kind: TgTaskKind,
        registry: &'b mut TgResourceRegistry,
        cache: &'b mut TgPersistentCache,
        factory: &'b mut dyn GfxResourceFactory,
        timeline_value: u64,
    ) -> Self {
        Self {
            task_name,
            kind,
            registry,
            cache,
            factory,
            timeline_value,
            accesses: Vec::new(),
            stage_mask: vk::PipelineStageFlags2::empty(),
        }
    }
}

// 资源
impl TgTaskBuilder<'_> {
    /// 导入外部资源
    ///
    /// 同一个底层句柄重复导入时返回已有的链头，不会再次记入 task。
    pub fn import_resource(
        &mut self,
        name: impl Into<String>,
        native: TgNativeResource,
        info: TgImportInfo,
    ) -> TgAccessHandle {
        let (head, fresh) = self.registry.import(name, native, info);
        if fresh {
            self.record(head);
        }
        head
    }

    /// 向 renderer 申请资源并导入
    ///
    /// `persistent` 的资源以 `(task 名, 资源名)` 为键跨 build 保留；`clear` 只作用于新分配的资源。
    ///
    /// # Panics
    /// clear 的类型与资源类型不匹配；持久资源的键发生冲突；同一个持久资源在一次 build 中以不同的描述请求
    pub fn create_resource(
        &mut self,
        desc: impl Into<TgResourceDesc>,
        persistent: bool,
        clear: Option<TgClearValue>,
    ) -> TgAccessHandle {
        let desc = desc.into();
        match (&desc, clear) {
            (TgResourceDesc::Image(_), Some(TgClearValue::Fill(_)))
            | (TgResourceDesc::Buffer(_), Some(TgClearValue::Color(_) | TgClearValue::DepthStencil(_))) => panic!(
                "clear value {:?} does not match resource \"{}\" in task \"{}\"",
                clear,
                desc.name(),
                self.task_name
            ),
            _ => {}
        }

        let resource = if persistent {
            let key = TgPersistentCache::key(self.task_name, desc.name());
            if let Some(entry) = self.cache.get(key) {
                // 本次 build 仍在使用旧的底层资源，不能在这里交还
                assert!(
                    entry.desc == desc || self.registry.find_native(entry.native.key()).is_none(),
                    "persistent resource \"{}\" of task \"{}\" requested with two descriptors in one build",
                    desc.name(),
                    self.task_name
                );
            }
            let lookup = self.cache.get_or_create(key, self.task_name, &desc, self.factory, self.timeline_value);
            TgResource::new(desc.name(), lookup.native, TgResourceOrigin::Persistent { key })
                .with_initial_layout(lookup.layout)
                .with_clear(clear.filter(|_| lookup.needs_clear))
        } else {
            let native = desc.allocate(self.factory);
            TgResource::new(desc.name(), native, TgResourceOrigin::Transient).with_clear(clear)
        };

        let (head, fresh) = self.registry.register(resource, TgAccessDesc::IMPORT_ONLY);
        if fresh {
            self.record(head);
        }
        head
    }
}

// image helpers
impl TgTaskBuilder<'_> {
    pub fn sample_texture(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::sampled(self.kind.shader_stage());
        self.append(prev, desc, overrides, TgPayload::Image, "sample_texture")
    }

    pub fn read_storage_image(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::storage_image(self.kind.shader_stage(), TgAccessMode::Read);
        self.append(prev, desc, overrides, TgPayload::Image, "read_storage_image")
    }

    pub fn write_storage_image(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::storage_image(self.kind.shader_stage(), TgAccessMode::Write);
        self.append(prev, desc, overrides, TgPayload::Image, "write_storage_image")
    }

    pub fn read_write_storage_image(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::storage_image(self.kind.shader_stage(), TgAccessMode::ReadWrite);
        self.append(prev, desc, overrides, TgPayload::Image, "read_write_storage_image")
    }

    /// 颜色附件，读写
    pub fn access_color(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        self.append(prev, TgAccessDesc::COLOR_ATTACHMENT, overrides, TgPayload::Image, "access_color")
    }

    /// 深度附件，读写
    pub fn access_depth(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        self.append(prev, TgAccessDesc::DEPTH_ATTACHMENT, overrides, TgPayload::Image, "access_depth")
    }
}

// buffer helpers
impl TgTaskBuilder<'_> {
    pub fn read_storage_buffer(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::storage_buffer(self.kind.shader_stage(), TgAccessMode::Read);
        self.append(prev, desc, overrides, TgPayload::Buffer, "read_storage_buffer")
    }

    pub fn write_storage_buffer(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::storage_buffer(self.kind.shader_stage(), TgAccessMode::Write);
        self.append(prev, desc, overrides, TgPayload::Buffer, "write_storage_buffer")
    }

    pub fn read_write_storage_buffer(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        let desc = TgAccessDesc::storage_buffer(self.kind.shader_stage(), TgAccessMode::ReadWrite);
        self.append(prev, desc, overrides, TgPayload::Buffer, "read_write_storage_buffer")
    }
}

// 通用
impl TgTaskBuilder<'_> {
    /// copy / blit 的源，image 和 buffer 均可
    pub fn transfer_src(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        self.append(prev, TgAccessDesc::TRANSFER_SRC, overrides, TgPayload::Any, "transfer_src")
    }

    /// copy / blit 的目标，image 和 buffer 均可
    pub fn transfer_dst(&mut self, prev: TgAccessHandle, overrides: TgAccessOverrides) -> TgAccessHandle {
        self.append(prev, TgAccessDesc::TRANSFER_DST, overrides, TgPayload::Any, "transfer_dst")
    }

    /// 自定义 stage / access / layout
    pub fn access(
        &mut self,
        prev: TgAccessHandle,
        desc: TgAccessDesc,
        overrides: TgAccessOverrides,
    ) -> TgAccessHandle {
        self.append(prev, desc, overrides, TgPayload::Any, "access")
    }

    #[inline]
    pub fn task_name(&self) -> &str {
        self.task_name
    }

    #[inline]
    pub fn kind(&self) -> TgTaskKind {
        self.kind
    }
}

impl TgTaskBuilder<'_> {
    fn append(
        &mut self,
        prev: TgAccessHandle,
        desc: TgAccessDesc,
        overrides: TgAccessOverrides,
        payload: TgPayload,
        helper: &str,
    ) -> TgAccessHandle {
        let resource = self.registry.resource_of(prev);
        let is_image = resource.native.is_image();
        let mismatch = match payload {
            TgPayload::Image => !is_image,
            TgPayload::Buffer => is_image,
            TgPayload::Any => false,
        };
        if mismatch {
            panic!(
                "unrecognized access payload: `{helper}` on {} \"{}\" in task \"{}\"",
                if is_image { "image" } else { "buffer" },
                resource.name,
                self.task_name
            );
        }

        let view = if is_image {
            overrides.view
        } else {
            if overrides.view.is_some() {
                log::warn!("view override on buffer \"{}\" in task \"{}\" ignored", resource.name, self.task_name);
            }
            None
        };

        let desc = overrides.apply(desc);
        if is_image && !desc.kind().is_import_only() {
            assert!(
                !matches!(desc.layout, vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED),
                "`{helper}` on image \"{}\" in task \"{}\" requests {:?}, which is not a valid target layout",
                resource.name,
                self.task_name,
                desc.layout
            );
        }

        let handle = self.registry.append_access(prev, desc, view);
        self.record(handle);
        handle
    }

    fn record(&mut self, handle: TgAccessHandle) {
        self.stage_mask |= self.registry.access(handle).stage;
        self.accesses.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use ember_gfx::resources::buffer_desc::GfxBufferDesc;
    use ember_gfx::resources::image_desc::GfxImageDesc;

    use crate::resource_state::TgAccessKind;

    #[derive(Default)]
    struct NullFactory {
        next: u64,
    }

    impl GfxResourceFactory for NullFactory {
        fn make_buffer(&mut self, _desc: &GfxBufferDesc) -> vk::Buffer {
            self.next += 1;
            vk::Buffer::from_raw(self.next)
        }

        fn make_image(&mut self, _desc: &GfxImageDesc) -> (vk::Image, vk::ImageView) {
            self.next += 1;
            (vk::Image::from_raw(self.next), vk::ImageView::from_raw(self.next))
        }

        fn retire_buffer(&mut self, _buffer: vk::Buffer, _timeline_value: u64) {}

        fn retire_image(&mut self, _image: vk::Image, _view: vk::ImageView, _timeline_value: u64) {}
    }

    struct Fixture {
        registry: TgResourceRegistry,
        cache: TgPersistentCache,
        factory: NullFactory,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: TgResourceRegistry::new(),
                cache: TgPersistentCache::new(),
                factory: NullFactory::default(),
            }
        }

        fn builder(&mut self, kind: TgTaskKind) -> TgTaskBuilder<'_> {
            TgTaskBuilder::new("task", kind, &mut self.registry, &mut self.cache, &mut self.factory, 0)
        }
    }

    fn image() -> TgNativeResource {
        TgNativeResource::image(vk::Image::from_raw(100), vk::ImageView::from_raw(101), vk::Format::R8G8B8A8_UNORM)
    }

    #[test]
    fn test_helpers_resolve_task_stage() {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder(TgTaskKind::Graphics);
        let head = builder.import_resource("albedo", image(), TgImportInfo::IMPORT_ONLY);
        let sampled = builder.sample_texture(head, TgAccessOverrides::NONE);

        let stage_mask = builder.stage_mask;
        let accesses = builder.accesses.clone();
        let access = *fixture.registry.access(sampled);
        assert_eq!(access.stage, TgTaskKind::Graphics.shader_stage());
        assert_eq!(access.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(access.kind, TgAccessKind::Read);
        assert_eq!(stage_mask, TgTaskKind::Graphics.shader_stage());
        assert_eq!(accesses, vec![head, sampled]);
    }

    #[test]
    fn test_overrides_apply_to_helpers() {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder(TgTaskKind::Compute);
        let head = builder.import_resource("albedo", image(), TgImportInfo::IMPORT_ONLY);
        let custom_view = vk::ImageView::from_raw(555);
        let access = builder.read_storage_image(
            head,
            TgAccessOverrides::NONE.stage(vk::PipelineStageFlags2::FRAGMENT_SHADER).view(custom_view),
        );

        let access = *fixture.registry.access(access);
        assert_eq!(access.stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(access.view_override, Some(custom_view));
        assert_eq!(access.layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_duplicate_import_not_recorded_twice() {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder(TgTaskKind::Compute);
        let a = builder.import_resource("albedo", image(), TgImportInfo::IMPORT_ONLY);
        let b = builder.import_resource("albedo-again", image(), TgImportInfo::IMPORT_ONLY);

        assert_eq!(a, b);
        assert_eq!(builder.accesses.len(), 1);
    }

    #[test]
    fn test_transfer_on_buffer_drops_layout() {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder(TgTaskKind::Compute);
        let head = builder.create_resource(GfxBufferDesc::storage("staging", 1024), false, None);
        let src = builder.transfer_src(head, TgAccessOverrides::NONE);

        assert_eq!(fixture.registry.access(src).layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(fixture.registry.access(src).kind, TgAccessKind::Read);
    }

    #[test]
    #[should_panic(expected = "unrecognized access payload")]
    fn test_image_helper_on_buffer_panics() {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder(TgTaskKind::Compute);
        let head = builder.create_resource(GfxBufferDesc::storage("particles", 1024), false, None);
        builder.sample_texture(head, TgAccessOverrides::NONE);
    }

    #[test]
    #[should_panic(expected = "does not match resource")]
    fn test_fill_clear_on_image_panics() {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder(TgTaskKind::Compute);
        let desc =
            GfxImageDesc::new_2d("target", 16, 16, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::STORAGE);
        builder.create_resource(desc, false, Some(TgClearValue::Fill(0)));
    }

    #[test]
    fn test_persistent_resource_reused_across_builders() {
        let mut fixture = Fixture::new();
        let desc = GfxImageDesc::new_2d(
            "colorTarget",
            64,
            64,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        );

        let first = {
            let mut builder = fixture.builder(TgTaskKind::Graphics);
            builder.create_resource(desc.clone(), true, None)
        };
        let first_native = fixture.registry.resource_of(first).native;
        fixture.registry.clear();

        let second = {
            let mut builder = fixture.builder(TgTaskKind::Graphics);
            builder.create_resource(desc, true, None)
        };
        assert_eq!(fixture.registry.resource_of(second).native, first_native);
        assert_eq!(fixture.factory.next, 1);
    }
}
