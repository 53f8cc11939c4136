//! 测试用的 renderer / queue 替身，把所有调用记录到共享日志中

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use ember_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use ember_gfx::commands::command_scope::GfxCommandScope;
use ember_gfx::commands::semaphore::GfxSemaphoreInfo;
use ember_gfx::commands::submit_info::GfxSubmitInfo;
use ember_gfx::queue::GfxSubmitQueue;
use ember_gfx::resources::buffer_desc::GfxBufferDesc;
use ember_gfx::resources::factory::GfxResourceFactory;
use ember_gfx::resources::image_desc::GfxImageDesc;

pub const IMAGE_BASE: u64 = 0x1000;
pub const VIEW_BASE: u64 = 0x2000;
pub const BUFFER_BASE: u64 = 0x3000;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    BeginScope(String),
    /// `(image, old, new)`
    ImageBarriers {
        scope: String,
        barriers: Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)>,
    },
    BufferBarriers {
        scope: String,
        buffers: Vec<vk::Buffer>,
    },
    ClearColor {
        scope: String,
        image: vk::Image,
    },
    ClearDepthStencil {
        scope: String,
        image: vk::Image,
    },
    FillBuffer {
        scope: String,
        buffer: vk::Buffer,
        data: u32,
    },
    EndScope(String),
    Submit {
        scopes: Vec<String>,
        waits: Vec<GfxSemaphoreInfo>,
        signals: Vec<GfxSemaphoreInfo>,
    },
    /// task 自己写入的标记
    Work(String),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn submits(log: &EventLog) -> Vec<Event> {
    log.borrow().iter().filter(|event| matches!(event, Event::Submit { .. })).cloned().collect()
}

pub fn image_barriers(log: &EventLog) -> Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::ImageBarriers { barriers, .. } => Some(barriers.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn timeline_semaphore() -> vk::Semaphore {
    vk::Semaphore::from_raw(0xAA)
}

pub struct MockScope {
    name: String,
    log: EventLog,
}

impl GfxCommandScope for MockScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn vk_handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::null()
    }

    fn image_memory_barrier(&mut self, _dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        self.log.borrow_mut().push(Event::ImageBarriers {
            scope: self.name.clone(),
            barriers: barriers
                .iter()
                .map(|barrier| (barrier.image_handle(), barrier.old_layout(), barrier.new_layout()))
                .collect(),
        });
    }

    fn buffer_memory_barrier(&mut self, _dependency_flags: vk::DependencyFlags, barriers: &[GfxBufferBarrier]) {
        self.log.borrow_mut().push(Event::BufferBarriers {
            scope: self.name.clone(),
            buffers: barriers.iter().map(GfxBufferBarrier::buffer_handle).collect(),
        });
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        _layout: vk::ImageLayout,
        _color: &vk::ClearColorValue,
        _range: vk::ImageSubresourceRange,
    ) {
        self.log.borrow_mut().push(Event::ClearColor {
            scope: self.name.clone(),
            image,
        });
    }

    fn clear_depth_stencil_image(
        &mut self,
        image: vk::Image,
        _layout: vk::ImageLayout,
        _value: &vk::ClearDepthStencilValue,
        _range: vk::ImageSubresourceRange,
    ) {
        self.log.borrow_mut().push(Event::ClearDepthStencil {
            scope: self.name.clone(),
            image,
        });
    }

    fn fill_buffer(&mut self, buffer: vk::Buffer, _offset: vk::DeviceSize, _size: vk::DeviceSize, data: u32) {
        self.log.borrow_mut().push(Event::FillBuffer {
            scope: self.name.clone(),
            buffer,
            data,
        });
    }

    fn end(&mut self) {
        self.log.borrow_mut().push(Event::EndScope(self.name.clone()));
    }
}

pub struct MockQueue {
    log: EventLog,
    /// 第 n 次提交返回错误
    pub fail_at: Option<usize>,
    submit_count: usize,
}

impl MockQueue {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            fail_at: None,
            submit_count: 0,
        }
    }
}

impl GfxSubmitQueue for MockQueue {
    fn begin_scope(&mut self, name: &str) -> Box<dyn GfxCommandScope> {
        self.log.borrow_mut().push(Event::BeginScope(name.to_string()));
        Box::new(MockScope {
            name: name.to_string(),
            log: self.log.clone(),
        })
    }

    fn submit(&mut self, scopes: Vec<Box<dyn GfxCommandScope>>, submit_info: GfxSubmitInfo) -> VkResult<()> {
        let index = self.submit_count;
        self.submit_count += 1;
        if self.fail_at == Some(index) {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }

        self.log.borrow_mut().push(Event::Submit {
            scopes: scopes.iter().map(|scope| scope.name().to_string()).collect(),
            waits: submit_info.wait_infos().to_vec(),
            signals: submit_info.signal_infos().to_vec(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct MockFactory {
    next: u64,
    pub made_buffers: usize,
    pub made_images: usize,
    /// `(raw handle, timeline value)`
    pub retired: Vec<(u64, u64)>,
}

impl GfxResourceFactory for MockFactory {
    fn make_buffer(&mut self, _desc: &GfxBufferDesc) -> vk::Buffer {
        self.next += 1;
        self.made_buffers += 1;
        vk::Buffer::from_raw(BUFFER_BASE + self.next)
    }

    fn make_image(&mut self, _desc: &GfxImageDesc) -> (vk::Image, vk::ImageView) {
        self.next += 1;
        self.made_images += 1;
        (vk::Image::from_raw(IMAGE_BASE + self.next), vk::ImageView::from_raw(VIEW_BASE + self.next))
    }

    fn retire_buffer(&mut self, buffer: vk::Buffer, timeline_value: u64) {
        self.retired.push((buffer.as_raw(), timeline_value));
    }

    fn retire_image(&mut self, image: vk::Image, _view: vk::ImageView, timeline_value: u64) {
        self.retired.push((image.as_raw(), timeline_value));
    }
}
