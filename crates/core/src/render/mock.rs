//! In-memory GL used by unit tests.
//!
//! Tracks names, bindings, renderbuffer storage, and attachments, and logs
//! every call in order so tests can assert sequencing without a driver.

use super::api::{FramebufferApi, GlQuery};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::num::NonZeroU32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateFramebuffer(u32),
    CreateRenderbuffer(u32),
    BindFramebuffer(u32),
    BindRenderbuffer(u32),
    Storage { renderbuffer: u32, format: u32, width: i32, height: i32 },
    Attach { attachment: u32, renderbuffer: u32 },
    CheckStatus,
    DeleteFramebuffer(u32),
    DeleteRenderbuffer(u32),
    ReadPixels { width: i32, height: i32 },
}

fn raw(handle: Option<NonZeroU32>) -> u32 {
    handle.map_or(0, NonZeroU32::get)
}

#[derive(Default)]
pub struct RecordingGl {
    next_name: Cell<u32>,
    bound_framebuffer: Cell<u32>,
    bound_renderbuffer: Cell<u32>,
    live_framebuffers: RefCell<BTreeSet<u32>>,
    live_renderbuffers: RefCell<BTreeSet<u32>>,
    storage: RefCell<BTreeMap<u32, (u32, i32, i32)>>,
    statuses: RefCell<VecDeque<u32>>,
    errors: RefCell<VecDeque<u32>>,
    sticky_error: Cell<Option<u32>>,
    fail_creation: Cell<bool>,
    calls: RefCell<Vec<Call>>,
    strings: RefCell<HashMap<u32, String>>,
    integers: RefCell<HashMap<u32, i32>>,
    extensions: RefCell<Vec<String>>,
}

impl RecordingGl {
    pub fn new() -> Self {
        Self {
            next_name: Cell::new(1),
            ..Default::default()
        }
    }

    /// Pretends `framebuffer` is bound before the code under test runs.
    pub fn set_bound_framebuffer(&self, framebuffer: u32) {
        self.bound_framebuffer.set(framebuffer);
    }

    pub fn bound_framebuffer(&self) -> u32 {
        self.bound_framebuffer.get()
    }

    /// Queues the results of upcoming completeness checks. Once the queue is
    /// empty every check reports `GL_FRAMEBUFFER_COMPLETE`.
    pub fn queue_status(&self, status: u32) {
        self.statuses.borrow_mut().push_back(status);
    }

    pub fn push_error(&self, code: u32) {
        self.errors.borrow_mut().push_back(code);
    }

    pub fn set_sticky_error(&self, code: Option<u32>) {
        self.sticky_error.set(code);
    }

    /// Makes every `create_*` call fail.
    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.set(fail);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn live_framebuffers(&self) -> usize {
        self.live_framebuffers.borrow().len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        self.live_renderbuffers.borrow().len()
    }

    pub fn storage_of(&self, renderbuffer: u32) -> Option<(u32, i32, i32)> {
        self.storage.borrow().get(&renderbuffer).copied()
    }

    pub fn set_string(&self, name: u32, value: &str) {
        self.strings.borrow_mut().insert(name, value.to_string());
    }

    pub fn set_integer(&self, name: u32, value: i32) {
        self.integers.borrow_mut().insert(name, value);
    }

    pub fn add_extension(&self, name: &str) {
        self.extensions.borrow_mut().push(name.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> Result<NonZeroU32, String> {
        if self.fail_creation.get() {
            return Err("out of names".into());
        }
        let name = self.next_name.get();
        self.next_name.set(name + 1);
        NonZeroU32::new(name).ok_or_else(|| "name counter wrapped".to_string())
    }
}

impl FramebufferApi for RecordingGl {
    fn create_framebuffer(&self) -> Result<NonZeroU32, String> {
        let name = self.allocate()?;
        self.live_framebuffers.borrow_mut().insert(name.get());
        self.record(Call::CreateFramebuffer(name.get()));
        Ok(name)
    }

    fn create_renderbuffer(&self) -> Result<NonZeroU32, String> {
        let name = self.allocate()?;
        self.live_renderbuffers.borrow_mut().insert(name.get());
        self.record(Call::CreateRenderbuffer(name.get()));
        Ok(name)
    }

    fn bind_framebuffer(&self, framebuffer: Option<NonZeroU32>) {
        self.bound_framebuffer.set(raw(framebuffer));
        self.record(Call::BindFramebuffer(raw(framebuffer)));
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<NonZeroU32>) {
        self.bound_renderbuffer.set(raw(renderbuffer));
        self.record(Call::BindRenderbuffer(raw(renderbuffer)));
    }

    fn renderbuffer_storage(&self, internal_format: u32, width: i32, height: i32) {
        let renderbuffer = self.bound_renderbuffer.get();
        self.storage
            .borrow_mut()
            .insert(renderbuffer, (internal_format, width, height));
        self.record(Call::Storage {
            renderbuffer,
            format: internal_format,
            width,
            height,
        });
    }

    fn framebuffer_renderbuffer(&self, attachment: u32, renderbuffer: Option<NonZeroU32>) {
        self.record(Call::Attach {
            attachment,
            renderbuffer: raw(renderbuffer),
        });
    }

    fn check_framebuffer_status(&self) -> u32 {
        self.record(Call::CheckStatus);
        self.statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or(glow::FRAMEBUFFER_COMPLETE)
    }

    fn framebuffer_binding(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.bound_framebuffer.get())
    }

    fn delete_framebuffer(&self, framebuffer: NonZeroU32) {
        assert!(
            self.live_framebuffers.borrow_mut().remove(&framebuffer.get()),
            "framebuffer {framebuffer} deleted twice or never created"
        );
        self.record(Call::DeleteFramebuffer(framebuffer.get()));
    }

    fn delete_renderbuffer(&self, renderbuffer: NonZeroU32) {
        assert!(
            self.live_renderbuffers.borrow_mut().remove(&renderbuffer.get()),
            "renderbuffer {renderbuffer} deleted twice or never created"
        );
        self.record(Call::DeleteRenderbuffer(renderbuffer.get()));
    }

    fn read_rgba(&self, width: i32, height: i32, out: &mut [u8]) {
        self.record(Call::ReadPixels { width, height });
        for (i, px) in out.chunks_exact_mut(4).enumerate() {
            let row = (i / width.max(1) as usize) as u8;
            px.copy_from_slice(&[row, 0, 0, 255]);
        }
    }

    fn get_error(&self) -> u32 {
        if let Some(code) = self.sticky_error.get() {
            return code;
        }
        self.errors.borrow_mut().pop_front().unwrap_or(glow::NO_ERROR)
    }
}

impl GlQuery for RecordingGl {
    fn get_string(&self, name: u32) -> String {
        self.strings.borrow().get(&name).cloned().unwrap_or_default()
    }

    fn get_integer(&self, name: u32) -> i32 {
        self.integers.borrow().get(&name).copied().unwrap_or(0)
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions.borrow().clone()
    }
}
