//! Journaling mock device for lifecycle tests
//!
//! Every resource the mock hands out records its creation and destruction in a shared
//! [`Journal`], together with live counts per kind and the number of submissions still
//! outstanding. Destroying anything while a submission is outstanding is recorded as a
//! `violation` event.

use ash::vk;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use crate::foundation::math::UniformBufferObject;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::system::{
    AcquireOutcome, ChainRequest, GraphicsDevice, PresentOutcome, PresentableChain, SurfaceSupport,
};

/// Resource kinds tracked by the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Swapchain
    Chain,
    /// Image view
    ImageView,
    /// Framebuffer
    Framebuffer,
    /// Pipeline bundle
    Pipeline,
    /// Semaphore
    Semaphore,
    /// Fence
    Fence,
}

/// One journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Operation name, e.g. `create:Chain`, `submit`, `wait_idle`
    pub op: String,
    /// Resource id for create/destroy events
    pub id: Option<u64>,
}

#[derive(Debug, Default)]
struct JournalInner {
    events: Vec<Event>,
    live: HashMap<Kind, usize>,
    outstanding: usize,
    max_outstanding: usize,
    next_id: u64,
}

/// Shared record of everything the mock device did
#[derive(Debug, Default)]
pub struct Journal {
    inner: Mutex<JournalInner>,
}

impl Journal {
    fn record(&self, op: impl Into<String>, id: Option<u64>) {
        self.inner.lock().events.push(Event { op: op.into(), id });
    }

    fn create(&self, kind: Kind) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        *inner.live.entry(kind).or_default() += 1;
        inner.events.push(Event {
            op: format!("create:{kind:?}"),
            id: Some(id),
        });
        id
    }

    fn destroy(&self, kind: Kind, id: u64) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.live.get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
        if inner.outstanding > 0 {
            inner.events.push(Event {
                op: "violation".to_string(),
                id: Some(id),
            });
        }
        inner.events.push(Event {
            op: format!("destroy:{kind:?}"),
            id: Some(id),
        });
    }

    fn begin_work(&self) {
        let mut inner = self.inner.lock();
        inner.outstanding += 1;
        inner.max_outstanding = inner.max_outstanding.max(inner.outstanding);
    }

    fn finish_work(&self) {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
    }

    /// Live resources of `kind`
    pub fn live(&self, kind: Kind) -> usize {
        self.inner.lock().live.get(&kind).copied().unwrap_or(0)
    }

    /// Live resources of every kind
    pub fn total_live(&self) -> usize {
        self.inner.lock().live.values().sum()
    }

    /// Number of events named `op`
    pub fn count(&self, op: &str) -> usize {
        self.inner.lock().events.iter().filter(|event| event.op == op).count()
    }

    /// Position of the first event named `op` for resource `id`
    pub fn position(&self, op: &str, id: u64) -> Option<usize> {
        self.inner
            .lock()
            .events
            .iter()
            .position(|event| event.op == op && event.id == Some(id))
    }

    /// Ids of every resource of `kind` ever created, oldest first
    pub fn created(&self, kind: Kind) -> Vec<u64> {
        let op = format!("create:{kind:?}");
        self.inner
            .lock()
            .events
            .iter()
            .filter(|event| event.op == op)
            .filter_map(|event| event.id)
            .collect()
    }

    /// Submissions not yet completed
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Highest number of submissions outstanding at once
    pub fn max_outstanding(&self) -> usize {
        self.inner.lock().max_outstanding
    }

    /// Snapshot of all events
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }
}

/// Resource handle that journals its own destruction
#[derive(Debug)]
pub struct Tracked {
    journal: Arc<Journal>,
    kind: Kind,
    id: u64,
}

impl Tracked {
    fn new(journal: &Arc<Journal>, kind: Kind) -> Self {
        Self {
            journal: Arc::clone(journal),
            kind,
            id: journal.create(kind),
        }
    }

    /// Journal id
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.journal.destroy(self.kind, self.id);
    }
}

/// Mock swapchain
#[derive(Debug)]
pub struct MockChain {
    /// Journal handle
    pub tracked: Tracked,
    extent: vk::Extent2D,
    format: vk::Format,
    image_count: usize,
    next_image: AtomicU32,
}

impl PresentableChain for MockChain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format
    }

    fn image_count(&self) -> usize {
        self.image_count
    }
}

/// Mock framebuffer
#[derive(Debug)]
pub struct MockFramebuffer {
    /// Journal handle
    pub tracked: Tracked,
    /// Size it was created with
    pub extent: vk::Extent2D,
}

/// Mock pipeline bundle
#[derive(Debug)]
pub struct MockPipeline {
    /// Journal handle
    pub tracked: Tracked,
    /// Extent baked into the viewport
    pub extent: vk::Extent2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Submitted,
}

/// Mock fence
#[derive(Debug)]
pub struct MockFence {
    tracked: Tracked,
    state: Arc<Mutex<FenceState>>,
}

impl Drop for MockFence {
    fn drop(&mut self) {
        if *self.state.lock() == FenceState::Submitted {
            self.tracked.journal.finish_work();
            self.tracked.journal.record("destroy_pending_fence", Some(self.tracked.id));
        }
    }
}

#[derive(Debug)]
struct Script {
    acquire: VecDeque<AcquireOutcome>,
    present: VecDeque<PresentOutcome>,
    failures: VecDeque<(&'static str, vk::Result)>,
    fixed_extent: Option<vk::Extent2D>,
    min_image_count: u32,
    submitted: Vec<Weak<Mutex<FenceState>>>,
}

/// Mock implementation of [`GraphicsDevice`]
///
/// Cloning shares the journal and the script, so a test can keep a handle after moving
/// the device into a renderer.
#[derive(Debug, Clone)]
pub struct MockDevice {
    journal: Arc<Journal>,
    script: Arc<Mutex<Script>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Surface with `current_extent` undefined, so the extent follows the framebuffer size
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Journal::default()),
            script: Arc::new(Mutex::new(Script {
                acquire: VecDeque::new(),
                present: VecDeque::new(),
                failures: VecDeque::new(),
                fixed_extent: None,
                min_image_count: 2,
                submitted: Vec::new(),
            })),
        }
    }

    /// Shared journal
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Report a fixed `current_extent` instead of following the framebuffer size
    pub fn set_fixed_extent(&self, extent: Option<vk::Extent2D>) {
        self.script.lock().fixed_extent = extent;
    }

    /// Minimum image count reported by the surface
    pub fn set_min_image_count(&self, count: u32) {
        self.script.lock().min_image_count = count;
    }

    /// Queue the result of an upcoming acquire
    pub fn script_acquire(&self, outcome: AcquireOutcome) {
        self.script.lock().acquire.push_back(outcome);
    }

    /// Queue the result of an upcoming present
    pub fn script_present(&self, outcome: PresentOutcome) {
        self.script.lock().present.push_back(outcome);
    }

    /// Make the next call of `op` fail with `ERROR_OUT_OF_DEVICE_MEMORY`
    pub fn fail_next(&self, op: &'static str) {
        self.fail_next_with(op, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    }

    /// Make the next call of `op` fail with `result`
    pub fn fail_next_with(&self, op: &'static str, result: vk::Result) {
        self.script.lock().failures.push_back((op, result));
    }

    /// Whether `fence` is signaled
    pub fn is_signaled(&self, fence: &MockFence) -> bool {
        *fence.state.lock() == FenceState::Signaled
    }

    /// Pretend `fence` was handed to a submission
    pub fn submit_fence(&self, fence: &MockFence) {
        *fence.state.lock() = FenceState::Submitted;
        self.journal.begin_work();
        self.script.lock().submitted.push(Arc::downgrade(&fence.state));
    }

    fn check_failure(&self, op: &'static str) -> VulkanResult<()> {
        let mut script = self.script.lock();
        if let Some(&(next, result)) = script.failures.front() {
            if next == op {
                script.failures.pop_front();
                return Err(VulkanError::Api(result));
            }
        }
        Ok(())
    }

    fn complete(&self, state: &Mutex<FenceState>) {
        let mut state = state.lock();
        if *state == FenceState::Submitted {
            *state = FenceState::Signaled;
            self.journal.finish_work();
        }
    }
}

impl GraphicsDevice for MockDevice {
    type Chain = MockChain;
    type ImageView = Tracked;
    type Framebuffer = MockFramebuffer;
    type Pipeline = MockPipeline;
    type Semaphore = Tracked;
    type Fence = MockFence;

    fn wait_idle(&self) -> VulkanResult<()> {
        self.check_failure("wait_idle")?;
        self.journal.record("wait_idle", None);
        let submitted: Vec<_> = self.script.lock().submitted.drain(..).collect();
        for state in submitted.iter().filter_map(Weak::upgrade) {
            self.complete(&state);
        }
        Ok(())
    }

    fn surface_support(&self) -> VulkanResult<SurfaceSupport> {
        self.check_failure("surface_support")?;
        let script = self.script.lock();
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: script.min_image_count,
            max_image_count: 8,
            current_extent: script.fixed_extent.unwrap_or(vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            }),
            min_image_extent: vk::Extent2D { width: 0, height: 0 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        Ok(SurfaceSupport {
            capabilities,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn create_chain(&mut self, request: &ChainRequest, retiring: Option<&MockChain>) -> VulkanResult<MockChain> {
        self.check_failure("create_chain")?;
        if let Some(old) = retiring {
            self.journal.record("old_swapchain_hint", Some(old.tracked.id()));
        }
        Ok(MockChain {
            tracked: Tracked::new(&self.journal, Kind::Chain),
            extent: request.extent,
            format: request.format.format,
            image_count: request.image_count as usize,
            next_image: AtomicU32::new(0),
        })
    }

    fn create_image_views(&self, chain: &MockChain) -> VulkanResult<Vec<Tracked>> {
        self.check_failure("create_image_views")?;
        Ok((0..chain.image_count)
            .map(|_| Tracked::new(&self.journal, Kind::ImageView))
            .collect())
    }

    fn create_pipeline(&mut self, _format: vk::Format, extent: vk::Extent2D) -> VulkanResult<MockPipeline> {
        self.check_failure("create_pipeline")?;
        Ok(MockPipeline {
            tracked: Tracked::new(&self.journal, Kind::Pipeline),
            extent,
        })
    }

    fn create_framebuffer(
        &self,
        _pipeline: &MockPipeline,
        _view: &Tracked,
        extent: vk::Extent2D,
    ) -> VulkanResult<MockFramebuffer> {
        self.check_failure("create_framebuffer")?;
        Ok(MockFramebuffer {
            tracked: Tracked::new(&self.journal, Kind::Framebuffer),
            extent,
        })
    }

    fn reset_pools(&mut self) -> VulkanResult<()> {
        self.check_failure("reset_pools")?;
        self.journal.record("reset_pools", None);
        Ok(())
    }

    fn record_commands(
        &mut self,
        image_index: usize,
        _pipeline: &MockPipeline,
        _framebuffer: &MockFramebuffer,
        _extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        self.check_failure("record_commands")?;
        self.journal.record("record", Some(image_index as u64));
        Ok(())
    }

    fn create_semaphore(&self) -> VulkanResult<Tracked> {
        self.check_failure("create_semaphore")?;
        Ok(Tracked::new(&self.journal, Kind::Semaphore))
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<MockFence> {
        self.check_failure("create_fence")?;
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        Ok(MockFence {
            tracked: Tracked::new(&self.journal, Kind::Fence),
            state: Arc::new(Mutex::new(state)),
        })
    }

    fn wait_for_fence(&self, fence: &MockFence, _timeout_ns: u64) -> VulkanResult<()> {
        self.journal.record("wait_fence", Some(fence.tracked.id()));
        let state = *fence.state.lock();
        match state {
            FenceState::Signaled => Ok(()),
            FenceState::Submitted => {
                self.complete(&fence.state);
                Ok(())
            }
            // Nothing will ever signal it; a real device would hang here
            FenceState::Unsignaled => Err(VulkanError::Api(vk::Result::TIMEOUT)),
        }
    }

    fn reset_fence(&self, fence: &MockFence) -> VulkanResult<()> {
        let mut state = fence.state.lock();
        if *state == FenceState::Submitted {
            return Err(VulkanError::InvalidOperation {
                reason: "fence reset while its submission is pending".to_string(),
            });
        }
        *state = FenceState::Unsignaled;
        Ok(())
    }

    fn acquire_next_image(&self, chain: &MockChain, _signal: &Tracked) -> VulkanResult<AcquireOutcome> {
        self.journal.record("acquire", None);
        if let Some(outcome) = self.script.lock().acquire.pop_front() {
            return Ok(outcome);
        }
        let count = u32::try_from(chain.image_count).unwrap_or(1).max(1);
        let image_index = chain.next_image.fetch_add(1, Ordering::Relaxed) % count;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn write_uniforms(&mut self, image_index: usize, _ubo: &UniformBufferObject) -> VulkanResult<()> {
        self.journal.record("write_uniforms", Some(image_index as u64));
        Ok(())
    }

    fn submit(&self, image_index: usize, _wait: &Tracked, _signal: &Tracked, fence: &MockFence) -> VulkanResult<()> {
        self.check_failure("submit")?;
        if *fence.state.lock() != FenceState::Unsignaled {
            return Err(VulkanError::InvalidOperation {
                reason: "submitted with a fence that was not reset".to_string(),
            });
        }
        self.journal.record("submit", Some(image_index as u64));
        self.submit_fence(fence);
        Ok(())
    }

    fn present(&self, _chain: &MockChain, image_index: u32, _wait: &Tracked) -> VulkanResult<PresentOutcome> {
        self.journal.record("present", Some(u64::from(image_index)));
        Ok(self
            .script
            .lock()
            .present
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn recreate_surface(&mut self) -> VulkanResult<()> {
        self.journal.record("recreate_surface", None);
        if self.journal.live(Kind::Chain) > 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "surface recreated while a swapchain still exists".to_string(),
            });
        }
        Ok(())
    }
}
